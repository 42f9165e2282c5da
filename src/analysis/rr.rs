use std::collections::VecDeque;

use crate::analysis::signal::{mean, median};

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Intervals older than this (relative to the newest) are dropped.
    pub retention_ms: i64,
    /// Only intervals inside this range can become trusted.
    pub trusted_range: (f64, f64),
    pub trusted_capacity: usize,
    /// Trusted values kept when the capacity would be exceeded.
    pub trusted_keep: usize,
    /// An endpoint this close to a PVC counts as that PVC.
    pub pvc_tolerance_ms: i64,
    /// Physiologic band for the expected interval.
    pub expected_band: (f64, f64),
    pub expected_window: usize,
    pub default_rr_ms: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            retention_ms: 120_000,
            trusted_range: (400.0, 1500.0),
            trusted_capacity: 30,
            trusted_keep: 15,
            pvc_tolerance_ms: 100,
            expected_band: (500.0, 1200.0),
            expected_window: 20,
            default_rr_ms: 800.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    /// Any interval between two consecutive beats.
    Raw,
    /// Normal-to-normal, used for the expected interval.
    Trusted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrInterval {
    pub start_ms: i64,
    pub end_ms: i64,
    pub trust: Trust,
}

impl RrInterval {
    pub fn duration_ms(&self) -> f64 {
        (self.end_ms - self.start_ms) as f64
    }

    pub fn is_trusted(&self) -> bool {
        self.trust == Trust::Trusted
    }

    fn touches(&self, timestamp_ms: i64, tolerance_ms: i64) -> bool {
        (self.start_ms - timestamp_ms).abs() <= tolerance_ms
            || (self.end_ms - timestamp_ms).abs() <= tolerance_ms
    }
}

/// Time-ordered RR intervals. Every interval is recorded raw; the ones
/// between two normal beats are later promoted to trusted.
pub struct RrHistory {
    params: Parameters,
    intervals: VecDeque<RrInterval>,
}

impl RrHistory {
    pub fn new(params: Parameters) -> Self {
        Self {
            params,
            intervals: VecDeque::new(),
        }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn record(&mut self, start_ms: i64, end_ms: i64) {
        self.intervals.push_back(RrInterval {
            start_ms,
            end_ms,
            trust: Trust::Raw,
        });
        self.prune(end_ms);
    }

    pub fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.params.retention_ms;
        while self.intervals.front().map_or(false, |rr| rr.end_ms < cutoff) {
            self.intervals.pop_front();
        }
    }

    /// Promotes the interval ending at `end_ms` if neither endpoint is near
    /// one of `pvc_timestamps` and its length is plausible. Returns whether
    /// it was admitted.
    pub fn admit(&mut self, end_ms: i64, pvc_timestamps: &[i64]) -> bool {
        let Some(position) = self.intervals.iter().rposition(|rr| rr.end_ms == end_ms) else {
            return false;
        };
        if !self.qualifies(&self.intervals[position], pvc_timestamps) {
            return false;
        }
        self.promote(&[position]);
        true
    }

    /// Trusts every plausible raw interval recorded so far. Used once, when
    /// learning ends and no beat has been flagged yet.
    pub fn seed_trusted(&mut self) -> usize {
        let positions: Vec<usize> = self
            .intervals
            .iter()
            .enumerate()
            .filter(|(_, rr)| !rr.is_trusted() && self.qualifies(rr, &[]))
            .map(|(i, _)| i)
            .collect();
        self.promote(&positions);
        positions.len()
    }

    fn qualifies(&self, rr: &RrInterval, pvc_timestamps: &[i64]) -> bool {
        let (low, high) = self.params.trusted_range;
        let duration = rr.duration_ms();
        duration >= low
            && duration <= high
            && !pvc_timestamps
                .iter()
                .any(|&ts| rr.touches(ts, self.params.pvc_tolerance_ms))
    }

    /// When the new values would overflow the capacity only the last
    /// `trusted_keep` existing trusted values survive; the result is then
    /// truncated to the newest `trusted_capacity`.
    fn promote(&mut self, positions: &[usize]) {
        let existing = self.intervals.iter().filter(|rr| rr.is_trusted()).count();
        if existing + positions.len() > self.params.trusted_capacity {
            self.demote_oldest_trusted(existing.saturating_sub(self.params.trusted_keep));
        }
        for &i in positions {
            self.intervals[i].trust = Trust::Trusted;
        }
        let total = self.intervals.iter().filter(|rr| rr.is_trusted()).count();
        self.demote_oldest_trusted(total.saturating_sub(self.params.trusted_capacity));
    }

    fn demote_oldest_trusted(&mut self, mut count: usize) {
        for rr in self.intervals.iter_mut() {
            if count == 0 {
                break;
            }
            if rr.is_trusted() {
                rr.trust = Trust::Raw;
                count -= 1;
            }
        }
    }

    pub fn intervals(&self) -> impl Iterator<Item = &RrInterval> {
        self.intervals.iter()
    }

    pub fn trusted(&self) -> impl DoubleEndedIterator<Item = &RrInterval> + '_ {
        self.intervals.iter().filter(|rr| rr.is_trusted())
    }

    /// Durations of the newest `n` trusted intervals, oldest first.
    pub fn recent_trusted(&self, n: usize) -> Vec<f64> {
        let mut values: Vec<f64> = self.trusted().rev().take(n).map(|rr| rr.duration_ms()).collect();
        values.reverse();
        values
    }

    /// Durations of the newest `n` intervals regardless of trust.
    pub fn recent_raw(&self, n: usize) -> Vec<f64> {
        let skip = self.intervals.len().saturating_sub(n);
        self.intervals.iter().skip(skip).map(|rr| rr.duration_ms()).collect()
    }

    pub fn last(&self) -> Option<&RrInterval> {
        self.intervals.back()
    }

    pub fn ending_at(&self, end_ms: i64) -> Option<&RrInterval> {
        self.intervals.iter().rev().find(|rr| rr.end_ms == end_ms)
    }

    /// Median of the recent trusted intervals inside the physiologic band,
    /// or the default when none qualify.
    pub fn expected_rr(&self) -> f64 {
        let (low, high) = self.params.expected_band;
        let in_band: Vec<f64> = self
            .recent_trusted(self.params.expected_window)
            .into_iter()
            .filter(|rr| (low..=high).contains(rr))
            .collect();
        median(&in_band).unwrap_or(self.params.default_rr_ms)
    }

    pub fn recent_mean(&self, n: usize) -> Option<f64> {
        mean(&self.recent_raw(n))
    }

    pub fn trusted_len(&self) -> usize {
        self.trusted().count()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }
}
