use std::collections::VecDeque;

use chrono::Duration;
use slog::{debug, Logger};

use crate::burden::calculate_burden;
use crate::storage::{history, BeatHistory};

/// Span each burden value covers.
pub fn burden_window() -> Duration {
    Duration::minutes(5)
}

#[derive(Debug, Clone, Copy, PartialEq, uniffi::Record)]
pub struct BurdenDataPoint {
    pub timestamp_ms: i64,
    pub burden: f64,
    pub window_minutes: f64,
    pub confidence: f64,
    pub total_beats: u64,
    pub pvc_count: u64,
}

/// Turns the beat ledger into a time series of sliding-window burden values.
pub struct TemporalBurden {
    window_ms: i64,
    retention_ms: i64,
    series: VecDeque<BurdenDataPoint>,
    log: Logger,
}

impl TemporalBurden {
    pub fn new(log: Logger) -> Self {
        Self {
            window_ms: burden_window().num_milliseconds(),
            retention_ms: history::retention().num_milliseconds(),
            series: VecDeque::new(),
            log,
        }
    }

    /// Computes the burden over `[now - window, now]` and appends it.
    pub fn tick(&mut self, now_ms: i64, ledger: &BeatHistory) -> BurdenDataPoint {
        let from = now_ms - self.window_ms;
        let (mut total, mut pvcs, mut earliest) = (0u64, 0u64, None);
        for record in ledger.between(from, now_ms) {
            earliest.get_or_insert(record.timestamp_ms);
            total += 1;
            if record.is_pvc {
                pvcs += 1;
            }
        }

        let span_ms = earliest.map_or(0, |e| (now_ms - e).clamp(0, self.window_ms));
        let heart_rate = if span_ms > 0 {
            total as f64 / (span_ms as f64 / 60_000.0)
        } else {
            0.0
        };
        let result = calculate_burden(total, pvcs, span_ms, heart_rate);

        let point = BurdenDataPoint {
            timestamp_ms: now_ms,
            burden: result.burden,
            window_minutes: self.window_ms as f64 / 60_000.0,
            confidence: result.confidence,
            total_beats: total,
            pvc_count: pvcs,
        };
        debug!(self.log, "burden tick";
            "beats" => total, "pvcs" => pvcs, "burden" => point.burden, "confidence" => point.confidence);

        self.series.push_back(point);
        let cutoff = now_ms - self.retention_ms;
        while self.series.front().map_or(false, |p| p.timestamp_ms < cutoff) {
            self.series.pop_front();
        }
        point
    }

    pub fn history(&self) -> Vec<BurdenDataPoint> {
        self.series.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<&BurdenDataPoint> {
        self.series.back()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}
