use std::collections::VecDeque;

use chrono::Duration;

/// How long classified beats stay in the ledger.
pub fn retention() -> Duration {
    Duration::hours(2)
}

/// The durable unit burden statistics are computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatRecord {
    pub timestamp_ms: i64,
    pub is_pvc: bool,
    pub confidence: f64,
}

/// Time-ordered ledger of every classified beat, bounded by age.
///
/// Kept apart from the detector's own beat and event lists so that burden
/// statistics survive the much shorter retention of detection state.
pub struct BeatHistory {
    records: VecDeque<BeatRecord>,
    retention_ms: i64,
}

impl Default for BeatHistory {
    fn default() -> Self {
        Self::new(retention())
    }
}

impl BeatHistory {
    pub fn new(retention: Duration) -> Self {
        Self {
            records: VecDeque::new(),
            retention_ms: retention.num_milliseconds(),
        }
    }

    /// Inserts at the timestamp-ordered position. Inferred beats can arrive
    /// after later beats were already recorded.
    pub fn record(&mut self, record: BeatRecord) {
        let position = self
            .records
            .partition_point(|r| r.timestamp_ms <= record.timestamp_ms);
        self.records.insert(position, record);

        if let Some(newest) = self.records.back().map(|r| r.timestamp_ms) {
            self.prune(newest);
        }
    }

    pub fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.retention_ms;
        while self
            .records
            .front()
            .map_or(false, |r| r.timestamp_ms < cutoff)
        {
            self.records.pop_front();
        }
    }

    /// Records with `from_ms <= timestamp <= to_ms`.
    pub fn between(&self, from_ms: i64, to_ms: i64) -> impl Iterator<Item = &BeatRecord> {
        let start = self.records.partition_point(|r| r.timestamp_ms < from_ms);
        self.records
            .range(start..)
            .take_while(move |r| r.timestamp_ms <= to_ms)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn oldest(&self) -> Option<&BeatRecord> {
        self.records.front()
    }

    pub fn newest(&self) -> Option<&BeatRecord> {
        self.records.back()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beat(timestamp_ms: i64, is_pvc: bool) -> BeatRecord {
        BeatRecord {
            timestamp_ms,
            is_pvc,
            confidence: if is_pvc { 0.9 } else { 0.0 },
        }
    }

    #[test]
    fn keeps_timestamp_order_for_late_inserts() {
        let mut history = BeatHistory::default();
        history.record(beat(1_000, false));
        history.record(beat(3_000, false));
        history.record(beat(2_000, true));

        let stamps: Vec<i64> = history.between(0, 10_000).map(|r| r.timestamp_ms).collect();
        assert_eq!(stamps, vec![1_000, 2_000, 3_000]);
    }

    #[test]
    fn never_holds_more_than_two_hours() {
        let mut history = BeatHistory::default();
        let two_hours = retention().num_milliseconds();
        for i in 0..20_000i64 {
            history.record(beat(i * 800, i % 7 == 0));
            let oldest = history.oldest().map(|r| r.timestamp_ms).unwrap();
            let newest = history.newest().map(|r| r.timestamp_ms).unwrap();
            assert!(newest - oldest <= two_hours);
        }
        assert!(history.len() <= (two_hours / 800 + 1) as usize);
    }

    #[test]
    fn between_is_inclusive() {
        let mut history = BeatHistory::default();
        for t in [100, 200, 300, 400] {
            history.record(beat(t, false));
        }
        assert_eq!(history.between(200, 300).count(), 2);
        assert_eq!(history.between(401, 500).count(), 0);
    }
}
