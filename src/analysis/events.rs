use std::collections::VecDeque;

use crate::analysis::classifier::DetectionPathway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum EventOrigin {
    /// Flagged by the per-beat classifier.
    Classified,
    /// Synthesized for a beat the detector missed.
    Inferred,
}

#[derive(Debug, Clone, Copy, PartialEq, uniffi::Record)]
pub struct PvcEvent {
    pub timestamp_ms: i64,
    pub rr_ms: f64,
    pub expected_rr_ms: f64,
    pub prematurity_pct: i32,
    pub qrs_width_ms: f64,
    pub confidence: f64,
    pub dissimilarity: f64,
    pub pathway: DetectionPathway,
    pub amplitude: f64,
    pub origin: EventOrigin,
}

impl PvcEvent {
    pub fn is_inferred(&self) -> bool {
        self.origin == EventOrigin::Inferred
    }
}

/// Classified and inferred events, merged in timestamp order and bounded by
/// age.
pub struct PvcEvents {
    events: VecDeque<PvcEvent>,
    retention_ms: i64,
}

impl PvcEvents {
    pub fn new(retention_ms: i64) -> Self {
        Self {
            events: VecDeque::new(),
            retention_ms,
        }
    }

    pub fn insert(&mut self, event: PvcEvent) {
        let position = self
            .events
            .partition_point(|e| e.timestamp_ms <= event.timestamp_ms);
        self.events.insert(position, event);
    }

    pub fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.retention_ms;
        while self.events.front().map_or(false, |e| e.timestamp_ms < cutoff) {
            self.events.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PvcEvent> {
        self.events.iter()
    }

    pub fn classified_timestamps(&self) -> Vec<i64> {
        self.events
            .iter()
            .filter(|e| !e.is_inferred())
            .map(|e| e.timestamp_ms)
            .collect()
    }

    pub fn classified_near(&self, timestamp_ms: i64, tolerance_ms: i64) -> bool {
        self.events
            .iter()
            .any(|e| !e.is_inferred() && (e.timestamp_ms - timestamp_ms).abs() <= tolerance_ms)
    }

    /// Whether an inferred event already sits strictly inside `(start, end)`.
    pub fn inferred_within(&self, start_ms: i64, end_ms: i64) -> bool {
        self.events
            .iter()
            .any(|e| e.is_inferred() && e.timestamp_ms > start_ms && e.timestamp_ms < end_ms)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_vec(&self) -> Vec<PvcEvent> {
        self.events.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(timestamp_ms: i64, origin: EventOrigin) -> PvcEvent {
        PvcEvent {
            timestamp_ms,
            rr_ms: 500.0,
            expected_rr_ms: 800.0,
            prematurity_pct: 38,
            qrs_width_ms: 80.0,
            confidence: 0.9,
            dissimilarity: 0.0,
            pathway: DetectionPathway::HighAmplitude,
            amplitude: 900.0,
            origin,
        }
    }

    #[test]
    fn merges_origins_by_timestamp() {
        let mut events = PvcEvents::new(120_000);
        events.insert(event(5_000, EventOrigin::Classified));
        events.insert(event(9_000, EventOrigin::Classified));
        events.insert(event(7_000, EventOrigin::Inferred));

        let order: Vec<(i64, bool)> = events.iter().map(|e| (e.timestamp_ms, e.is_inferred())).collect();
        assert_eq!(order, vec![(5_000, false), (7_000, true), (9_000, false)]);
        assert_eq!(events.classified_timestamps(), vec![5_000, 9_000]);
        assert!(events.inferred_within(6_000, 8_000));
        assert!(!events.classified_near(7_000, 200));
    }

    #[test]
    fn prunes_old_events() {
        let mut events = PvcEvents::new(120_000);
        for t in (0..300_000).step_by(10_000) {
            events.insert(event(t, EventOrigin::Classified));
        }
        events.prune(290_000);
        assert!(events.iter().all(|e| e.timestamp_ms >= 170_000));
        assert_eq!(events.len(), 13);
    }
}
