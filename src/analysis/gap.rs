use slog::{debug, Logger};

use crate::analysis::classifier::DetectionPathway;
use crate::analysis::events::{EventOrigin, PvcEvent, PvcEvents};
use crate::analysis::rr::RrHistory;
use crate::analysis::signal::median;

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Runs on every n-th detected beat.
    pub every_nth_beat: u64,
    pub min_beats: u64,
    pub median_window: usize,
    pub min_trusted: usize,
    /// An interval longer than this multiple of the trusted median is a gap.
    pub gap_ratio: f64,
    pub pvc_tolerance_ms: i64,
    pub confidence: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            every_nth_beat: 5,
            min_beats: 6,
            median_window: 10,
            min_trusted: 5,
            gap_ratio: 1.8,
            pvc_tolerance_ms: 200,
            confidence: 0.5,
        }
    }
}

/// Infers a PVC the detector missed when the newest RR interval is about
/// twice the usual one.
pub struct GapInference {
    params: Parameters,
    log: Logger,
}

impl GapInference {
    pub fn new(params: Parameters, log: Logger) -> Self {
        Self { params, log }
    }

    pub fn due(&self, beats_detected: u64) -> bool {
        beats_detected >= self.params.min_beats
            && self.params.every_nth_beat > 0
            && beats_detected % self.params.every_nth_beat == 0
    }

    pub fn infer(&self, rr: &RrHistory, events: &PvcEvents) -> Option<PvcEvent> {
        let trusted = rr.recent_trusted(self.params.median_window);
        if trusted.len() < self.params.min_trusted {
            return None;
        }
        let typical = median(&trusted)?;

        let last = rr.last()?;
        let gap = last.duration_ms();
        if gap <= self.params.gap_ratio * typical {
            return None;
        }

        let tolerance = self.params.pvc_tolerance_ms;
        if events.classified_near(last.start_ms, tolerance)
            || events.classified_near(last.end_ms, tolerance)
            || events.inferred_within(last.start_ms, last.end_ms)
        {
            return None;
        }

        let timestamp_ms = last.start_ms + (last.end_ms - last.start_ms) / 2;
        debug!(self.log, "inferred pvc in gap";
            "timestamp" => timestamp_ms, "gap" => gap, "median" => typical);

        Some(PvcEvent {
            timestamp_ms,
            rr_ms: gap,
            expected_rr_ms: typical,
            prematurity_pct: ((1.0 - gap / typical) * 100.0).round() as i32,
            qrs_width_ms: 0.0,
            confidence: self.params.confidence,
            dissimilarity: 0.0,
            pathway: DetectionPathway::GapDetected,
            amplitude: 0.0,
            origin: EventOrigin::Inferred,
        })
    }
}
