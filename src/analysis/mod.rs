use chrono::Duration;

use crate::error::MonitorError;

pub mod beat;
pub mod classifier;
pub mod detector;
pub mod events;
pub mod gap;
pub mod rr;
pub mod signal;
pub mod training;
mod tests;

pub use beat::Beat;
pub use classifier::DetectionPathway;
pub use detector::{DetectionSnapshot, PvcDetector, TrainingStatus};
pub use events::{EventOrigin, PvcEvent};
pub use training::TrainingResult;

/// How long beats, RR intervals and PVC events stay in detection state.
pub fn detection_retention() -> Duration {
    Duration::minutes(2)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub sampling_frequency: f64,
    /// Length of the rolling sample buffer.
    pub buffer_seconds: f64,
    /// Classified beats held until `PvcDetector::take_records`; the oldest
    /// are dropped beyond this.
    pub record_capacity: usize,
    pub beat: beat::Parameters,
    pub training: training::Parameters,
    pub classifier: classifier::Parameters,
    pub rr: rr::Parameters,
    pub gap: gap::Parameters,
}

impl AnalysisConfig {
    pub fn with_sampling_frequency(sampling_frequency: f64) -> Self {
        Self {
            sampling_frequency,
            buffer_seconds: 3.0,
            record_capacity: 24_000,
            beat: beat::Parameters::new(sampling_frequency),
            training: training::Parameters::default(),
            classifier: classifier::Parameters::default(),
            rr: rr::Parameters {
                retention_ms: detection_retention().num_milliseconds(),
                ..rr::Parameters::default()
            },
            gap: gap::Parameters::default(),
        }
    }

    pub fn buffer_capacity(&self) -> usize {
        (self.sampling_frequency * self.buffer_seconds).round().max(1.0) as usize
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        let invalid = |reason: &str| {
            Err(MonitorError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if !(self.sampling_frequency.is_finite() && self.sampling_frequency > 0.0) {
            return invalid("sampling frequency must be positive");
        }
        if (self.beat.sampling_frequency - self.sampling_frequency).abs() > f64::EPSILON {
            return invalid("beat detector sampling frequency differs from the stream's");
        }
        if self.buffer_capacity() < self.beat.min_buffer_samples {
            return invalid("sample buffer is shorter than one detection window");
        }
        if self.beat.detection_interval == 0 || self.beat.threshold_sigma <= 0.0 {
            return invalid("detection interval and threshold must be positive");
        }
        if self.training.batch_size == 0 || self.training.min_cluster_size == 0 {
            return invalid("training batch and cluster size must be positive");
        }
        let (low, high) = self.rr.trusted_range;
        let (band_low, band_high) = self.rr.expected_band;
        if low >= high || band_low >= band_high {
            return invalid("RR ranges must be increasing");
        }
        if self.rr.trusted_keep > self.rr.trusted_capacity {
            return invalid("trusted RR keep count exceeds capacity");
        }
        if self.record_capacity == 0 {
            return invalid("record capacity must be positive");
        }
        if self.classifier.template_capacity == 0 {
            return invalid("template capacity must be positive");
        }
        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::with_sampling_frequency(130.0)
    }
}
