use slog::{debug, trace, Logger};

use crate::analysis::signal::{mean, mean_std, Waveform};
use crate::storage::SampleBuffer;

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub sampling_frequency: f64,
    /// Samples needed in the buffer before the first pass (about 1 s).
    pub min_buffer_samples: usize,
    /// New samples between two detection passes.
    pub detection_interval: usize,
    /// Thresholds sit at mean ± `threshold_sigma` standard deviations.
    pub threshold_sigma: f64,
    pub neighborhood: usize,
    pub max_neighborhood_violations: usize,
    pub refractory_ms: i64,
    /// QRS edges are where the signal falls back within this fraction of
    /// the peak height above baseline.
    pub qrs_return_fraction: f64,
    pub baseline_offset: (usize, usize),
    pub waveform_half_window: usize,
    /// Samples that must follow a candidate before it is examined.
    pub lookahead: usize,
    /// Passes are skipped on a flat trace.
    pub min_signal_std: f64,
}

impl Parameters {
    pub fn new(sampling_frequency: f64) -> Self {
        Self {
            sampling_frequency,
            min_buffer_samples: sampling_frequency.round().max(1.0) as usize,
            detection_interval: 10,
            threshold_sigma: 1.4,
            neighborhood: 5,
            max_neighborhood_violations: 1,
            refractory_ms: 300,
            qrs_return_fraction: 0.15,
            baseline_offset: (20, 40),
            waveform_half_window: 60,
            lookahead: 40,
            min_signal_std: 5.0,
        }
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self::new(130.0)
    }
}

/// A detected R-peak.
#[derive(Debug, Clone, Copy, PartialEq, uniffi::Record)]
pub struct Beat {
    pub timestamp_ms: i64,
    pub amplitude: f64,
    pub qrs_width_ms: f64,
    /// Position in the sample buffer when the beat was found.
    pub buffer_index: u32,
}

#[derive(Debug, Clone)]
pub struct DetectedBeat {
    pub beat: Beat,
    pub waveform: Waveform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Max,
    Min,
}

pub struct BeatDetector {
    params: Parameters,
    log: Logger,
    samples_since_pass: usize,
    last_beat_ms: Option<i64>,
}

impl BeatDetector {
    pub fn new(params: Parameters, log: Logger) -> Self {
        Self {
            params,
            log,
            samples_since_pass: 0,
            last_beat_ms: None,
        }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Called once per buffered sample; runs a pass every
    /// `detection_interval` samples once the buffer holds enough signal.
    pub fn on_sample(&mut self, buffer: &SampleBuffer) -> Vec<DetectedBeat> {
        self.samples_since_pass += 1;
        if self.samples_since_pass < self.params.detection_interval
            || buffer.len() < self.params.min_buffer_samples
        {
            return Vec::new();
        }
        self.samples_since_pass = 0;
        self.detect(buffer)
    }

    pub fn detect(&mut self, buffer: &SampleBuffer) -> Vec<DetectedBeat> {
        let signal = buffer.amplitudes();
        let stamps = buffer.timestamps();

        let Some((mean, std)) = mean_std(signal) else {
            return Vec::new();
        };
        if std < self.params.min_signal_std {
            trace!(self.log, "flat signal, skipping pass"; "std" => std);
            return Vec::new();
        }

        let upper = mean + self.params.threshold_sigma * std;
        let lower = mean - self.params.threshold_sigma * std;
        let lookahead = self.params.lookahead.max(self.params.neighborhood).max(1);
        let end = signal.len().saturating_sub(lookahead);

        trace!(self.log, "detection pass"; "upper" => upper, "lower" => lower, "len" => signal.len());

        let mut found = Vec::new();
        for i in 1..end {
            if let Some(last) = self.last_beat_ms {
                if stamps[i] - last < self.params.refractory_ms {
                    continue;
                }
            }

            let value = signal[i];
            let polarity = if value > upper && value > signal[i - 1] && value > signal[i + 1] {
                Polarity::Max
            } else if value < lower && value < signal[i - 1] && value < signal[i + 1] {
                Polarity::Min
            } else {
                continue;
            };
            if !self.neighborhood_valid(signal, i, polarity) {
                continue;
            }

            let baseline = local_baseline(signal, i, self.params.baseline_offset).unwrap_or(mean);
            let beat = Beat {
                timestamp_ms: stamps[i],
                amplitude: value,
                qrs_width_ms: self.qrs_width_ms(signal, i, baseline),
                buffer_index: i as u32,
            };
            debug!(self.log, "beat";
                "timestamp" => beat.timestamp_ms,
                "amplitude" => beat.amplitude,
                "qrs_ms" => beat.qrs_width_ms);

            found.push(DetectedBeat {
                beat,
                waveform: Waveform::around(signal, i, self.params.waveform_half_window),
            });
            self.last_beat_ms = Some(stamps[i]);
        }
        found
    }

    /// Within the neighborhood every step towards the peak must move towards
    /// it; one step against the grain is tolerated as noise.
    fn neighborhood_valid(&self, signal: &[f64], peak: usize, polarity: Polarity) -> bool {
        let towards_peak = |outer: f64, inner: f64| match polarity {
            Polarity::Max => outer < inner,
            Polarity::Min => outer > inner,
        };

        let mut violations = 0;
        for k in 1..=self.params.neighborhood {
            if peak >= k && !towards_peak(signal[peak - k], signal[peak - k + 1]) {
                violations += 1;
            }
            if peak + k < signal.len() && !towards_peak(signal[peak + k], signal[peak + k - 1]) {
                violations += 1;
            }
        }
        violations <= self.params.max_neighborhood_violations
    }

    fn qrs_width_ms(&self, signal: &[f64], peak: usize, baseline: f64) -> f64 {
        let threshold = self.params.qrs_return_fraction * (signal[peak] - baseline).abs();
        let returned = |i: usize| (signal[i] - baseline).abs() <= threshold;

        let mut left = peak;
        while left > 0 {
            left -= 1;
            if returned(left) {
                break;
            }
        }
        let mut right = peak;
        while right + 1 < signal.len() {
            right += 1;
            if returned(right) {
                break;
            }
        }

        (right - left) as f64 / self.params.sampling_frequency * 1000.0
    }

    pub fn reset(&mut self) {
        self.samples_since_pass = 0;
        self.last_beat_ms = None;
    }
}

/// Mean of the two flanking windows `offset.0..offset.1` samples before and
/// after the peak; falls back to whichever flank the buffer covers.
fn local_baseline(signal: &[f64], peak: usize, offset: (usize, usize)) -> Option<f64> {
    let (near, far) = offset;
    let left = if peak > near {
        mean(&signal[peak.saturating_sub(far)..peak - near])
    } else {
        None
    };
    let right_start = (peak + near + 1).min(signal.len());
    let right_end = (peak + far + 1).min(signal.len());
    let right = mean(&signal[right_start..right_end]);

    match (left, right) {
        (Some(l), Some(r)) => Some((l + r) / 2.0),
        (l, r) => l.or(r),
    }
}
