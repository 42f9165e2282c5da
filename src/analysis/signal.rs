use ndarray::{s, Array1, ArrayView1};
use ndarray_stats::interpolate::Higher;
use ndarray_stats::{Quantile1dExt, QuantileExt};
use noisy_float::types::{n64, N64};

/// A snippet of signal around a beat's peak. `peak_offset` is the index of
/// the peak inside `samples`, so two snippets can be aligned at their peaks
/// even when the buffer clipped one of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Array1<f64>,
    pub peak_offset: usize,
}

impl Waveform {
    pub fn new(samples: Array1<f64>, peak_offset: usize) -> Self {
        Self {
            samples,
            peak_offset,
        }
    }

    /// Cuts `half_window` samples on each side of `peak` out of `signal`,
    /// clipped to the signal bounds.
    pub fn around(signal: &[f64], peak: usize, half_window: usize) -> Self {
        let start = peak.saturating_sub(half_window);
        let end = (peak + half_window + 1).min(signal.len());
        Self::new(Array1::from(signal[start..end].to_vec()), peak - start)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples available after the peak.
    pub fn post_peak(&self) -> usize {
        self.len().saturating_sub(self.peak_offset + 1)
    }

    /// Scaled so the largest absolute sample is 1. `None` for an all-zero or
    /// non-finite snippet.
    pub fn normalized(&self) -> Option<Waveform> {
        let peak = *self.samples.mapv(f64::abs).max().ok()?;
        if !peak.is_finite() || peak <= f64::EPSILON {
            return None;
        }
        Some(Waveform::new(self.samples.mapv(|v| v / peak), self.peak_offset))
    }

    /// Pearson correlation over the region where both snippets have samples,
    /// aligned at their peaks. `None` when that overlap is shorter than
    /// `min_overlap` or either side is constant.
    pub fn correlation(&self, other: &Waveform, min_overlap: usize) -> Option<f64> {
        let before = self.peak_offset.min(other.peak_offset);
        let after = self.post_peak().min(other.post_peak());
        let overlap = before + after + 1;
        if overlap < min_overlap.max(2) {
            return None;
        }

        let a = self.samples.slice(s![
            self.peak_offset - before..self.peak_offset + after + 1
        ]);
        let b = other.samples.slice(s![
            other.peak_offset - before..other.peak_offset + after + 1
        ]);
        pearson(a, b)
    }
}

pub fn pearson(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Option<f64> {
    let mean_a = a.mean()?;
    let mean_b = b.mean()?;
    let da = a.mapv(|v| v - mean_a);
    let db = b.mapv(|v| v - mean_b);

    let denominator = (da.dot(&da) * db.dot(&db)).sqrt();
    if !denominator.is_finite() || denominator <= f64::EPSILON {
        return None;
    }
    Some((da.dot(&db) / denominator).clamp(-1.0, 1.0))
}

/// Upper median: the element at index `len / 2` of the sorted values.
/// Non-finite values are ignored.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Array1<N64> = values.iter().copied().filter_map(N64::try_new).collect();
    if finite.is_empty() {
        return None;
    }
    finite.quantile_mut(n64(0.5), &Higher).ok().map(|m| m.raw())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    ArrayView1::from(values).mean()
}

/// Population mean and standard deviation.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    let view = ArrayView1::from(values);
    let mean = view.mean()?;
    Some((mean, view.std(0.0)))
}

pub fn variance(values: &[f64]) -> Option<f64> {
    let view = ArrayView1::from(values);
    view.mean()?;
    Some(view.var(0.0))
}

/// Signal-to-noise proxy mapped onto 0..1: the peak-to-peak range relative to
/// the spread of first differences. A clean trace scores near 1, pure noise
/// near 0.
pub fn signal_quality(window: &[f64]) -> f64 {
    if window.len() < 3 {
        return 0.0;
    }
    let view = ArrayView1::from(window);
    let (Ok(max), Ok(min)) = (view.max(), view.min()) else {
        return 0.0;
    };
    let peak_to_peak = max - min;

    let diffs: Vec<f64> = window.windows(2).map(|w| w[1] - w[0]).collect();
    let noise = ArrayView1::from(&diffs[..]).std(0.0);
    if noise <= f64::EPSILON {
        return 0.0;
    }

    ((peak_to_peak / noise - 2.0) / 18.0).clamp(0.0, 1.0)
}
