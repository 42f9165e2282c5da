use std::fmt;

use ndarray::Array1;

pub mod temporal;

pub use temporal::{BurdenDataPoint, TemporalBurden};

const LOW_BURDEN: f64 = 1.0;
const HIGH_BURDEN: f64 = 10.0;
const MIN_INTERPRETABLE_CONFIDENCE: f64 = 0.4;
const TREND_POINTS: usize = 10;
const MIN_TREND_POINTS: usize = 3;
const STABLE_SLOPE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum BurdenCategory {
    Low,
    Moderate,
    High,
}

impl BurdenCategory {
    pub fn from_burden(burden_pct: f64) -> Self {
        if burden_pct < LOW_BURDEN {
            BurdenCategory::Low
        } else if burden_pct < HIGH_BURDEN {
            BurdenCategory::Moderate
        } else {
            BurdenCategory::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BurdenCategory::Low => "low",
            BurdenCategory::Moderate => "moderate",
            BurdenCategory::High => "high",
        }
    }
}

impl fmt::Display for BurdenCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct BurdenResult {
    /// Percent of beats that were PVCs, two decimals.
    pub burden: f64,
    pub confidence: f64,
    pub category: BurdenCategory,
    pub interpretation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum TrendDirection {
    Stable,
    Increasing,
    Decreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, uniffi::Record)]
pub struct BurdenTrend {
    pub direction: TrendDirection,
    /// Burden percentage points per sample.
    pub slope: f64,
    pub confidence: f64,
}

/// Burden over a span of `elapsed_ms` in which `total_beats` beats and
/// `pvc_count` PVCs were seen at roughly `heart_rate` bpm.
pub fn calculate_burden(total_beats: u64, pvc_count: u64, elapsed_ms: i64, heart_rate: f64) -> BurdenResult {
    let raw = if total_beats == 0 {
        0.0
    } else {
        pvc_count.min(total_beats) as f64 / total_beats as f64 * 100.0
    };
    let burden = (raw * 100.0).round() / 100.0;
    let category = BurdenCategory::from_burden(burden);
    let confidence = burden_confidence(total_beats, elapsed_ms, heart_rate);

    BurdenResult {
        burden,
        confidence,
        category,
        interpretation: interpretation(category, confidence).to_string(),
    }
}

/// Weighted sum of four signals: span length, beat count, heart-rate
/// plausibility and how many beats were found relative to how many the
/// heart rate implies.
fn burden_confidence(total_beats: u64, elapsed_ms: i64, heart_rate: f64) -> f64 {
    let minutes = elapsed_ms.max(0) as f64 / 60_000.0;

    let duration = (minutes / 5.0).min(1.0) * 0.3;
    let beats = (total_beats as f64 / 300.0).min(1.0) * 0.3;
    let plausible = heart_rate.is_finite() && (40.0..=200.0).contains(&heart_rate);
    let rate = if plausible { 0.2 } else { 0.0 };

    let expected_beats = heart_rate * minutes;
    let detection = if plausible && expected_beats > 0.0 {
        let ratio = total_beats as f64 / expected_beats;
        (1.0 - (1.0 - ratio).abs()).max(0.0) * 0.2
    } else {
        0.0
    };

    (duration + beats + rate + detection).clamp(0.0, 1.0)
}

fn interpretation(category: BurdenCategory, confidence: f64) -> &'static str {
    if confidence < MIN_INTERPRETABLE_CONFIDENCE {
        return "Insufficient data";
    }
    match category {
        BurdenCategory::Low => "Low PVC burden, usually benign",
        BurdenCategory::Moderate => "Moderate PVC burden, worth monitoring",
        BurdenCategory::High => "High PVC burden, consider clinical follow-up",
    }
}

/// Least-squares slope over the newest burden values.
pub fn estimate_trend(points: &[BurdenDataPoint]) -> BurdenTrend {
    let recent = &points[points.len().saturating_sub(TREND_POINTS)..];
    if recent.len() < MIN_TREND_POINTS {
        return BurdenTrend {
            direction: TrendDirection::Stable,
            slope: 0.0,
            confidence: 0.0,
        };
    }

    let x = Array1::range(0.0, recent.len() as f64, 1.0);
    let y: Array1<f64> = recent.iter().map(|p| p.burden).collect();
    let (mx, my) = (x.mean().unwrap_or(0.0), y.mean().unwrap_or(0.0));
    let dx = x.mapv(|v| v - mx);
    let dy = y.mapv(|v| v - my);
    let denominator = dx.dot(&dx);
    let slope = if denominator > 0.0 { dx.dot(&dy) / denominator } else { 0.0 };

    let direction = if slope.abs() < STABLE_SLOPE {
        TrendDirection::Stable
    } else if slope > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    BurdenTrend {
        direction,
        slope,
        confidence: (recent.len() as f64 / TREND_POINTS as f64).min(1.0),
    }
}
