use std::collections::VecDeque;
use std::fmt;

use slog::{debug, Logger};

use crate::analysis::beat::Beat;
use crate::analysis::signal::Waveform;

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Beats needed before anything is classified.
    pub min_beats: usize,
    pub morphology_only_threshold: f64,
    pub morphology_only_max_confidence: f64,
    pub high_amplitude: f64,
    pub elevated_amplitude: f64,
    /// Current RR below this share of the expected RR counts as early.
    pub premature_ratio: f64,
    pub wide_qrs_ms: f64,
    pub strongly_premature_ratio: f64,
    pub abnormal_morphology: f64,
    pub pause_ratio: f64,
    pub pause_premature_ratio: f64,
    pub pause_morphology_boost: f64,
    /// Templates compared against each beat, newest first.
    pub comparison_templates: usize,
    pub template_capacity: usize,
    pub min_overlap: usize,
    pub template_max_dissimilarity: f64,
    pub template_premature_ratio: f64,
    pub template_max_amplitude: f64,
    pub template_max_qrs_ms: f64,
    /// Intervals averaged for the template prematurity gate.
    pub template_rr_window: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            min_beats: 8,
            morphology_only_threshold: 0.7,
            morphology_only_max_confidence: 0.9,
            high_amplitude: 800.0,
            elevated_amplitude: 600.0,
            premature_ratio: 0.80,
            wide_qrs_ms: 120.0,
            strongly_premature_ratio: 0.70,
            abnormal_morphology: 0.12,
            pause_ratio: 1.25,
            pause_premature_ratio: 0.85,
            pause_morphology_boost: 0.08,
            comparison_templates: 10,
            template_capacity: 12,
            min_overlap: 10,
            template_max_dissimilarity: 0.1,
            template_premature_ratio: 0.85,
            template_max_amplitude: 500.0,
            template_max_qrs_ms: 90.0,
            template_rr_window: 10,
        }
    }
}

/// Which rule flagged a PVC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum DetectionPathway {
    MorphologyOnly,
    HighAmplitude,
    WideQrs,
    PrematureMorph,
    GapDetected,
}

impl DetectionPathway {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionPathway::MorphologyOnly => "morphology-only",
            DetectionPathway::HighAmplitude => "high-amplitude",
            DetectionPathway::WideQrs => "wide-qrs",
            DetectionPathway::PrematureMorph => "premature-morph",
            DetectionPathway::GapDetected => "gap-detected",
        }
    }
}

impl fmt::Display for DetectionPathway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about a beat at the time it is classified.
#[derive(Debug, Clone, Copy)]
pub struct BeatContext<'a> {
    pub beat: &'a Beat,
    pub waveform: &'a Waveform,
    pub current_rr: f64,
    /// Interval to the following beat, once that beat exists.
    pub next_rr: Option<f64>,
    pub expected_rr: f64,
    /// Average of the recent intervals, for template gating.
    pub recent_rr_mean: Option<f64>,
    pub beat_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub is_pvc: bool,
    pub confidence: f64,
    pub pathway: Option<DetectionPathway>,
    pub prematurity_pct: i32,
    pub dissimilarity: f64,
    pub expected_rr: f64,
}

impl Classification {
    fn normal(prematurity_pct: i32, dissimilarity: f64, expected_rr: f64) -> Self {
        Self {
            is_pvc: false,
            confidence: 0.0,
            pathway: None,
            prematurity_pct,
            dissimilarity,
            expected_rr,
        }
    }

    fn pvc(pathway: DetectionPathway, confidence: f64, base: Classification) -> Self {
        Self {
            is_pvc: true,
            confidence: confidence.clamp(0.0, 1.0),
            pathway: Some(pathway),
            ..base
        }
    }
}

/// Multi-pathway PVC decision against a bounded, self-refreshing set of
/// normal-beat templates.
pub struct PvcClassifier {
    params: Parameters,
    log: Logger,
    templates: VecDeque<Waveform>,
}

impl PvcClassifier {
    /// `templates` are expected to be normalized already.
    pub fn new(params: Parameters, templates: Vec<Waveform>, log: Logger) -> Self {
        let mut classifier = Self {
            params,
            log,
            templates: VecDeque::new(),
        };
        for template in templates {
            classifier.push_template(template);
        }
        classifier
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn templates(&self) -> impl Iterator<Item = &Waveform> {
        self.templates.iter()
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// 1 minus the best correlation against the newest templates; 0 when
    /// there is nothing to compare against.
    pub fn dissimilarity(&self, waveform: &Waveform) -> f64 {
        let Some(normalized) = waveform.normalized() else {
            return 0.0;
        };
        self.templates
            .iter()
            .rev()
            .take(self.params.comparison_templates)
            .filter_map(|t| normalized.correlation(t, self.params.min_overlap))
            .map(|r| r.clamp(0.0, 1.0))
            .reduce(f64::max)
            .map_or(0.0, |best| 1.0 - best)
    }

    pub fn classify(&mut self, ctx: &BeatContext<'_>) -> Classification {
        let p = &self.params;
        let expected = ctx.expected_rr;
        let prematurity_pct = ((1.0 - ctx.current_rr / expected) * 100.0).round() as i32;

        if ctx.beat_count < p.min_beats {
            return Classification::normal(prematurity_pct, 0.0, expected);
        }

        let dissimilarity = self.dissimilarity(ctx.waveform);
        let base = Classification::normal(prematurity_pct, dissimilarity, expected);

        let verdict = if dissimilarity > p.morphology_only_threshold {
            Classification::pvc(
                DetectionPathway::MorphologyOnly,
                dissimilarity.min(p.morphology_only_max_confidence),
                base,
            )
        } else {
            self.evaluate_pathways(ctx, base)
        };

        if verdict.is_pvc {
            debug!(self.log, "pvc";
                "timestamp" => ctx.beat.timestamp_ms,
                "pathway" => %verdict.pathway.map_or("none", |p| p.as_str()),
                "confidence" => verdict.confidence,
                "rr" => ctx.current_rr,
                "expected" => expected,
                "dissimilarity" => dissimilarity);
        } else if self.admissible_template(ctx, dissimilarity) {
            if let Some(template) = ctx.waveform.normalized() {
                self.push_template(template);
            }
        }
        verdict
    }

    /// First matching rule wins.
    fn evaluate_pathways(&self, ctx: &BeatContext<'_>, base: Classification) -> Classification {
        let p = &self.params;
        let amplitude = ctx.beat.amplitude.abs();
        let expected = ctx.expected_rr;
        let rr = ctx.current_rr;
        let dissimilarity = base.dissimilarity;

        if amplitude > p.high_amplitude
            || (amplitude > p.elevated_amplitude && rr < p.premature_ratio * expected)
        {
            return Classification::pvc(DetectionPathway::HighAmplitude, 0.9, base);
        }
        if ctx.beat.qrs_width_ms > p.wide_qrs_ms && rr < p.premature_ratio * expected {
            return Classification::pvc(DetectionPathway::WideQrs, 0.8, base);
        }
        if rr < p.strongly_premature_ratio * expected && dissimilarity > p.abnormal_morphology {
            return Classification::pvc(DetectionPathway::PrematureMorph, 0.7, base);
        }
        if let Some(next) = ctx.next_rr {
            if next > p.pause_ratio * expected && rr < p.pause_premature_ratio * expected {
                let confidence = if dissimilarity > p.pause_morphology_boost {
                    0.75
                } else {
                    0.6
                };
                return Classification::pvc(DetectionPathway::PrematureMorph, confidence, base);
            }
        }
        base
    }

    fn admissible_template(&self, ctx: &BeatContext<'_>, dissimilarity: f64) -> bool {
        let p = &self.params;
        let premature = ctx
            .recent_rr_mean
            .map_or(false, |avg| ctx.current_rr < p.template_premature_ratio * avg);

        dissimilarity < p.template_max_dissimilarity
            && !premature
            && ctx.beat.amplitude.abs() < p.template_max_amplitude
            && ctx.beat.qrs_width_ms < p.template_max_qrs_ms
    }

    fn push_template(&mut self, template: Waveform) {
        self.templates.push_back(template);
        while self.templates.len() > self.params.template_capacity {
            self.templates.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::discard_logger;
    use ndarray::Array1;

    fn gaussian(amplitude: f64, sigma: f64) -> Waveform {
        let samples: Vec<f64> = (0..101)
            .map(|i| {
                let d = i as f64 - 60.0;
                amplitude * (-(d * d) / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        Waveform::new(Array1::from(samples), 60)
    }

    fn beat(amplitude: f64, qrs_width_ms: f64) -> Beat {
        Beat {
            timestamp_ms: 40_000,
            amplitude,
            qrs_width_ms,
            buffer_index: 200,
        }
    }

    fn classifier() -> PvcClassifier {
        let template = gaussian(400.0, 2.6).normalized().unwrap();
        PvcClassifier::new(Parameters::default(), vec![template], discard_logger())
    }

    fn classify(
        classifier: &mut PvcClassifier,
        beat: &Beat,
        waveform: &Waveform,
        current_rr: f64,
        next_rr: Option<f64>,
    ) -> Classification {
        classifier.classify(&BeatContext {
            beat,
            waveform,
            current_rr,
            next_rr,
            expected_rr: 800.0,
            recent_rr_mean: Some(800.0),
            beat_count: 50,
        })
    }

    #[test]
    fn too_few_beats_is_never_a_pvc() {
        let mut c = classifier();
        let b = beat(2_000.0, 200.0);
        let w = gaussian(2_000.0, 2.6);
        let verdict = c.classify(&BeatContext {
            beat: &b,
            waveform: &w,
            current_rr: 300.0,
            next_rr: None,
            expected_rr: 800.0,
            recent_rr_mean: None,
            beat_count: 7,
        });
        assert!(!verdict.is_pvc);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.prematurity_pct, 63);
    }

    #[test]
    fn high_amplitude_wins_first() {
        let mut c = classifier();
        let verdict = classify(&mut c, &beat(900.0, 150.0), &gaussian(900.0, 2.6), 500.0, Some(1_100.0));
        assert!(verdict.is_pvc);
        assert_eq!(verdict.pathway, Some(DetectionPathway::HighAmplitude));
        assert_eq!(verdict.confidence, 0.9);
        assert_eq!(verdict.prematurity_pct, 38);
    }

    #[test]
    fn elevated_amplitude_needs_prematurity() {
        let mut c = classifier();
        let on_time = classify(&mut c, &beat(700.0, 80.0), &gaussian(700.0, 2.6), 800.0, None);
        assert!(!on_time.is_pvc);
        let early = classify(&mut c, &beat(700.0, 80.0), &gaussian(700.0, 2.6), 600.0, None);
        assert_eq!(early.pathway, Some(DetectionPathway::HighAmplitude));
    }

    #[test]
    fn wide_and_early_is_wide_qrs() {
        let mut c = classifier();
        let verdict = classify(&mut c, &beat(400.0, 130.0), &gaussian(400.0, 2.6), 600.0, None);
        assert_eq!(verdict.pathway, Some(DetectionPathway::WideQrs));
        assert_eq!(verdict.confidence, 0.8);
    }

    #[test]
    fn very_different_shape_is_morphology_only() {
        let mut c = classifier();
        let verdict = classify(&mut c, &beat(400.0, 80.0), &gaussian(-400.0, 2.6), 800.0, None);
        assert_eq!(verdict.pathway, Some(DetectionPathway::MorphologyOnly));
        assert!(verdict.confidence <= 0.9);
        assert!(verdict.dissimilarity > 0.7);
    }

    #[test]
    fn premature_with_abnormal_shape() {
        let mut c = classifier();
        let verdict = classify(&mut c, &beat(400.0, 100.0), &gaussian(400.0, 6.0), 500.0, None);
        assert!(verdict.dissimilarity > 0.12 && verdict.dissimilarity <= 0.7);
        assert_eq!(verdict.pathway, Some(DetectionPathway::PrematureMorph));
        assert_eq!(verdict.confidence, 0.7);
    }

    #[test]
    fn compensatory_pause_needs_next_interval() {
        let mut c = classifier();
        let b = beat(400.0, 80.0);
        let w = gaussian(400.0, 2.6);

        let without = classify(&mut c, &b, &w, 650.0, None);
        assert!(!without.is_pvc);

        let with = classify(&mut c, &b, &w, 650.0, Some(1_050.0));
        assert_eq!(with.pathway, Some(DetectionPathway::PrematureMorph));
        assert_eq!(with.confidence, 0.6);
    }

    #[test]
    fn compensatory_pause_with_odd_shape_is_more_confident() {
        let mut c = classifier();
        let verdict = classify(&mut c, &beat(400.0, 100.0), &gaussian(400.0, 6.0), 650.0, Some(1_050.0));
        assert_eq!(verdict.pathway, Some(DetectionPathway::PrematureMorph));
        assert!(verdict.dissimilarity > 0.08 && verdict.dissimilarity <= 0.7);
        assert_eq!(verdict.confidence, 0.75);
    }

    #[test]
    fn on_time_normal_beat() {
        let mut c = classifier();
        let verdict = classify(&mut c, &beat(400.0, 80.0), &gaussian(400.0, 2.6), 800.0, Some(800.0));
        assert!(!verdict.is_pvc);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.pathway, None);
        assert_eq!(verdict.prematurity_pct, 0);
    }

    #[test]
    fn template_set_is_bounded_and_gated() {
        let mut c = classifier();
        for _ in 0..30 {
            classify(&mut c, &beat(400.0, 80.0), &gaussian(400.0, 2.6), 800.0, None);
            assert!(c.template_count() <= 12);
        }
        assert_eq!(c.template_count(), 12);

        let mut c = classifier();
        classify(&mut c, &beat(550.0, 80.0), &gaussian(550.0, 2.6), 800.0, None);
        classify(&mut c, &beat(400.0, 95.0), &gaussian(400.0, 2.6), 800.0, None);
        classify(&mut c, &beat(400.0, 80.0), &gaussian(400.0, 2.6), 650.0, None);
        assert_eq!(c.template_count(), 1);
    }

    #[test]
    fn no_templates_means_no_morphology() {
        let mut c = PvcClassifier::new(Parameters::default(), Vec::new(), discard_logger());
        let verdict = classify(&mut c, &beat(400.0, 80.0), &gaussian(-400.0, 2.6), 800.0, None);
        assert_eq!(verdict.dissimilarity, 0.0);
        assert!(!verdict.is_pvc);
    }
}
