use std::cmp::Ordering;

use ndarray::Array1;
use slog::{info, warn, Logger};

use crate::analysis::signal::{variance, Waveform};

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Beats collected before training runs.
    pub batch_size: usize,
    /// Shorter waveforms are dropped before clustering.
    pub min_window_samples: usize,
    pub min_overlap: usize,
    pub correlation_threshold: f64,
    pub min_cluster_size: usize,
    /// Below this share of beats the dominant cluster is reported as weak.
    pub dominance_warning: f64,
    /// Best-matching members added as templates next to the centroid.
    pub member_templates: usize,
    /// Cluster size counted as fully adequate.
    pub adequate_cluster_size: f64,
    /// Templates are discarded below this confidence.
    pub min_confidence: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            batch_size: 40,
            min_window_samples: 20,
            min_overlap: 10,
            correlation_threshold: 0.7,
            min_cluster_size: 3,
            dominance_warning: 0.4,
            member_templates: 5,
            adequate_cluster_size: 20.0,
            min_confidence: 0.5,
        }
    }
}

/// A beat collected while learning.
#[derive(Debug, Clone)]
pub struct TrainingBeat {
    pub timestamp_ms: i64,
    pub waveform: Waveform,
    pub amplitude: f64,
    pub qrs_width_ms: f64,
}

#[derive(Debug, Clone)]
pub struct ClusterMember {
    pub timestamp_ms: i64,
    /// Normalized to unit peak.
    pub waveform: Waveform,
    pub qrs_width_ms: f64,
}

#[derive(Debug, Clone)]
pub struct MorphologyCluster {
    pub members: Vec<ClusterMember>,
    pub centroid: Waveform,
    /// Mean pairwise correlation between members.
    pub avg_correlation: f64,
}

impl MorphologyCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_timestamps(&self) -> Vec<i64> {
        self.members.iter().map(|m| m.timestamp_ms).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, uniffi::Record)]
pub struct TrainingResult {
    pub beats_used: u32,
    pub clusters_found: u32,
    pub dominant_cluster_size: u32,
    pub dominance_ratio: f64,
    pub confidence: f64,
    pub quality: f64,
    pub template_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingOutcome {
    /// Largest first.
    pub clusters: Vec<MorphologyCluster>,
    pub templates: Vec<Waveform>,
    pub result: TrainingResult,
}

impl TrainingOutcome {
    pub fn dominant(&self) -> Option<&MorphologyCluster> {
        self.clusters.first()
    }
}

/// Learns the subject's normal beat shape from an unlabeled batch of early
/// beats by correlation clustering.
pub struct MorphologyTrainer {
    params: Parameters,
    log: Logger,
}

impl MorphologyTrainer {
    pub fn new(params: Parameters, log: Logger) -> Self {
        Self { params, log }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn train(&self, batch: &[TrainingBeat]) -> TrainingOutcome {
        let beats: Vec<ClusterMember> = batch
            .iter()
            .filter(|b| b.waveform.len() >= self.params.min_window_samples)
            .filter_map(|b| {
                Some(ClusterMember {
                    timestamp_ms: b.timestamp_ms,
                    waveform: b.waveform.normalized()?,
                    qrs_width_ms: b.qrs_width_ms,
                })
            })
            .collect();

        let clusters = self.cluster(&beats);
        let Some(dominant) = clusters.first() else {
            warn!(self.log, "no morphology cluster found, continuing without templates";
                "beats" => beats.len());
            return TrainingOutcome {
                clusters,
                templates: Vec::new(),
                result: TrainingResult {
                    beats_used: beats.len() as u32,
                    ..TrainingResult::default()
                },
            };
        };

        let dominance = dominant.len() as f64 / beats.len() as f64;
        if dominance < self.params.dominance_warning {
            warn!(self.log, "dominant cluster holds a minority of beats";
                "dominance" => dominance, "clusters" => clusters.len());
        }

        let avg_correlation = dominant.avg_correlation;
        let confidence = (dominance * avg_correlation * 1.2).clamp(0.0, 1.0);

        let widths: Vec<f64> = dominant.members.iter().map(|m| m.qrs_width_ms).collect();
        let width_consistency = (1.0 - variance(&widths).unwrap_or(0.0) / 100.0).max(0.0);
        let size_adequacy = (dominant.len() as f64 / self.params.adequate_cluster_size).min(1.0);
        let quality = ((size_adequacy + avg_correlation.max(0.0) + width_consistency) / 3.0).clamp(0.0, 1.0);

        let templates = if confidence < self.params.min_confidence {
            warn!(self.log, "training confidence too low, templates discarded";
                "confidence" => confidence);
            Vec::new()
        } else {
            self.templates(dominant)
        };

        let result = TrainingResult {
            beats_used: beats.len() as u32,
            clusters_found: clusters.len() as u32,
            dominant_cluster_size: dominant.len() as u32,
            dominance_ratio: dominance,
            confidence,
            quality,
            template_count: templates.len() as u32,
        };
        info!(self.log, "training finished";
            "clusters" => result.clusters_found,
            "dominant" => result.dominant_cluster_size,
            "confidence" => result.confidence,
            "quality" => result.quality,
            "templates" => result.template_count);

        TrainingOutcome {
            clusters,
            templates,
            result,
        }
    }

    /// Greedy single pass: each unassigned beat seeds a cluster and absorbs
    /// every later unassigned beat correlating with it above threshold.
    fn cluster(&self, beats: &[ClusterMember]) -> Vec<MorphologyCluster> {
        let mut assigned = vec![false; beats.len()];
        let mut clusters = Vec::new();

        for seed in 0..beats.len() {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;
            let mut members = vec![seed];

            for candidate in seed + 1..beats.len() {
                if assigned[candidate] {
                    continue;
                }
                let r = beats[seed]
                    .waveform
                    .correlation(&beats[candidate].waveform, self.params.min_overlap);
                if r.map_or(false, |r| r > self.params.correlation_threshold) {
                    assigned[candidate] = true;
                    members.push(candidate);
                }
            }

            if members.len() >= self.params.min_cluster_size {
                let members: Vec<ClusterMember> = members.into_iter().map(|i| beats[i].clone()).collect();
                clusters.push(MorphologyCluster {
                    centroid: centroid(&members),
                    avg_correlation: self.mean_pairwise_correlation(&members),
                    members,
                });
            }
        }

        clusters.sort_by(|a, b| b.len().cmp(&a.len()));
        clusters
    }

    fn mean_pairwise_correlation(&self, members: &[ClusterMember]) -> f64 {
        let mut sum = 0.0;
        let mut pairs = 0usize;
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                if let Some(r) = a.waveform.correlation(&b.waveform, self.params.min_overlap) {
                    sum += r;
                    pairs += 1;
                }
            }
        }
        if pairs == 0 {
            0.0
        } else {
            sum / pairs as f64
        }
    }

    /// The centroid first, then the members closest to it.
    fn templates(&self, cluster: &MorphologyCluster) -> Vec<Waveform> {
        let mut ranked: Vec<(f64, &ClusterMember)> = cluster
            .members
            .iter()
            .map(|m| {
                let r = m
                    .waveform
                    .correlation(&cluster.centroid, self.params.min_overlap)
                    .unwrap_or(-1.0);
                (r, m)
            })
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        std::iter::once(cluster.centroid.clone())
            .chain(
                ranked
                    .into_iter()
                    .take(self.params.member_templates)
                    .map(|(_, m)| m.waveform.clone()),
            )
            .collect()
    }
}

/// Per-index mean of peak-aligned waveforms. Indices a member does not
/// cover are left out of that index's mean.
fn centroid(members: &[ClusterMember]) -> Waveform {
    let before = members.iter().map(|m| m.waveform.peak_offset).max().unwrap_or(0);
    let after = members.iter().map(|m| m.waveform.post_peak()).max().unwrap_or(0);
    let len = before + after + 1;

    let mut sums = Array1::<f64>::zeros(len);
    let mut counts = Array1::<f64>::zeros(len);
    for member in members {
        let shift = before - member.waveform.peak_offset;
        for (k, value) in member.waveform.samples.iter().enumerate() {
            sums[shift + k] += value;
            counts[shift + k] += 1.0;
        }
    }

    let samples = ndarray::Zip::from(&sums)
        .and(&counts)
        .map_collect(|&s, &c| if c > 0.0 { s / c } else { 0.0 });
    Waveform::new(samples, before)
}
