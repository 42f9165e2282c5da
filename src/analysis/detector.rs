use std::collections::VecDeque;

use slog::{info, o, Logger};

use crate::analysis::beat::{Beat, BeatDetector, DetectedBeat};
use crate::analysis::classifier::{BeatContext, DetectionPathway, PvcClassifier};
use crate::analysis::events::{EventOrigin, PvcEvent, PvcEvents};
use crate::analysis::gap::GapInference;
use crate::analysis::rr::RrHistory;
use crate::analysis::signal::{median, signal_quality, Waveform};
use crate::analysis::training::{MorphologyTrainer, TrainingBeat, TrainingResult};
use crate::analysis::{detection_retention, AnalysisConfig};
use crate::storage::{BeatRecord, Sample, SampleBuffer};

/// RR intervals behind the reported heart rate.
const HEART_RATE_WINDOW: usize = 10;
const PLAUSIBLE_HEART_RATE: (f64, f64) = (40.0, 200.0);

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct DetectionSnapshot {
    pub is_learning: bool,
    pub pvc_count: u32,
    pub total_beats: u32,
    /// Beats per minute, 0 when implausible or unknown.
    pub heart_rate: f64,
    pub beats: Vec<Beat>,
    pub events: Vec<PvcEvent>,
    pub elapsed_ms: i64,
    pub signal_quality: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, uniffi::Record)]
pub struct TrainingStatus {
    pub is_learning: bool,
    pub progress: u32,
    pub total: u32,
    pub latest_result: Option<TrainingResult>,
}

struct PendingBeat {
    beat: Beat,
    waveform: Waveform,
    rr_ms: Option<f64>,
}

struct Detecting {
    classifier: PvcClassifier,
    /// Newest beat, classified once its successor shows up.
    pending: Option<PendingBeat>,
}

enum Mode {
    Learning(Vec<TrainingBeat>),
    Detecting(Detecting),
}

/// The per-stream engine: buffers samples, finds beats, learns the normal
/// morphology from the first batch and classifies every beat after that.
pub struct PvcDetector {
    config: AnalysisConfig,
    log: Logger,
    buffer: SampleBuffer,
    beat_detector: BeatDetector,
    trainer: MorphologyTrainer,
    gap: GapInference,
    rr: RrHistory,
    beats: VecDeque<Beat>,
    events: PvcEvents,
    mode: Mode,
    retention_ms: i64,

    beats_detected: u64,
    beat_counter: u64,
    pvc_counter: u64,
    elapsed_origin_ms: Option<i64>,

    latest_training: Option<TrainingResult>,
    finished_training: Option<TrainingResult>,
    records: VecDeque<BeatRecord>,
}

impl PvcDetector {
    pub fn new(config: AnalysisConfig, log: Logger) -> Self {
        let retention_ms = detection_retention().num_milliseconds();
        Self {
            buffer: SampleBuffer::new(config.buffer_capacity()),
            beat_detector: BeatDetector::new(config.beat.clone(), log.new(o!("module" => "beat"))),
            trainer: MorphologyTrainer::new(config.training.clone(), log.new(o!("module" => "training"))),
            gap: GapInference::new(config.gap.clone(), log.new(o!("module" => "gap"))),
            rr: RrHistory::new(config.rr.clone()),
            beats: VecDeque::new(),
            events: PvcEvents::new(retention_ms),
            mode: Mode::Learning(Vec::with_capacity(config.training.batch_size)),
            retention_ms,
            beats_detected: 0,
            beat_counter: 0,
            pvc_counter: 0,
            elapsed_origin_ms: None,
            latest_training: None,
            finished_training: None,
            records: VecDeque::new(),
            config,
            log,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn process_sample(&mut self, sample: Sample) -> DetectionSnapshot {
        self.elapsed_origin_ms.get_or_insert(sample.timestamp_ms);
        self.buffer.push(sample);

        for detected in self.beat_detector.on_sample(&self.buffer) {
            self.on_beat(detected);
        }
        self.snapshot()
    }

    fn on_beat(&mut self, detected: DetectedBeat) {
        let DetectedBeat { beat, waveform } = detected;
        let timestamp = beat.timestamp_ms;
        let previous = self.beats.back().map(|b| b.timestamp_ms);
        let rr_ms = previous.map(|p| (timestamp - p) as f64);

        self.beats.push_back(beat);
        let cutoff = timestamp - self.retention_ms;
        while self.beats.front().map_or(false, |b| b.timestamp_ms < cutoff) {
            self.beats.pop_front();
        }
        self.events.prune(timestamp);
        self.beats_detected += 1;
        self.beat_counter += 1;

        match &mut self.mode {
            Mode::Learning(batch) => {
                batch.push(TrainingBeat {
                    timestamp_ms: timestamp,
                    amplitude: beat.amplitude,
                    qrs_width_ms: beat.qrs_width_ms,
                    waveform,
                });
                if let Some(p) = previous {
                    self.rr.record(p, timestamp);
                }
                if batch.len() >= self.config.training.batch_size {
                    self.finish_training();
                }
            }
            Mode::Detecting(state) => {
                if let Some(pending) = state.pending.take() {
                    let next_rr = (timestamp - pending.beat.timestamp_ms) as f64;
                    let beat_count = self.beats.len();
                    let rr = &mut self.rr;
                    let events = &mut self.events;

                    let expected_rr = rr.expected_rr();
                    let verdict = state.classifier.classify(&BeatContext {
                        beat: &pending.beat,
                        waveform: &pending.waveform,
                        current_rr: pending.rr_ms.unwrap_or(expected_rr),
                        next_rr: Some(next_rr),
                        expected_rr,
                        recent_rr_mean: rr.recent_mean(state.classifier.params().template_rr_window),
                        beat_count,
                    });

                    if verdict.is_pvc {
                        self.pvc_counter += 1;
                        events.insert(PvcEvent {
                            timestamp_ms: pending.beat.timestamp_ms,
                            rr_ms: pending.rr_ms.unwrap_or(expected_rr),
                            expected_rr_ms: verdict.expected_rr,
                            prematurity_pct: verdict.prematurity_pct,
                            qrs_width_ms: pending.beat.qrs_width_ms,
                            confidence: verdict.confidence,
                            dissimilarity: verdict.dissimilarity,
                            pathway: verdict.pathway.unwrap_or(DetectionPathway::PrematureMorph),
                            amplitude: pending.beat.amplitude,
                            origin: EventOrigin::Classified,
                        });
                    }
                    let record = BeatRecord {
                        timestamp_ms: pending.beat.timestamp_ms,
                        is_pvc: verdict.is_pvc,
                        confidence: verdict.confidence,
                    };
                    push_record(&mut self.records, self.config.record_capacity, record);
                    rr.admit(pending.beat.timestamp_ms, &events.classified_timestamps());
                }

                state.pending = Some(PendingBeat { beat, waveform, rr_ms });
                if let Some(p) = previous {
                    self.rr.record(p, timestamp);
                }

                if self.gap.due(self.beats_detected) {
                    if let Some(event) = self.gap.infer(&self.rr, &self.events) {
                        // the missed beat is a beat too
                        self.beat_counter += 1;
                        self.pvc_counter += 1;
                        let record = BeatRecord {
                            timestamp_ms: event.timestamp_ms,
                            is_pvc: true,
                            confidence: event.confidence,
                        };
                        push_record(&mut self.records, self.config.record_capacity, record);
                        self.events.insert(event);
                    }
                }
            }
        }
    }

    fn finish_training(&mut self) {
        let Mode::Learning(batch) = &mut self.mode else {
            return;
        };
        let batch = std::mem::take(batch);
        let outcome = self.trainer.train(&batch);
        let seeded = self.rr.seed_trusted();

        let classifier = PvcClassifier::new(
            self.config.classifier.clone(),
            outcome.templates,
            self.log.new(o!("module" => "classifier")),
        );
        self.mode = Mode::Detecting(Detecting {
            classifier,
            pending: None,
        });
        self.elapsed_origin_ms = self.buffer.last_timestamp();
        self.latest_training = Some(outcome.result);
        self.finished_training = Some(outcome.result);

        info!(self.log, "learning finished, detecting";
            "beats" => batch.len(),
            "trusted_rr" => seeded,
            "confidence" => outcome.result.confidence);
    }

    pub fn snapshot(&self) -> DetectionSnapshot {
        let window = self.config.sampling_frequency.round().max(1.0) as usize;
        DetectionSnapshot {
            is_learning: self.is_learning(),
            pvc_count: self.pvc_counter as u32,
            total_beats: self.beat_counter as u32,
            heart_rate: self.heart_rate(),
            beats: self.beats.iter().copied().collect(),
            events: self.events.to_vec(),
            elapsed_ms: self.elapsed_ms(),
            signal_quality: signal_quality(self.buffer.recent_amplitudes(window)),
        }
    }

    pub fn training_status(&self) -> TrainingStatus {
        let total = self.config.training.batch_size as u32;
        let progress = match &self.mode {
            Mode::Learning(batch) => batch.len() as u32,
            Mode::Detecting(_) => total,
        };
        TrainingStatus {
            is_learning: self.is_learning(),
            progress,
            total,
            latest_result: self.latest_training,
        }
    }

    pub fn is_learning(&self) -> bool {
        matches!(self.mode, Mode::Learning(_))
    }

    pub fn heart_rate(&self) -> f64 {
        let Some(rr) = median(&self.rr.recent_raw(HEART_RATE_WINDOW)) else {
            return 0.0;
        };
        let bpm = 60_000.0 / rr;
        let (low, high) = PLAUSIBLE_HEART_RATE;
        if bpm.is_finite() && (low..=high).contains(&bpm) {
            bpm
        } else {
            0.0
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        match (self.elapsed_origin_ms, self.buffer.last_timestamp()) {
            (Some(origin), Some(last)) => (last - origin).max(0),
            _ => 0,
        }
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.buffer.last_timestamp()
    }

    pub fn template_count(&self) -> usize {
        match &self.mode {
            Mode::Learning(_) => 0,
            Mode::Detecting(state) => state.classifier.template_count(),
        }
    }

    pub fn rr_history(&self) -> &RrHistory {
        &self.rr
    }

    pub fn beats(&self) -> impl Iterator<Item = &Beat> {
        self.beats.iter()
    }

    pub fn events(&self) -> impl Iterator<Item = &PvcEvent> {
        self.events.iter()
    }

    /// Beats classified since the last call, including inferred ones. Only
    /// the newest `record_capacity` are held between calls.
    pub fn take_records(&mut self) -> Vec<BeatRecord> {
        self.records.drain(..).collect()
    }

    /// The training result, once, right after learning ends.
    pub fn take_finished_training(&mut self) -> Option<TrainingResult> {
        self.finished_training.take()
    }

    /// Clears counts, events and the elapsed-time origin. The learned
    /// templates, RR history and recent beats stay. A beat still waiting for
    /// its successor is counted again, since its verdict lands after the
    /// reset.
    pub fn reset_counters(&mut self) {
        self.beat_counter = match &self.mode {
            Mode::Detecting(Detecting { pending: Some(_), .. }) => 1,
            _ => 0,
        };
        self.pvc_counter = 0;
        self.events.clear();
        self.elapsed_origin_ms = None;
        info!(self.log, "counters reset");
    }

    /// Drops all state and starts learning again.
    pub fn reset(&mut self) {
        *self = PvcDetector::new(self.config.clone(), self.log.clone());
        info!(self.log, "detector reset, learning");
    }
}

fn push_record(records: &mut VecDeque<BeatRecord>, capacity: usize, record: BeatRecord) {
    records.push_back(record);
    while records.len() > capacity {
        records.pop_front();
    }
}
