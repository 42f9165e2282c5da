use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use slog::{debug, info, o, Logger};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::analysis::{AnalysisConfig, DetectionSnapshot, PvcDetector, TrainingStatus};
use crate::burden::{calculate_burden, estimate_trend, BurdenDataPoint, BurdenResult, BurdenTrend, TemporalBurden};
use crate::error::MonitorError;
use crate::storage::{BeatHistory, Sample};
use crate::MonitorDelegate;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub analysis: AnalysisConfig,
    /// Wall-clock period of the burden timer.
    pub burden_tick: Duration,
    /// Ledger size below which no burden value is produced.
    pub burden_min_beats: usize,
}

impl SessionConfig {
    pub fn with_sampling_frequency(sampling_frequency: f64) -> Self {
        Self {
            analysis: AnalysisConfig::with_sampling_frequency(sampling_frequency),
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            burden_tick: Duration::from_secs(30),
            burden_min_beats: 10,
        }
    }
}

/// Everything one stream mutates, guarded together so that a reset never
/// interleaves with a sample.
struct Monitor {
    detector: PvcDetector,
    history: BeatHistory,
    burden: TemporalBurden,
}

struct Shared {
    monitor: Mutex<Monitor>,
    delegate: RwLock<Option<Arc<dyn MonitorDelegate>>>,
    burden_min_beats: usize,
    log: Logger,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Monitor> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delegate(&self) -> Option<Arc<dyn MonitorDelegate>> {
        self.delegate
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, sample: Sample) -> DetectionSnapshot {
        let (snapshot, trained) = {
            let mut monitor = self.lock();
            let snapshot = monitor.detector.process_sample(sample);
            for record in monitor.detector.take_records() {
                monitor.history.record(record);
            }
            let trained = monitor.detector.take_finished_training();
            (snapshot, trained)
        };

        if let Some(delegate) = self.delegate() {
            if let Some(result) = trained {
                delegate.training_finished(result);
            }
            delegate.snapshot_updated(snapshot.clone());
        }
        snapshot
    }

    fn tick_burden(&self) -> Option<BurdenDataPoint> {
        let mut monitor = self.lock();
        if monitor.history.len() < self.burden_min_beats {
            debug!(self.log, "burden tick skipped"; "ledger" => monitor.history.len());
            return None;
        }
        let now = monitor.detector.last_timestamp()?;
        let Monitor { history, burden, .. } = &mut *monitor;
        history.prune(now);
        Some(burden.tick(now, history))
    }
}

/// One monitored stream: a detector, its beat ledger and the burden series,
/// plus the tasks feeding and sampling them.
pub struct Session {
    shared: Arc<Shared>,
    config: SessionConfig,
    handle: Handle,
    ingest: Mutex<Vec<JoinHandle<()>>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    log: Logger,
}

impl Session {
    pub fn new(config: SessionConfig, log: Logger, handle: Handle) -> Result<Self, MonitorError> {
        config.analysis.validate()?;
        let monitor = Monitor {
            detector: PvcDetector::new(config.analysis.clone(), log.new(o!("module" => "detector"))),
            history: BeatHistory::default(),
            burden: TemporalBurden::new(log.new(o!("module" => "burden"))),
        };
        info!(log, "session created"; "sampling_frequency" => config.analysis.sampling_frequency);

        Ok(Self {
            shared: Arc::new(Shared {
                monitor: Mutex::new(monitor),
                delegate: RwLock::new(None),
                burden_min_beats: config.burden_min_beats,
                log: log.new(o!("module" => "session")),
            }),
            config,
            handle,
            ingest: Mutex::new(Vec::new()),
            timers: Mutex::new(Vec::new()),
            log,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Receives snapshots, training results and burden values from now on.
    pub fn set_delegate(&self, delegate: Arc<dyn MonitorDelegate>) {
        *self
            .shared
            .delegate
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(delegate);
    }

    pub fn push_sample(&self, sample: Sample) -> DetectionSnapshot {
        self.shared.push(sample)
    }

    pub fn snapshot(&self) -> DetectionSnapshot {
        self.shared.lock().detector.snapshot()
    }

    pub fn training_status(&self) -> TrainingStatus {
        self.shared.lock().detector.training_status()
    }

    /// Appends a burden value for the window ending at the newest sample,
    /// unless the ledger is still too thin.
    pub fn tick_burden(&self) -> Option<BurdenDataPoint> {
        self.shared.tick_burden()
    }

    pub fn burden_history(&self) -> Vec<BurdenDataPoint> {
        self.shared.lock().burden.history()
    }

    /// Burden over everything counted since the last reset.
    pub fn current_burden(&self) -> BurdenResult {
        let snapshot = self.snapshot();
        calculate_burden(
            snapshot.total_beats as u64,
            snapshot.pvc_count as u64,
            snapshot.elapsed_ms,
            snapshot.heart_rate,
        )
    }

    pub fn burden_trend(&self) -> BurdenTrend {
        estimate_trend(&self.burden_history())
    }

    pub fn ledger_len(&self) -> usize {
        self.shared.lock().history.len()
    }

    pub fn reset(&self) {
        let mut monitor = self.shared.lock();
        monitor.detector.reset();
        monitor.history.clear();
        monitor.burden.clear();
        info!(self.log, "session reset");
    }

    pub fn reset_counters(&self) {
        self.shared.lock().detector.reset_counters();
    }

    /// Starts the single consumer of a bounded sample queue. Samples are
    /// processed in send order and a full queue makes the sender wait.
    pub fn spawn_ingest(&self, capacity: usize) -> mpsc::Sender<Sample> {
        let (sender, mut receiver) = mpsc::channel::<Sample>(capacity.max(1));
        let shared = self.shared.clone();
        let task = self.handle.spawn(async move {
            let mut processed = 0u64;
            while let Some(sample) = receiver.recv().await {
                shared.push(sample);
                processed += 1;
            }
            debug!(shared.log, "ingest closed"; "processed" => processed);
        });
        lock_tasks(&self.ingest).push(task);
        sender
    }

    /// Ticks the burden aggregator every `burden_tick` and reports each new
    /// value to the delegate. A timer started earlier is stopped first.
    pub fn start_burden_timer(&self, delegate: Arc<dyn MonitorDelegate>) {
        let mut timers = lock_tasks(&self.timers);
        for task in timers.drain(..) {
            task.abort();
        }
        let shared = self.shared.clone();
        let period = self.config.burden_tick;
        let task = self.handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Some(point) = shared.tick_burden() {
                    delegate.burden_updated(point);
                }
            }
        });
        timers.push(task);
        info!(self.log, "burden timer started"; "period_ms" => period.as_millis() as u64);
    }

    /// Waits until every ingest queue has been closed by its senders and
    /// fully processed.
    pub async fn drain(&self) {
        let tasks = std::mem::take(&mut *lock_tasks(&self.ingest));
        for result in join_all(tasks).await {
            if let Err(e) = result {
                debug!(self.log, "ingest task ended abnormally"; "error" => e.to_string());
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for task in lock_tasks(&self.ingest).iter().chain(lock_tasks(&self.timers).iter()) {
            task.abort();
        }
    }
}

fn lock_tasks(tasks: &Mutex<Vec<JoinHandle<()>>>) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}
