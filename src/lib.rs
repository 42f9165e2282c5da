use std::sync::Arc;

use uuid::Uuid;

pub mod analysis;
pub mod burden;
pub mod error;
pub mod log;
pub mod mock;
pub mod session;
pub mod storage;

pub use analysis::{
    AnalysisConfig, Beat, DetectionPathway, DetectionSnapshot, EventOrigin, PvcDetector, PvcEvent, TrainingResult,
    TrainingStatus,
};
pub use burden::{BurdenCategory, BurdenDataPoint, BurdenResult, BurdenTrend, TrendDirection};
pub use error::MonitorError;
pub use session::{Session, SessionConfig};
pub use storage::Sample;

uniffi::setup_scaffolding!();

/// Host-side receiver of everything the monitor reports.
#[uniffi::export(callback_interface)]
pub trait MonitorDelegate: Send + Sync {
    fn snapshot_updated(&self, snapshot: DetectionSnapshot);
    fn training_finished(&self, result: TrainingResult);
    fn burden_updated(&self, point: BurdenDataPoint);
}

#[derive(uniffi::Object)]
pub struct PvcMonitor {
    session: Session,
    id: String,
    rt: tokio::runtime::Runtime,
}

#[uniffi::export]
impl PvcMonitor {
    #[uniffi::constructor]
    pub fn new(sampling_frequency: f64) -> Result<Arc<Self>, MonitorError> {
        let rt = tokio::runtime::Runtime::new().map_err(|e| MonitorError::Runtime {
            reason: e.to_string(),
        })?;
        let id = Uuid::new_v4().to_string();
        let log = log::create_logger(&id);
        let session = Session::new(
            SessionConfig::with_sampling_frequency(sampling_frequency),
            log,
            rt.handle().clone(),
        )?;
        Ok(Arc::new(Self { session, id, rt }))
    }

    pub fn id(&self) -> String {
        self.id.clone()
    }

    pub fn push_sample(&self, sample: Sample) -> DetectionSnapshot {
        self.session.push_sample(sample)
    }

    pub fn training_status(&self) -> TrainingStatus {
        self.session.training_status()
    }

    pub fn burden_history(&self) -> Vec<BurdenDataPoint> {
        self.session.burden_history()
    }

    pub fn current_burden(&self) -> BurdenResult {
        self.session.current_burden()
    }

    pub fn burden_trend(&self) -> BurdenTrend {
        self.session.burden_trend()
    }

    pub fn reset(&self) {
        self.session.reset();
    }

    pub fn reset_counters(&self) {
        self.session.reset_counters();
    }

    pub fn start(&self, delegate: Box<dyn MonitorDelegate>) {
        let delegate: Arc<dyn MonitorDelegate> = Arc::from(delegate);
        self.session.set_delegate(delegate.clone());
        self.session.start_burden_timer(delegate);
    }
}
