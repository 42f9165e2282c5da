use thiserror::Error;

#[derive(Debug, Error, uniffi::Error)]
pub enum MonitorError {
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
    #[error("runtime unavailable: {reason}")]
    Runtime { reason: String },
}
