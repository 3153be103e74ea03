use common::{Timeframe, WindowError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    /// Window too short; fatal to the run, no partial result
    #[error("Insufficient data for {component}: need {required} samples, got {actual}")]
    InsufficientData {
        component: &'static str,
        required: usize,
        actual: usize,
    },

    /// Signals derived from different windows were combined
    #[error("Input mismatch: {0}")]
    InputMismatch(String),

    #[error("Missing {0} price window")]
    MissingTimeframe(Timeframe),

    #[error("Invalid price window: {0}")]
    Window(#[from] WindowError),

    #[error("Weight load error: {0}")]
    WeightLoad(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SignalError>;
