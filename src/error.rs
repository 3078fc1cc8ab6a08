// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("gesture label must not be empty")]
    InvalidLabel,

    #[error("a collection for '{0}' is already in progress")]
    AlreadyCollecting(String),

    #[error("no landmarks detected within {timeout_ms} ms, reposition your hands and retry")]
    NoDetection { timeout_ms: u64 },

    #[error("not enough training data: {0}")]
    InsufficientData(String),

    #[error("training diverged at epoch {epoch} (loss = {loss})")]
    TrainingDiverged { epoch: usize, loss: f64 },

    #[error("training cancelled after {completed_epochs} epoch(s)")]
    TrainingCancelled { completed_epochs: usize },

    #[error("training task aborted: {0}")]
    TrainingAborted(String),

    #[error("engine busy: {0}")]
    Busy(&'static str),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("model '{id}' is corrupted: {reason}")]
    CorruptModel { id: String, reason: String },

    #[error("invalid model id '{0}': use letters, digits, '_' or '-'")]
    InvalidModelId(String),

    #[error("model index is corrupted: {0}")]
    CorruptIndex(String),

    #[error("invalid landmark frame: {0}")]
    InvalidFrame(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Non-fatal outcome of a collection that timed out with some frames
/// buffered. The sample is still kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("partial sample for '{label}': {frames}/{target} frames before timeout")]
pub struct PartialSampleWarning {
    pub label: String,
    pub frames: usize,
    pub target: usize,
}

pub type Result<T> = std::result::Result<T, EngineError>;
