use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the placement pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("dataset not found: {}; place it in the project root and re-run", .0.display())]
    DatasetNotFound(PathBuf),

    #[error("model not found: {}; run `train` first", .0.display())]
    ModelNotFound(PathBuf),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("schema mismatch: {0}")]
    Schema(String),

    #[error("training error: {0}")]
    Training(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
