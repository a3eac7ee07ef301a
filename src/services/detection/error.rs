// Detection Errors
// One taxonomy for the normalizer, detector, classifier and arbiter.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Model has not been trained yet")]
    UntrainedModel,
    #[error("Insufficient training data: {0}")]
    InsufficientData(String),
    #[error("Linguistic resource unavailable: {0}")]
    ResourceUnavailable(String),
    #[error("Invalid classifier configuration: {0}")]
    InvalidConfig(String),
    #[error("Training aborted: {0}")]
    TrainingAborted(String),
    #[error("Unsupported model format: {0}")]
    ModelFormat(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
