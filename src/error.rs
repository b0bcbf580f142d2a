//! Error handling for the CV tailoring pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CvTailorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Master document error: {0}")]
    MasterDocument(String),

    #[error("Requirement extraction error: {0}")]
    Extraction(String),

    #[error("Bullet generation error: {0}")]
    Generation(String),

    #[error("Grounding violation: {0}")]
    Grounding(String),

    #[error("Model request error: {0}")]
    ModelRequest(String),

    #[error("Model returned malformed output: {0}")]
    MalformedModelOutput(String),

    #[error("Grading error: {0}")]
    Grading(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("File format not supported: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job record not found: {0}")]
    JobNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Output formatting error: {0}")]
    OutputFormatting(String),
}

pub type Result<T> = std::result::Result<T, CvTailorError>;

/// Convert anyhow errors to our custom error type
impl From<anyhow::Error> for CvTailorError {
    fn from(err: anyhow::Error) -> Self {
        CvTailorError::Generation(err.to_string())
    }
}

impl CvTailorError {
    /// Whether a model call failing with this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CvTailorError::ModelRequest(_))
    }
}
