use briefing_core::PipelineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type LlmResult<T> = Result<T, LlmError>;

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        PipelineError::Analysis(err.to_string())
    }
}
