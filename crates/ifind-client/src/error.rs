use briefing_core::PipelineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IfindError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("iFinD error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

pub type IfindResult<T> = Result<T, IfindError>;

impl From<IfindError> for PipelineError {
    fn from(err: IfindError) -> Self {
        PipelineError::Fetch(err.to_string())
    }
}
