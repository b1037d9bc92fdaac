use briefing_core::PipelineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chart rendering failed: {0}")]
    Chart(String),

    #[error("Invalid report name: {0}")]
    InvalidName(String),
}

pub type RenderResult<T> = Result<T, RenderError>;

impl From<RenderError> for PipelineError {
    fn from(err: RenderError) -> Self {
        PipelineError::Render(err.to_string())
    }
}
