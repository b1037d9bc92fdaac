use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("TimeoutError: {stage} stage exceeded {secs}s")]
    Timeout { stage: String, secs: u64 },

    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl PipelineError {
    /// Human-readable cause as stored in a task's `detail` field.
    ///
    /// Stage failures carry the collaborator's own message without the
    /// variant prefix; timeouts and cancellations keep their full text.
    pub fn detail(&self) -> String {
        match self {
            PipelineError::Validation(msg)
            | PipelineError::NotFound(msg)
            | PipelineError::Fetch(msg)
            | PipelineError::Analysis(msg)
            | PipelineError::Render(msg) => msg.clone(),
            PipelineError::Timeout { .. } | PipelineError::Cancelled(_) => self.to_string(),
        }
    }

    /// Timeouts and cancellations end the whole task even when raised
    /// while processing a single announcement.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineError::Timeout { .. } | PipelineError::Cancelled(_)
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
