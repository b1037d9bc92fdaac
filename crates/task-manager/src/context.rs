use briefing_core::{PipelineError, PipelineResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::task::{TaskHandle, TaskSnapshot};

/// Handle a running job uses to report progress and bound its stages.
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: String,
    handle: Arc<TaskHandle>,
    stage_timeout: Duration,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(
        id: String,
        handle: Arc<TaskHandle>,
        stage_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            handle,
            stage_timeout,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Update the human-readable progress message of a running task.
    pub fn progress(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("Task {}: {}", self.id, message);
        self.handle.transition(&self.id, TaskSnapshot::running(message));
    }

    /// Run one collaborator call under the per-stage deadline. Shutdown
    /// cancels the stage immediately.
    pub async fn stage<T, F>(&self, name: &str, fut: F) -> PipelineResult<T>
    where
        F: Future<Output = PipelineResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(format!(
                "server shutting down before {} stage",
                name
            )));
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled(format!(
                "server shutting down during {} stage",
                name
            ))),
            result = tokio::time::timeout(self.stage_timeout, fut) => match result {
                Ok(inner) => inner,
                Err(_) => {
                    tracing::warn!(
                        "Task {}: {} stage exceeded {:?}",
                        self.id,
                        name,
                        self.stage_timeout
                    );
                    Err(PipelineError::Timeout {
                        stage: name.to_string(),
                        secs: self.stage_timeout.as_secs(),
                    })
                }
            },
        }
    }
}
