use briefing_core::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Which pipeline a task runs. Status lookups only resolve tasks of the
/// kind they ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    DailyBriefing,
    InvestmentReport,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::DailyBriefing => "daily_briefing",
            TaskKind::InvestmentReport => "investment_report",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Error)
    }

    /// `pending -> running -> complete | error`. Running may repeat for
    /// progress updates.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Complete)
                | (TaskStatus::Running, TaskStatus::Error)
        )
    }
}

/// Status payload returned to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TaskSnapshot {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            message: "Task queued".to_string(),
            report_url: None,
            detail: None,
        }
    }

    pub fn running(message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Running,
            message: message.into(),
            report_url: None,
            detail: None,
        }
    }

    pub fn complete(report_url: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Complete,
            message: "Report generated".to_string(),
            report_url: Some(report_url.into()),
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Error,
            message: "Task failed".to_string(),
            report_url: None,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TaskState {
    pub snapshot: TaskSnapshot,
    pub finished_at: Option<DateTime<Utc>>,
    /// Typed cause behind an `error` snapshot. `None` for panics.
    pub error: Option<PipelineError>,
}

/// One task's record. The watch sender is written only by the task's own
/// background unit; readers borrow or subscribe.
#[derive(Debug)]
pub(crate) struct TaskHandle {
    pub kind: TaskKind,
    pub created_at: DateTime<Utc>,
    state: watch::Sender<TaskState>,
}

impl TaskHandle {
    pub fn new(kind: TaskKind) -> Self {
        let (state, _) = watch::channel(TaskState {
            snapshot: TaskSnapshot::pending(),
            finished_at: None,
            error: None,
        });
        Self {
            kind,
            created_at: Utc::now(),
            state,
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.state.borrow().snapshot.clone()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().finished_at
    }

    pub fn error(&self) -> Option<PipelineError> {
        self.state.borrow().error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.state.subscribe()
    }

    /// Apply `next` if the state machine allows it. Rejected transitions are
    /// logged and leave the record untouched.
    pub fn transition(&self, id: &str, next: TaskSnapshot) -> bool {
        self.apply(id, next, None)
    }

    /// Terminal `error` transition that also records the typed cause.
    pub fn fail(&self, id: &str, detail: String, error: Option<PipelineError>) -> bool {
        self.apply(id, TaskSnapshot::failed(detail), error)
    }

    fn apply(&self, id: &str, next: TaskSnapshot, error: Option<PipelineError>) -> bool {
        let mut rejected_from = None;
        let applied = self.state.send_if_modified(|state| {
            let current = state.snapshot.status;
            if !current.can_transition_to(next.status) {
                rejected_from = Some(current);
                return false;
            }
            if next.status.is_terminal() {
                state.finished_at = Some(Utc::now());
            }
            state.snapshot = next.clone();
            state.error = error;
            true
        });

        if let Some(current) = rejected_from {
            tracing::warn!(
                "Task {} ignored transition {:?} -> {:?}",
                id,
                current,
                next.status
            );
        }
        applied
    }
}
