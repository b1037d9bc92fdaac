use briefing_core::{PipelineError, PipelineResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::TaskContext;
use crate::task::{TaskHandle, TaskKind, TaskSnapshot};

#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Deadline applied to every `TaskContext::stage` call.
    pub stage_timeout: Duration,
    /// How long terminal tasks stay pollable.
    pub retention: Duration,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(180),
            retention: Duration::from_secs(24 * 3600),
        }
    }
}

/// In-memory task table. Each submitted job runs as its own tokio task;
/// pollers read the latest status without blocking it.
pub struct TaskManager {
    tasks: DashMap<String, Arc<TaskHandle>>,
    config: TaskManagerConfig,
    cancel: CancellationToken,
}

impl TaskManager {
    pub fn new(config: TaskManagerConfig) -> Self {
        tracing::info!(
            "Task manager: stage timeout {:?}, retention {:?}",
            config.stage_timeout,
            config.retention
        );
        Self {
            tasks: DashMap::new(),
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.config
    }

    /// Register a `pending` task and start `job` in the background. Returns
    /// the new id without waiting for the job. The job's `Ok` value is the
    /// report URL stored on completion.
    pub fn spawn<F, Fut>(&self, kind: TaskKind, job: F) -> String
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = PipelineResult<String>> + Send + 'static,
    {
        let id = Uuid::new_v4().to_string();
        let handle = Arc::new(TaskHandle::new(kind));
        self.tasks.insert(id.clone(), handle.clone());

        let ctx = TaskContext::new(
            id.clone(),
            handle.clone(),
            self.config.stage_timeout,
            self.cancel.child_token(),
        );
        tracing::info!("Task {} ({}) queued", id, kind);
        tokio::spawn(execute(id.clone(), handle, ctx, job));
        id
    }

    fn lookup(&self, kind: TaskKind, id: &str) -> PipelineResult<Arc<TaskHandle>> {
        self.tasks
            .get(id)
            .filter(|h| h.kind == kind)
            .map(|h| h.value().clone())
            .ok_or_else(|| PipelineError::NotFound(format!("task {} not found", id)))
    }

    pub fn get_status(&self, kind: TaskKind, id: &str) -> PipelineResult<TaskSnapshot> {
        Ok(self.lookup(kind, id)?.snapshot())
    }

    /// Wait up to `within` for the task to finish. `Ok(None)` means it is
    /// still pending or running.
    pub async fn wait(
        &self,
        kind: TaskKind,
        id: &str,
        within: Duration,
    ) -> PipelineResult<Option<TaskSnapshot>> {
        let handle = self.lookup(kind, id)?;
        let mut rx = handle.subscribe();

        let finished =
            match tokio::time::timeout(within, rx.wait_for(|s| s.snapshot.status.is_terminal()))
                .await
            {
                Ok(Ok(state)) => Some(state.snapshot.clone()),
                Ok(Err(_)) => Some(handle.snapshot()),
                Err(_) => None,
            };
        Ok(finished)
    }

    /// Typed cause of a failed task, when the job returned one.
    pub fn failure(&self, kind: TaskKind, id: &str) -> PipelineResult<Option<PipelineError>> {
        Ok(self.lookup(kind, id)?.error())
    }

    /// Evict terminal tasks that finished more than the retention window
    /// before `now`. Pending and running tasks are never evicted.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let retention = self.config.retention;
        let before = self.tasks.len();
        self.tasks.retain(|_, handle| match handle.finished_at() {
            Some(finished) => (now - finished)
                .to_std()
                .map(|age| age < retention)
                .unwrap_or(true),
            None => true,
        });
        let removed = before.saturating_sub(self.tasks.len());
        if removed > 0 {
            tracing::info!("Swept {} finished tasks ({} remaining)", removed, self.tasks.len());
        }
        removed
    }

    /// Periodic `sweep` until `shutdown` is called.
    pub async fn run_sweeper(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep(Utc::now());
                }
            }
        }
        tracing::debug!("Task sweeper stopped");
    }

    /// Cancel every in-flight stage. Affected tasks end in `error`.
    pub fn shutdown(&self) {
        let active = self
            .tasks
            .iter()
            .filter(|e| !e.value().snapshot().status.is_terminal())
            .count();
        tracing::info!("Task manager shutting down, cancelling {} active tasks", active);
        self.cancel.cancel();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(TaskManagerConfig::default())
    }
}

async fn execute<F, Fut>(id: String, handle: Arc<TaskHandle>, ctx: TaskContext, job: F)
where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = PipelineResult<String>> + Send + 'static,
{
    handle.transition(&id, TaskSnapshot::running("Task started"));

    // Own tokio task so a panic surfaces as a JoinError instead of
    // unwinding through this one.
    let outcome = tokio::spawn(job(ctx)).await;

    let elapsed = (Utc::now() - handle.created_at).num_milliseconds();
    match outcome {
        Ok(Ok(report_url)) => {
            tracing::info!("Task {} complete in {}ms: {}", id, elapsed, report_url);
            handle.transition(&id, TaskSnapshot::complete(report_url));
        }
        Ok(Err(e)) => {
            tracing::error!("Task {} failed after {}ms: {}", id, elapsed, e);
            handle.fail(&id, e.detail(), Some(e));
        }
        Err(join) if join.is_panic() => {
            tracing::error!("Task {} panicked after {}ms", id, elapsed);
            handle.fail(&id, "pipeline panicked".to_string(), None);
        }
        Err(_) => {
            let e = PipelineError::Cancelled("task aborted".to_string());
            tracing::error!("Task {} was aborted", id);
            handle.fail(&id, e.detail(), Some(e));
        }
    }
}
