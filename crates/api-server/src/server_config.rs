use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use task_manager::TaskManagerConfig;

/// Process-level settings read from the environment. The JSON document
/// edited through `/api/config` lives in `ConfigStore`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub config_path: PathBuf,
    pub reports_dir: PathBuf,
    pub stage_timeout: Duration,
    pub task_retention: Duration,
    pub sweep_interval: Duration,
    pub sync_report_wait: Duration,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, v)),
        _ => Ok(default),
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string()),
            config_path: env::var("CONFIG_PATH")
                .unwrap_or_else(|_| "config.json".to_string())
                .into(),
            reports_dir: env::var("REPORTS_DIR")
                .unwrap_or_else(|_| "generated_reports".to_string())
                .into(),
            stage_timeout: Duration::from_secs(parsed("STAGE_TIMEOUT_SECS", 180u64)?),
            task_retention: Duration::from_secs(parsed("TASK_RETENTION_HOURS", 24u64)? * 3600),
            sweep_interval: Duration::from_secs(parsed("TASK_SWEEP_INTERVAL_SECS", 600u64)?.max(1)),
            sync_report_wait: Duration::from_millis(parsed("SYNC_REPORT_WAIT_MS", 2000u64)?),
        })
    }

    pub fn task_manager(&self) -> TaskManagerConfig {
        TaskManagerConfig {
            stage_timeout: self.stage_timeout,
            retention: self.task_retention,
        }
    }

    pub fn log(&self) {
        tracing::info!("Server configuration loaded");
        tracing::info!("  Bind address: {}", self.bind_addr);
        tracing::info!("  Config file: {}", self.config_path.display());
        tracing::info!("  Reports directory: {}", self.reports_dir.display());
        tracing::info!("  Stage timeout: {}s", self.stage_timeout.as_secs());
        tracing::info!(
            "  Task retention: {}h (sweep every {}s)",
            self.task_retention.as_secs() / 3600,
            self.sweep_interval.as_secs()
        );
        tracing::info!("  Sync report wait: {}ms", self.sync_report_wait.as_millis());
    }
}
