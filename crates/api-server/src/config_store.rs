use anyhow::{anyhow, Context, Result};
use briefing_core::Settings;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// JSON object exactly as posted or read from disk.
pub type Document = Map<String, Value>;

struct Current {
    document: Document,
    settings: Settings,
}

/// The single JSON config document, cached in memory and persisted to one
/// file. The document is kept verbatim for `GET`; tasks get the typed
/// `Settings` derived from it. Writes are last-write-wins.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Current>,
}

fn empty_document() -> Document {
    let mut document = Map::new();
    document.insert("llm".to_string(), Value::Object(Map::new()));
    document.insert("ifind".to_string(), Value::Object(Map::new()));
    document
}

impl ConfigStore {
    /// Read the document at `path`. A missing file starts from an empty
    /// document; an unreadable or malformed one is an error.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<Value>(&raw)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
            {
                Value::Object(document) => document,
                _ => return Err(anyhow!("Config file {} is not a JSON object", path.display())),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Config file {} not found, starting with an empty configuration",
                    path.display()
                );
                empty_document()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read config file {}", path.display()))
            }
        };
        let settings = Settings::from_document(&document)
            .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e.detail()))?;

        Ok(Self {
            path,
            current: RwLock::new(Current { document, settings }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored document, field for field.
    pub async fn document(&self) -> Document {
        self.current.read().await.document.clone()
    }

    /// Copy of the current settings. Tasks take one when they start.
    pub async fn snapshot(&self) -> Settings {
        self.current.read().await.settings.clone()
    }

    /// Persist `document` and make it current. `settings` must be derived
    /// from it with `Settings::from_document`. The write lock is held across
    /// the file write so memory and disk agree on the last writer.
    pub async fn replace(&self, document: Document, settings: Settings) -> Result<()> {
        let mut current = self.current.write().await;
        let body = serde_json::to_string_pretty(&document)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        *current = Current { document, settings };
        tracing::info!("Configuration saved to {}", self.path.display());
        Ok(())
    }
}
