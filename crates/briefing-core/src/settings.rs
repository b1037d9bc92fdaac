//! Typed view of the JSON configuration document edited through
//! `/api/config`.
//!
//! The posted document itself is stored verbatim by the server; `Settings`
//! is derived from it for each task. Keys this crate does not model are
//! kept in `extra` maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::{PipelineError, StockSource};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub llm: LlmSettings,
    pub ifind: IfindSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ifind_payload: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_stock_pool: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_stock_pool: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// LLM section: the active provider name plus one entry per provider
/// (`openai`, `dashscope`, ...). Entries stay raw so that sibling scalar
/// keys are accepted; `section` reads one as `ProviderSettings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(flatten)]
    pub providers: BTreeMap<String, Value>,
}

impl LlmSettings {
    pub fn section(&self, name: &str) -> Result<ProviderSettings, PipelineError> {
        let raw = self.providers.get(name).ok_or_else(|| {
            PipelineError::Analysis(format!("no settings for LLM provider '{}'", name))
        })?;
        if !raw.is_object() {
            return Err(PipelineError::Analysis(format!(
                "llm.{} must be an object",
                name
            )));
        }
        serde_json::from_value(raw.clone())
            .map_err(|e| PipelineError::Analysis(format!("llm.{}: {}", name, e)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_model: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IfindSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_query_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_type: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Settings {
    /// Derive settings from a posted document. `llm` and `ifind` must be
    /// objects; `null` values read as absent.
    pub fn from_document(document: &Map<String, Value>) -> Result<Self, PipelineError> {
        for key in ["llm", "ifind"] {
            match document.get(key) {
                Some(Value::Object(_)) => {}
                Some(_) => {
                    return Err(PipelineError::Validation(format!(
                        "'{}' must be an object",
                        key
                    )))
                }
                None => {
                    return Err(PipelineError::Validation(format!(
                        "'{}' section is required",
                        key
                    )))
                }
            }
        }
        serde_json::from_value(Value::Object(document.clone()))
            .map_err(|e| PipelineError::Validation(format!("invalid configuration: {}", e)))
    }

    /// The configured provider name and its section.
    pub fn active_provider(&self) -> Result<(&str, ProviderSettings), PipelineError> {
        let name = self
            .llm
            .provider
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| PipelineError::Analysis("llm.provider is not configured".to_string()))?;
        Ok((name, self.llm.section(name)?))
    }

    /// Tickers a briefing should cover. An empty list means "no ticker
    /// restriction beyond the payload template".
    pub fn stock_pool(&self, source: StockSource) -> Result<Vec<String>, PipelineError> {
        let pool = match source {
            StockSource::Custom => {
                let pool = clean_tickers(self.custom_stock_pool.as_deref());
                if pool.is_empty() {
                    return Err(PipelineError::Validation(
                        "custom stock pool is empty".to_string(),
                    ));
                }
                pool
            }
            StockSource::Market => clean_tickers(self.market_stock_pool.as_deref()),
        };
        Ok(pool)
    }
}

fn clean_tickers(pool: Option<&[String]>) -> Vec<String> {
    pool.unwrap_or_default()
        .iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}
