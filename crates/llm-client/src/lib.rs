pub mod chat;
pub mod error;
pub mod prompts;

pub use chat::ChatClient;
pub use error::{LlmError, LlmResult};

use async_trait::async_trait;
use briefing_core::{
    AnalysisMode, Analyzer, PipelineError, Prompt, ProviderSettings, Settings,
};
use std::time::Duration;

/// Base URL used when a provider section leaves `baseUrl` empty.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "dashscope" => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
        _ => None,
    }
}

fn default_model(provider: &str, mode: AnalysisMode) -> Option<&'static str> {
    match (provider, mode) {
        ("dashscope", AnalysisMode::Fast) => Some("qwen-turbo"),
        ("dashscope", AnalysisMode::Deep) => Some("qwen-plus"),
        _ => None,
    }
}

/// Configuration for the LLM client
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(
                std::env::var("LLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
        }
    }
}

/// Resolved endpoint for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub provider: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Endpoint {
    /// Pick the model tier from the active provider section.
    pub fn resolve(settings: &Settings, mode: AnalysisMode) -> LlmResult<Self> {
        let (provider, section) = settings
            .active_provider()
            .map_err(|e| LlmError::NotConfigured(e.detail()))?;
        Self::from_section(provider, &section, mode)
    }

    fn from_section(
        provider: &str,
        section: &ProviderSettings,
        mode: AnalysisMode,
    ) -> LlmResult<Self> {
        let api_key = non_empty(section.api_key.as_deref())
            .ok_or_else(|| LlmError::NotConfigured(format!("llm.{}.apiKey", provider)))?;
        let base_url = non_empty(section.base_url.as_deref())
            .or_else(|| default_base_url(provider).map(str::to_string))
            .ok_or_else(|| LlmError::NotConfigured(format!("llm.{}.baseUrl", provider)))?;
        let (configured, key) = match mode {
            AnalysisMode::Fast => (non_empty(section.fast_model.as_deref()), "fastModel"),
            // Older documents name the deep model `model`.
            AnalysisMode::Deep => (
                non_empty(section.deep_model.as_deref()).or_else(|| {
                    non_empty(section.extra.get("model").and_then(|v| v.as_str()))
                }),
                "deepModel",
            ),
        };
        let model = configured
            .or_else(|| default_model(provider, mode).map(str::to_string))
            .ok_or_else(|| LlmError::NotConfigured(format!("llm.{}.{}", provider, key)))?;

        Ok(Self {
            provider: provider.to_string(),
            base_url,
            api_key,
            model,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `Analyzer` backed by an OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct LlmClient {
    chat: ChatClient,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        Ok(Self {
            chat: ChatClient::new(config.timeout)?,
        })
    }

    pub fn with_defaults() -> LlmResult<Self> {
        Self::new(LlmConfig::default())
    }

    pub async fn complete(
        &self,
        settings: &Settings,
        prompt: &Prompt,
        mode: AnalysisMode,
    ) -> LlmResult<String> {
        let endpoint = Endpoint::resolve(settings, mode)?;
        tracing::debug!(
            "LLM call: provider={} model={} mode={:?} prompt_chars={}",
            endpoint.provider,
            endpoint.model,
            mode,
            prompt.text.chars().count()
        );

        self.chat
            .complete(
                &endpoint.base_url,
                &endpoint.api_key,
                &endpoint.model,
                &prompt.text,
                prompt.temperature,
                prompt.json_output,
            )
            .await
    }
}

#[async_trait]
impl Analyzer for LlmClient {
    async fn analyze(
        &self,
        settings: &Settings,
        prompt: &Prompt,
        mode: AnalysisMode,
    ) -> Result<String, PipelineError> {
        Ok(self.complete(settings, prompt, mode).await?)
    }
}
