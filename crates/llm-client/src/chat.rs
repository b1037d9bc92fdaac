use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LlmError, LlmResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(timeout: Duration) -> LlmResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Single-turn completion; returns the first choice's content.
    pub async fn complete(
        &self,
        base_url: &str,
        api_key: &str,
        model: &str,
        prompt: &str,
        temperature: f32,
        json_output: bool,
    ) -> LlmResult<String> {
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature,
            response_format: json_output.then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ServiceUnavailable(format!(
                "Status: {} {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let result = response.json::<ChatResponse>().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("empty completion".to_string()))
    }
}
