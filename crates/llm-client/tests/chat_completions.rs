use briefing_core::{
    AnalysisMode, Analyzer, LlmSettings, PipelineError, Prompt, ProviderSettings, Settings,
};
use llm_client::{LlmClient, LlmConfig};
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

fn client() -> LlmClient {
    LlmClient::new(LlmConfig {
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn settings(base_url: &str, api_key: Option<&str>) -> Settings {
    let section = ProviderSettings {
        api_key: api_key.map(str::to_string),
        base_url: Some(base_url.to_string()),
        fast_model: Some("fast-model".to_string()),
        deep_model: Some("deep-model".to_string()),
        ..Default::default()
    };
    let mut providers = std::collections::BTreeMap::new();
    providers.insert("openai".to_string(), serde_json::to_value(section).unwrap());
    Settings {
        llm: LlmSettings {
            provider: Some("openai".to_string()),
            providers,
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_deep_json_completion() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({
            "model": "deep-model",
            "response_format": { "type": "json_object" }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"summary\":\"s\",\"importance\":4}" } }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let prompt = Prompt::new("analyze").temperature(0.1).json();
    let answer = client()
        .analyze(&settings(&server.url(), Some("sk-test")), &prompt, AnalysisMode::Deep)
        .await
        .unwrap();

    assert!(answer.contains("\"importance\":4"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fast_call_uses_fast_model_without_json_format() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({ "model": "fast-model", "temperature": 0.0 })))
        .with_status(200)
        .with_body(json!({ "choices": [{ "message": { "content": "YES" } }] }).to_string())
        .create_async()
        .await;

    let answer = client()
        .analyze(
            &settings(&format!("{}/", server.url()), Some("sk-test")),
            &Prompt::new("screen"),
            AnalysisMode::Fast,
        )
        .await
        .unwrap();

    assert_eq!(answer, "YES");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rate_limited_maps_to_analysis_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_body("rate limited")
        .create_async()
        .await;

    let err = client()
        .analyze(&settings(&server.url(), Some("sk-test")), &Prompt::new("x"), AnalysisMode::Fast)
        .await
        .unwrap_err();

    match err {
        PipelineError::Analysis(msg) => assert!(msg.contains("429"), "{}", msg),
        other => panic!("expected analysis error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_choices_is_invalid() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(json!({ "choices": [] }).to_string())
        .create_async()
        .await;

    let err = client()
        .analyze(&settings(&server.url(), Some("sk-test")), &Prompt::new("x"), AnalysisMode::Deep)
        .await
        .unwrap_err();

    assert_eq!(err, PipelineError::Analysis("Invalid response: empty completion".to_string()));
}

#[tokio::test]
async fn test_missing_api_key_makes_no_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .expect(0)
        .create_async()
        .await;

    let err = client()
        .analyze(&settings(&server.url(), None), &Prompt::new("x"), AnalysisMode::Fast)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PipelineError::Analysis("llm.openai.apiKey is not configured".to_string())
    );
    mock.assert_async().await;
}
