use api_server::{build_router, AppState, ConfigStore, Pipelines};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use briefing_core::{
    AnalysisMode, Analyzer, Announcement, DateRange, Fetcher, MarketBar, PipelineError, Prompt,
    Settings, StockSnapshot,
};
use report_renderer::HtmlRenderer;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use task_manager::{TaskManager, TaskManagerConfig};
use tempfile::TempDir;
use tower::ServiceExt;

#[derive(Default)]
struct StubFetcher {
    fail_with: Option<String>,
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch_announcements(
        &self,
        _settings: &Settings,
        _range: &DateRange,
        tickers: &[String],
    ) -> Result<Vec<Announcement>, PipelineError> {
        if let Some(msg) = &self.fail_with {
            return Err(PipelineError::Fetch(msg.clone()));
        }
        Ok(tickers
            .iter()
            .map(|t| Announcement {
                report_date: Some("2024-01-01".into()),
                title: Some(format!("{} annual report", t)),
                pdf_url: Some(format!("https://example.test/{}.pdf", t)),
                sec_name: Some(format!("Company {}", t)),
                thscode: Some(t.clone()),
            })
            .collect())
    }

    async fn fetch_document_text(&self, _url: &str) -> Result<String, PipelineError> {
        Ok("Revenue grew strongly across all segments and the board proposed a dividend. "
            .repeat(3))
    }

    async fn fetch_stock_snapshot(
        &self,
        _settings: &Settings,
        ticker: &str,
        report_period: &str,
    ) -> Result<StockSnapshot, PipelineError> {
        if let Some(msg) = &self.fail_with {
            return Err(PipelineError::Fetch(msg.clone()));
        }
        let bar = |date: &str, close: f64| MarketBar {
            date: date.into(),
            open: None,
            high: None,
            low: None,
            close,
            volume: Some(1000.0),
            pct_chg: None,
            turnover: None,
        };
        Ok(StockSnapshot {
            ticker: ticker.to_string(),
            as_of: "2024-01-05".into(),
            report_period: if report_period.is_empty() {
                "3".into()
            } else {
                report_period.into()
            },
            profile: None,
            bars: vec![bar("2024-01-04", 10.0), bar("2024-01-05", 10.5)],
        })
    }
}

struct StubAnalyzer {
    deep_delay: Duration,
}

#[async_trait]
impl Analyzer for StubAnalyzer {
    async fn analyze(
        &self,
        _settings: &Settings,
        prompt: &Prompt,
        mode: AnalysisMode,
    ) -> Result<String, PipelineError> {
        match mode {
            AnalysisMode::Fast => Ok("YES".into()),
            AnalysisMode::Deep => {
                tokio::time::sleep(self.deep_delay).await;
                if prompt.json_output {
                    Ok(r#"{"summary":"Dividend proposed.","importance":4,"reason":"Cash return."}"#
                        .into())
                } else {
                    Ok("```markdown\n# Report\n\n## 3. Secondary Market\n\nSteady.\n```".into())
                }
            }
        }
    }
}

/// The first deep call is slow and the rest are fast, each with its own
/// summary, so concurrent briefings finish in a known order.
#[derive(Default)]
struct SequencedAnalyzer {
    deep_calls: AtomicUsize,
}

#[async_trait]
impl Analyzer for SequencedAnalyzer {
    async fn analyze(
        &self,
        _settings: &Settings,
        _prompt: &Prompt,
        mode: AnalysisMode,
    ) -> Result<String, PipelineError> {
        if mode == AnalysisMode::Fast {
            return Ok("YES".into());
        }
        let summary = if self.deep_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(400)).await;
            "Slow summary."
        } else {
            "Fast summary."
        };
        Ok(json!({ "summary": summary, "importance": 4, "reason": "r" }).to_string())
    }
}

struct Harness {
    app: Router,
    dir: TempDir,
}

async fn harness(fetcher: StubFetcher, deep_delay: Duration, sync_wait: Duration) -> Harness {
    harness_with(
        Arc::new(fetcher),
        Arc::new(StubAnalyzer { deep_delay }),
        TaskManagerConfig::default(),
        sync_wait,
    )
    .await
}

async fn harness_with(
    fetcher: Arc<dyn Fetcher>,
    analyzer: Arc<dyn Analyzer>,
    tasks: TaskManagerConfig,
    sync_wait: Duration,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let reports = dir.path().join("reports");
    let config = ConfigStore::load(dir.path().join("config.json")).await.unwrap();
    let document = json!({
        "llm": {},
        "ifind": {},
        "customStockPool": ["430047.BJ"],
        "ticker": "430047.BJ"
    })
    .as_object()
    .cloned()
    .unwrap();
    let settings = Settings::from_document(&document).unwrap();
    config.replace(document, settings).await.unwrap();

    let state = AppState {
        config: Arc::new(config),
        tasks: Arc::new(TaskManager::new(tasks)),
        pipelines: Arc::new(Pipelines::new(
            fetcher,
            analyzer,
            Arc::new(HtmlRenderer::new(&reports)),
        )),
        sync_report_wait: sync_wait,
    };
    Harness {
        app: build_router(state, &reports),
        dir,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

async fn poll(app: &Router, kind: &str, task_id: &str) -> Value {
    for _ in 0..200 {
        let uri = format!("/api/status/{}/{}", kind, task_id);
        let (status, body) = call(app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "complete" || body["status"] == "error" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {} never finished", task_id);
}

#[tokio::test]
async fn test_health() {
    let h = harness(StubFetcher::default(), Duration::ZERO, Duration::from_secs(2)).await;
    let (status, body) = call(&h.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_config_round_trip_keeps_unknown_keys() {
    let h = harness(StubFetcher::default(), Duration::ZERO, Duration::from_secs(2)).await;
    let doc = json!({
        "llm": {
            "provider": "openai",
            "temperature": 0.3,
            "openai": { "apiKey": "sk-test", "deepModel": "gpt-4o", "baseUrl": null }
        },
        "ifind": { "refreshToken": "rt" },
        "customStockPool": ["600519.SH"],
        "ticker": null,
        "uiTheme": "dark"
    });

    let (status, body) = call(&h.app, "POST", "/api/config", Some(doc.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Configuration saved");

    let (status, body) = call(&h.app, "GET", "/api/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, doc);
    assert!(h.dir.path().join("config.json").exists());
}

#[tokio::test]
async fn test_config_requires_llm_and_ifind_objects() {
    let h = harness(StubFetcher::default(), Duration::ZERO, Duration::from_secs(2)).await;
    let (status, body) = call(&h.app, "POST", "/api/config", Some(json!({ "llm": {} }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (_, saved) = call(&h.app, "GET", "/api/config", None).await;
    assert_eq!(saved["ticker"], "430047.BJ");
}

#[tokio::test]
async fn test_config_rejects_malformed_body() {
    let h = harness(StubFetcher::default(), Duration::ZERO, Duration::from_secs(2)).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/config")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ nope"))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_daily_briefing_end_to_end() {
    let h = harness(StubFetcher::default(), Duration::ZERO, Duration::from_secs(2)).await;
    let (status, body) = call(
        &h.app,
        "POST",
        "/api/run/daily_briefing",
        Some(json!({ "startDate": "2024-01-01", "endDate": "2024-01-01", "stockSource": "custom" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let done = poll(&h.app, "daily_briefing", &task_id).await;
    assert_eq!(done["status"], "complete");
    assert_eq!(done["report_url"], "/reports/2024-01-01_custom.html");

    let html =
        std::fs::read_to_string(h.dir.path().join("reports/2024-01-01_custom.html")).unwrap();
    assert!(html.contains("Dividend proposed."));

    let (status, served) = call(&h.app, "GET", "/reports/2024-01-01_custom.html", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(served.as_str().unwrap().contains("Company 430047.BJ"));
}

#[tokio::test]
async fn test_identical_briefings_last_finisher_wins() {
    let h = harness_with(
        Arc::new(StubFetcher::default()),
        Arc::new(SequencedAnalyzer::default()),
        TaskManagerConfig::default(),
        Duration::from_secs(2),
    )
    .await;
    let body = json!({
        "startDate": "2024-01-01",
        "endDate": "2024-01-01",
        "stockSource": "custom"
    });

    let mut ids = Vec::new();
    for _ in 0..2 {
        let (status, submitted) =
            call(&h.app, "POST", "/api/run/daily_briefing", Some(body.clone())).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        ids.push(submitted["task_id"].as_str().unwrap().to_string());
    }
    assert_ne!(ids[0], ids[1]);

    for id in &ids {
        let done = poll(&h.app, "daily_briefing", id).await;
        assert_eq!(done["status"], "complete");
        assert_eq!(done["report_url"], "/reports/2024-01-01_custom.html");
    }

    let (status, served) = call(&h.app, "GET", "/reports/2024-01-01_custom.html", None).await;
    assert_eq!(status, StatusCode::OK);
    let html = served.as_str().unwrap();
    assert!(html.contains("Slow summary."));
    assert!(!html.contains("Fast summary."));
}

#[tokio::test]
async fn test_daily_briefing_fetch_failure_reported() {
    let fetcher = StubFetcher {
        fail_with: Some("network timeout".into()),
    };
    let h = harness(fetcher, Duration::ZERO, Duration::from_secs(2)).await;
    let (status, body) = call(
        &h.app,
        "POST",
        "/api/run/daily_briefing",
        Some(json!({ "date": "2024-01-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let done = poll(&h.app, "daily_briefing", body["task_id"].as_str().unwrap()).await;
    assert_eq!(done["status"], "error");
    assert_eq!(done["detail"], "network timeout");
}

#[tokio::test]
async fn test_daily_briefing_validation() {
    let h = harness(StubFetcher::default(), Duration::ZERO, Duration::from_secs(2)).await;

    let (status, body) = call(
        &h.app,
        "POST",
        "/api/run/daily_briefing",
        Some(json!({ "startDate": "2024-02-01", "endDate": "2024-01-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = call(
        &h.app,
        "POST",
        "/api/run/daily_briefing",
        Some(json!({ "date": "2024-01-01", "stockSource": "nasdaq" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_task_is_404() {
    let h = harness(StubFetcher::default(), Duration::ZERO, Duration::from_secs(2)).await;
    let uri = "/api/status/daily_briefing/does-not-exist";
    let (status, body) = call(&h.app, "GET", uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_investment_report_sync() {
    let h = harness(StubFetcher::default(), Duration::ZERO, Duration::from_secs(5)).await;
    let (status, body) = call(
        &h.app,
        "POST",
        "/api/run/investment_report",
        Some(json!({ "userInfo": "watching margins" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report_url"], "/reports/investment/430047_BJ_3.html");
    assert!(h.dir.path().join("reports/investment/430047_BJ_3.html").exists());
}

#[tokio::test]
async fn test_investment_report_sync_fetch_failure() {
    let fetcher = StubFetcher {
        fail_with: Some("network timeout".into()),
    };
    let h = harness(fetcher, Duration::ZERO, Duration::from_secs(5)).await;
    let (status, body) = call(
        &h.app,
        "POST",
        "/api/run/investment_report",
        Some(json!({ "ticker": "600519.SH" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({ "success": false, "error": "network timeout" }));
}

#[tokio::test]
async fn test_investment_report_sync_stage_timeout() {
    let h = harness_with(
        Arc::new(StubFetcher::default()),
        Arc::new(StubAnalyzer {
            deep_delay: Duration::from_secs(3),
        }),
        TaskManagerConfig {
            stage_timeout: Duration::from_millis(100),
            ..Default::default()
        },
        Duration::from_secs(5),
    )
    .await;
    let (status, body) = call(
        &h.app,
        "POST",
        "/api/run/investment_report",
        Some(json!({ "ticker": "600519.SH" })),
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("analyze stage"));
}

#[tokio::test]
async fn test_investment_report_slow_returns_task_id() {
    let h = harness(
        StubFetcher::default(),
        Duration::from_millis(300),
        Duration::from_millis(10),
    )
    .await;
    let (status, body) = call(
        &h.app,
        "POST",
        "/api/run/investment_report",
        Some(json!({ "ticker": "600519.SH", "reportPeriod": "1" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let done = poll(&h.app, "investment_report", &task_id).await;
    assert_eq!(done["status"], "complete");
    assert_eq!(done["report_url"], "/reports/investment/600519_SH_1.html");

    // A briefing id space lookup must not see the investment task.
    let uri = format!("/api/status/daily_briefing/{}", task_id);
    let (status, _) = call(&h.app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_responses_carry_request_id_and_headers() {
    let h = harness(StubFetcher::default(), Duration::ZERO, Duration::from_secs(2)).await;
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
    assert_eq!(response.headers()["cache-control"], "no-store");
}
