pub mod briefing_routes;
pub mod config_routes;
pub mod config_store;
pub mod pipeline;
pub mod report_routes;
pub mod request_id;
pub mod security_headers;
pub mod server_config;

use anyhow::Context;
use axum::{
    body::Body,
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use briefing_core::PipelineError;
use ifind_client::IfindClient;
use llm_client::LlmClient;
use report_renderer::HtmlRenderer;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use task_manager::TaskManager;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub use config_store::ConfigStore;
pub use pipeline::Pipelines;
pub use server_config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub tasks: Arc<TaskManager>,
    pub pipelines: Arc<Pipelines>,
    /// How long `POST /api/run/investment_report` waits before answering 202.
    pub sync_report_wait: Duration,
}

/// Handler error rendered as `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn pipeline_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        PipelineError::Fetch(_) | PipelineError::Analysis(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Render(_) | PipelineError::Cancelled(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        Self::with_status(pipeline_status(&err), anyhow::anyhow!(err.detail()))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let status = if rejection.status().is_client_error() {
            rejection.status()
        } else {
            StatusCode::BAD_REQUEST
        };
        Self::with_status(status, anyhow::anyhow!(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed ({}): {:#}", self.status, self.error);
        } else {
            tracing::debug!("Request rejected ({}): {:#}", self.status, self.error);
        }

        (
            self.status,
            Json(json!({
                "success": false,
                "error": self.error.to_string(),
            })),
        )
            .into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            |origin: &HeaderValue, _| {
                origin
                    .to_str()
                    .map(|s| {
                        s.starts_with("http://localhost")
                            || s.starts_with("https://localhost")
                            || s.starts_with("http://127.0.0.1")
                            || s.starts_with("https://127.0.0.1")
                    })
                    .unwrap_or(false)
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Full router: API routes, `/reports` static files and the middleware stack.
pub fn build_router(state: AppState, reports_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(config_routes::config_routes())
        .merge(briefing_routes::briefing_routes())
        .merge(report_routes::report_routes())
        .nest_service("/reports", ServeDir::new(reports_dir))
        .layer(middleware::from_fn(security_headers::security_headers_middleware))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(cors_layer())
        .with_state(state)
}

pub fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Starting filing briefing server");
    let config = ServerConfig::from_env()?;
    config.log();

    tokio::fs::create_dir_all(&config.reports_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.reports_dir.display()))?;
    let store = ConfigStore::load(&config.config_path).await?;

    let pipelines = Pipelines::new(
        Arc::new(IfindClient::new()?),
        Arc::new(LlmClient::with_defaults()?),
        Arc::new(HtmlRenderer::new(&config.reports_dir)),
    );
    let tasks = Arc::new(TaskManager::new(config.task_manager()));

    let state = AppState {
        config: Arc::new(store),
        tasks: tasks.clone(),
        pipelines: Arc::new(pipelines),
        sync_report_wait: config.sync_report_wait,
    };

    let sweeper = {
        let tasks = tasks.clone();
        let interval = config.sweep_interval;
        tokio::spawn(async move { tasks.run_sweeper(interval).await })
    };

    let app = build_router(state, &config.reports_dir);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tasks.shutdown();
    if let Err(e) = sweeper.await {
        tracing::warn!("Sweeper task ended abnormally: {}", e);
    }
    tracing::info!("Server shutdown complete");
    Ok(())
}
