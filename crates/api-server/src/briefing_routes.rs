//! Daily briefing submission and status polling.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use briefing_core::BriefingRequest;
use serde::Deserialize;
use serde_json::{json, Value};
use task_manager::{TaskKind, TaskSnapshot};

use crate::request_id::RequestId;
use crate::{AppError, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefingBody {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    /// Older clients send a single `date`.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub stock_source: Option<String>,
}

impl BriefingBody {
    pub fn validate(&self) -> Result<BriefingRequest, briefing_core::PipelineError> {
        let start = self.start_date.as_deref().or(self.date.as_deref());
        let end = self
            .end_date
            .as_deref()
            .or(self.date.as_deref())
            .or(start);
        BriefingRequest::validate(start, end, self.stock_source.as_deref())
    }
}

pub fn briefing_routes() -> Router<AppState> {
    Router::new()
        .route("/api/run/daily_briefing", post(run_daily_briefing))
        .route("/api/status/daily_briefing/:task_id", get(daily_briefing_status))
}

async fn run_daily_briefing(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    payload: Result<Json<BriefingBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(body) = payload?;
    let request = body.validate()?;

    let settings = state.config.snapshot().await;
    settings.stock_pool(request.source)?;

    let (request_range, request_source) = (request.range.to_string(), request.source);
    let pipelines = state.pipelines.clone();
    let task_id = state.tasks.spawn(TaskKind::DailyBriefing, move |ctx| async move {
        pipelines.daily_briefing(&ctx, &settings, &request).await
    });
    tracing::info!(
        "Daily briefing {} submitted for {} ({}), request {}",
        task_id,
        request_range,
        request_source,
        request_id
    );

    Ok((StatusCode::ACCEPTED, Json(json!({ "task_id": task_id }))))
}

async fn daily_briefing_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskSnapshot>, AppError> {
    Ok(Json(state.tasks.get_status(TaskKind::DailyBriefing, &task_id)?))
}
