//! Investment report submission. The POST answers synchronously when the
//! report finishes within `sync_report_wait`, otherwise it hands back a task
//! id to poll.

use anyhow::anyhow;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use briefing_core::{InvestmentRequest, PipelineError, Settings};
use serde::Deserialize;
use serde_json::json;
use task_manager::{TaskKind, TaskSnapshot, TaskStatus};

use crate::request_id::RequestId;
use crate::{AppError, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentBody {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub user_info: Option<String>,
    #[serde(default)]
    pub report_period: Option<String>,
}

impl InvestmentBody {
    /// Missing fields fall back to the saved `ticker` and `userInfo`. The
    /// saved document itself is left untouched.
    pub fn validate(&self, settings: &Settings) -> Result<InvestmentRequest, PipelineError> {
        let ticker = non_blank(&self.ticker)
            .or_else(|| non_blank(&settings.ticker))
            .unwrap_or_default();
        let user_info = non_blank(&self.user_info).or_else(|| non_blank(&settings.user_info));
        InvestmentRequest::validate(ticker, user_info, self.report_period.as_deref())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/api/run/investment_report", post(run_investment_report))
        .route(
            "/api/status/investment_report/:task_id",
            get(investment_report_status),
        )
}

async fn run_investment_report(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    payload: Result<Json<InvestmentBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = payload?;
    let settings = state.config.snapshot().await;
    let request = body.validate(&settings)?;
    tracing::info!(
        "Investment report requested for {}, request {}",
        request.ticker,
        request_id
    );

    let pipelines = state.pipelines.clone();
    let task_id = state.tasks.spawn(TaskKind::InvestmentReport, move |ctx| async move {
        pipelines.investment_report(&ctx, &settings, &request).await
    });

    let finished = state
        .tasks
        .wait(TaskKind::InvestmentReport, &task_id, state.sync_report_wait)
        .await?;

    match finished {
        Some(snapshot) if snapshot.status == TaskStatus::Complete => {
            Ok(Json(json!({ "report_url": snapshot.report_url })).into_response())
        }
        Some(snapshot) => match state.tasks.failure(TaskKind::InvestmentReport, &task_id)? {
            Some(cause) => Err(cause.into()),
            None => Err(AppError::with_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                anyhow!(snapshot.detail.unwrap_or(snapshot.message)),
            )),
        },
        None => Ok((StatusCode::ACCEPTED, Json(json!({ "task_id": task_id }))).into_response()),
    }
}

async fn investment_report_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskSnapshot>, AppError> {
    Ok(Json(state.tasks.get_status(TaskKind::InvestmentReport, &task_id)?))
}
