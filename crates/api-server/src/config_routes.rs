//! Config document API.

use axum::{extract::rejection::JsonRejection, extract::State, routing::get, Json, Router};
use briefing_core::Settings;
use serde_json::{json, Value};

use crate::config_store::Document;
use crate::{AppError, AppState};

pub fn config_routes() -> Router<AppState> {
    Router::new().route("/api/config", get(get_config).post(save_config))
}

async fn get_config(State(state): State<AppState>) -> Json<Document> {
    Json(state.config.document().await)
}

async fn save_config(
    State(state): State<AppState>,
    payload: Result<Json<Document>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(document) = payload?;
    let settings = Settings::from_document(&document)?;
    state.config.replace(document, settings).await?;
    Ok(Json(json!({ "message": "Configuration saved" })))
}
