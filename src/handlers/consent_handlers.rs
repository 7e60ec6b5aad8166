use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;

use crate::handlers::visitor_context::VisitorContext;
use crate::services::consent::{ConsentState, ConsentUpdate, ConsentView};
use crate::AppState;

fn internal_error(e: crate::error::ServiceError) -> (StatusCode, Json<serde_json::Value>) {
    tracing::error!("Consent storage error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Failed to access consent storage"})),
    )
}

pub async fn get_consent(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
) -> Result<Json<ConsentView>, (StatusCode, Json<serde_json::Value>)> {
    state.visits.register(&context.visit_id, &context.visitor_id);
    let view = state
        .consent
        .view(&context.visitor_id, &context.visit_id)
        .map_err(internal_error)?;
    Ok(Json(view))
}

pub async fn accept_all(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
) -> Result<Json<ConsentState>, (StatusCode, Json<serde_json::Value>)> {
    let consent = state
        .consent
        .accept_all(&context.visitor_id, &context.visit_id)
        .map_err(internal_error)?;
    Ok(Json(consent))
}

pub async fn reject_all(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
) -> Result<Json<ConsentState>, (StatusCode, Json<serde_json::Value>)> {
    let consent = state
        .consent
        .reject_all(&context.visitor_id, &context.visit_id)
        .map_err(internal_error)?;
    Ok(Json(consent))
}

pub async fn save_preferences(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
    Json(update): Json<ConsentUpdate>,
) -> Result<Json<ConsentState>, (StatusCode, Json<serde_json::Value>)> {
    let consent = state
        .consent
        .save_preferences(&context.visitor_id, &context.visit_id, update)
        .map_err(internal_error)?;
    Ok(Json(consent))
}

pub async fn open_settings(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
) -> Json<serde_json::Value> {
    state.visits.register(&context.visit_id, &context.visitor_id);
    state.consent.open_settings(&context.visit_id);
    Json(json!({"settings_open": true}))
}

pub async fn close_settings(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
) -> Json<serde_json::Value> {
    state.consent.close_settings(&context.visit_id);
    Json(json!({"settings_open": false}))
}
