use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;

use crate::handlers::visitor_context::VisitorContext;
use crate::services::settings::POPUP_DISMISSED_KEY;
use crate::AppState;

#[derive(Deserialize)]
pub struct TrackEventRequest {
    pub action: String,
    pub category: String,
    pub label: Option<String>,
}

/// First call a page makes. Registers the visit and hands back everything
/// the shell needs to boot: whether this tab has been seen before (loading
/// screen), the consent state, and whether the popup is out of the picture.
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let has_visited = state.visits.register(&context.visit_id, &context.visitor_id);
    let consent = state.consent.view(&context.visitor_id, &context.visit_id).map_err(|e| {
        tracing::error!("Failed to load consent state: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to load visitor state"})),
        )
    })?;
    let popup_suppressed = state
        .settings
        .get_flag(&context.visitor_id, POPUP_DISMISSED_KEY)
        .unwrap_or(true);
    Ok(Json(json!({
        "has_visited": has_visited,
        "consent": consent.consent,
        "banner_required": consent.banner_required,
        "popup_suppressed": popup_suppressed,
    })))
}

/// Overlay registration, replacing the old scroll-lock sniffing: any surface
/// that takes the screen (nav sheet, gallery, dialog) opens an overlay here
/// and closes it when it leaves.
pub async fn open_overlay(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
) -> Json<serde_json::Value> {
    state.visits.register(&context.visit_id, &context.visitor_id);
    let open = state.overlays.open(&context.visit_id);
    Json(json!({"open_overlays": open}))
}

pub async fn close_overlay(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
) -> Json<serde_json::Value> {
    let open = state.overlays.close(&context.visit_id);
    Json(json!({"open_overlays": open}))
}

/// Client-reported analytics events (page views, CTA clicks, scroll depth
/// milestones). Consent gating happens inside the dispatcher, so this always
/// answers ok.
pub async fn track_event(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
    Json(request): Json<TrackEventRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if request.action.is_empty() || request.action.len() > 64 || request.category.len() > 64 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid event"})),
        ));
    }
    let label = request.label.as_deref().filter(|l| l.len() <= 256);
    state
        .analytics
        .track_event(&context.visitor_id, &request.action, &request.category, label);
    Ok(Json(json!({"ok": true})))
}
