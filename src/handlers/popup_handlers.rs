use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use serde_json::json;

use crate::handlers::visitor_context::VisitorContext;
use crate::repositories::lead_repository::LeadSubmission;
use crate::services::popup::{DialogStep, TriggerSignal};
use crate::AppState;

#[derive(Deserialize)]
pub struct SignupRequest {
    pub first_name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct PreferencesRequest {
    pub first_name: String,
    pub email: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub price_range: Option<String>,
    pub min_beds: Option<i32>,
}

fn step_name(step: DialogStep) -> &'static str {
    match step {
        DialogStep::Signup => "signup",
        DialogStep::Preferences => "preferences",
    }
}

/// The page reports raw trigger measurements; the coordinator answers with
/// whether the dialog should open.
pub async fn post_signal(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
    Json(signal): Json<TriggerSignal>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    // 60 signals per minute per visit keeps a misbehaving tab in check
    let quota = Quota::per_minute(nonzero!(60u32));
    let limiter_key = context.visit_id.clone();
    let entry = state
        .signal_limiter
        .entry(limiter_key.clone())
        .or_insert_with(|| RateLimiter::keyed(quota));
    if entry.value().check_key(&limiter_key).is_err() {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "Too many signals"})),
        ));
    }
    drop(entry);

    state.visits.register(&context.visit_id, &context.visitor_id);
    let decision = state
        .popup
        .offer(&context.visitor_id, &context.visit_id, signal)
        .await;
    let step = state.popup.dialog_step(&context.visit_id).map(step_name);
    Ok(Json(json!({"decision": decision, "step": step})))
}

pub async fn get_popup_state(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
) -> Json<serde_json::Value> {
    let step = state.popup.dialog_step(&context.visit_id).map(step_name);
    Json(json!({"step": step}))
}

/// Step 1 of the dialog: name and email, written as a newsletter-intent
/// lead. The dialog advances to step 2 as soon as the request is accepted;
/// a failed write is reported for a toast but does not pull the dialog back.
pub async fn submit_signup(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
    Json(request): Json<SignupRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if request.first_name.trim().is_empty() || !request.email.contains('@') {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Name and a valid email are required"})),
        ));
    }
    if state.popup.dialog_step(&context.visit_id) != Some(DialogStep::Signup) {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({"error": "Dialog is not awaiting signup"})),
        ));
    }

    state.popup.advance_to_preferences(&context.visit_id);

    let lead_result = state.lead_repository.insert_lead(LeadSubmission {
        name: request.first_name.clone(),
        email: request.email.clone(),
        phone: None,
        message: "Newsletter signup from the priority access dialog".to_string(),
        inquiry_type: "newsletter".to_string(),
        property_id: None,
        visitor_id: Some(context.visitor_id.clone()),
    });
    if let Err(e) = &lead_result {
        tracing::error!("Failed to save popup signup lead: {}", e);
    }
    if let Err(e) =
        state
            .lead_repository
            .save_subscriber(&request.email, "popup", Some(&context.visitor_id))
    {
        tracing::error!("Failed to save popup subscriber: {}", e);
    }

    match lead_result {
        Ok(_) => {
            state.analytics.form_submit(&context.visitor_id, "popup-signup");
            Ok(Json(json!({"step": "preferences", "saved": true})))
        }
        Err(_) => Ok(Json(json!({
            "step": "preferences",
            "saved": false,
            "error": "Failed to save your details"
        }))),
    }
}

/// Step 2: buying preferences, written as a priority-access lead. Closes the
/// dialog whether or not the write lands.
pub async fn submit_preferences(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
    Json(request): Json<PreferencesRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if state.popup.dialog_step(&context.visit_id) != Some(DialogStep::Preferences) {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({"error": "Dialog is not awaiting preferences"})),
        ));
    }

    state.popup.complete(&context.visit_id);

    let message = format!(
        "Priority access request. Address: {}. Price range: {}. Min beds: {}.",
        request.address.as_deref().unwrap_or("-"),
        request.price_range.as_deref().unwrap_or("-"),
        request
            .min_beds
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    let lead_result = state.lead_repository.insert_lead(LeadSubmission {
        name: request.first_name,
        email: request.email,
        phone: request.phone,
        message,
        inquiry_type: "general".to_string(),
        property_id: None,
        visitor_id: Some(context.visitor_id.clone()),
    });

    match lead_result {
        Ok(_) => {
            state.analytics.form_submit(&context.visitor_id, "popup-preferences");
            Ok(Json(json!({"closed": true, "saved": true})))
        }
        Err(e) => {
            tracing::error!("Failed to save popup preferences lead: {}", e);
            Ok(Json(json!({
                "closed": true,
                "saved": false,
                "error": "Failed to save your preferences"
            })))
        }
    }
}

pub async fn dismiss_dialog(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
) -> Json<serde_json::Value> {
    if let Some(step) = state.popup.dismiss(&context.visit_id) {
        state
            .analytics
            .promotion_dismissal(&context.visitor_id, step_name(step));
    }
    Json(json!({"closed": true}))
}
