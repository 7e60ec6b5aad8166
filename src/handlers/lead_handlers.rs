use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use serde_json::json;

use crate::handlers::visitor_context::VisitorContext;
use crate::repositories::lead_repository::LeadSubmission;
use crate::services::visits::ContactDraft;
use crate::utils::optimistic;
use crate::AppState;

const INQUIRY_TYPES: [&str; 4] = ["general", "property", "valuation", "newsletter"];

#[derive(Deserialize)]
pub struct ContactFormRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub inquiry_type: String,
    pub property_id: Option<i32>,
}

#[derive(Deserialize)]
pub struct NewsletterRequest {
    pub email: String,
}

fn plausible_email(email: &str) -> bool {
    email.len() <= 254 && email.contains('@') && !email.starts_with('@') && !email.ends_with('@')
}

pub async fn submit_contact_form(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
    Json(request): Json<ContactFormRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if request.name.trim().is_empty() || request.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Name and message are required"})),
        ));
    }
    if !plausible_email(&request.email) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid email address"})),
        ));
    }
    if !INQUIRY_TYPES.contains(&request.inquiry_type.as_str()) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid inquiry type"})),
        ));
    }

    // 3 submissions per minute per email address
    let quota = Quota::per_minute(nonzero!(3u32));
    let limiter_key = request.email.clone();
    let entry = state
        .lead_limiter
        .entry(limiter_key.clone())
        .or_insert_with(|| RateLimiter::keyed(quota));
    if entry.value().check_key(&limiter_key).is_err() {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "Too many submissions, try again shortly"})),
        ));
    }
    drop(entry);

    state.visits.register(&context.visit_id, &context.visitor_id);

    // Remember the fields as entered, then clear them optimistically; a
    // failed write puts them back so the form can re-render what the
    // visitor typed.
    let draft = ContactDraft {
        name: request.name.clone(),
        email: request.email.clone(),
        phone: request.phone.clone(),
        message: request.message.clone(),
        inquiry_type: request.inquiry_type.clone(),
        property_id: request.property_id,
    };
    state.visits.with_state(&context.visit_id, |s| s.contact_draft = Some(draft));

    let repo = state.lead_repository.clone();
    let submission = LeadSubmission {
        name: request.name,
        email: request.email,
        phone: request.phone,
        message: request.message,
        inquiry_type: request.inquiry_type.clone(),
        property_id: request.property_id,
        visitor_id: Some(context.visitor_id.clone()),
    };
    let result = optimistic::run(
        || {
            state
                .visits
                .with_state(&context.visit_id, |s| s.contact_draft.take())
                .flatten()
        },
        async move { repo.insert_lead(submission) },
        |snapshot| {
            state
                .visits
                .with_state(&context.visit_id, |s| s.contact_draft = snapshot);
        },
    )
    .await;

    let lead = match result {
        Ok(lead) => lead,
        Err(e) => {
            tracing::error!("Failed to save lead: {}", e);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to submit enquiry. Please try again."})),
            ));
        }
    };

    state.analytics.form_submit(&context.visitor_id, "contact");
    match request.inquiry_type.as_str() {
        "valuation" => state.analytics.valuation_request(&context.visitor_id),
        "property" => {
            if let Some(property_id) = lead.property_id {
                state
                    .analytics
                    .property_enquiry(&context.visitor_id, &property_id.to_string());
            }
        }
        _ => {}
    }

    let mailer = state.mailer.clone();
    let lead_for_mail = lead.clone();
    tokio::task::spawn_blocking(move || mailer.notify_new_lead(&lead_for_mail));

    Ok(Json(json!({"reference": lead.reference})))
}

pub async fn get_contact_draft(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
) -> Json<serde_json::Value> {
    Json(json!({"draft": state.visits.contact_draft(&context.visit_id)}))
}

pub async fn subscribe_newsletter(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
    Json(request): Json<NewsletterRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !plausible_email(&request.email) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid email address"})),
        ));
    }

    let quota = Quota::per_minute(nonzero!(3u32));
    let limiter_key = request.email.clone();
    let entry = state
        .lead_limiter
        .entry(limiter_key.clone())
        .or_insert_with(|| RateLimiter::keyed(quota));
    if entry.value().check_key(&limiter_key).is_err() {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "Too many submissions, try again shortly"})),
        ));
    }
    drop(entry);

    state.visits.register(&context.visit_id, &context.visitor_id);
    state
        .visits
        .with_state(&context.visit_id, |s| s.newsletter_draft = Some(request.email.clone()));

    let repo = state.lead_repository.clone();
    let email = request.email.clone();
    let visitor_id = context.visitor_id.clone();
    let result = optimistic::run(
        || {
            state
                .visits
                .with_state(&context.visit_id, |s| s.newsletter_draft.take())
                .flatten()
        },
        async move { repo.save_subscriber(&email, "footer", Some(&visitor_id)) },
        |snapshot| {
            state
                .visits
                .with_state(&context.visit_id, |s| s.newsletter_draft = snapshot);
        },
    )
    .await;

    if let Err(e) = result {
        tracing::error!("Failed to save subscriber: {}", e);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to subscribe. Please try again."})),
        ));
    }

    state.analytics.form_submit(&context.visitor_id, "newsletter");
    Ok(Json(json!({"subscribed": true})))
}
