use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use serde_json::json;

const MAX_ID_LEN: usize = 64;

/// Identifies the caller across the public surfaces. The browser generates a
/// stable visitor id (its profile) and a per-tab visit id (its session) and
/// sends both on every request.
#[derive(Clone)]
pub struct VisitorContext {
    pub visitor_id: String,
    pub visit_id: String,
}

fn header_id(parts: &Parts, name: &str) -> Option<String> {
    let value = parts.headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() || value.len() > MAX_ID_LEN {
        return None;
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return None;
    }
    Some(value.to_string())
}

impl<S> FromRequestParts<S> for VisitorContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let visitor_id = header_id(parts, "x-visitor-id").ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Missing or invalid x-visitor-id header"})),
            )
        })?;
        let visit_id = header_id(parts, "x-visit-id").ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Missing or invalid x-visit-id header"})),
            )
        })?;
        Ok(Self { visitor_id, visit_id })
    }
}
