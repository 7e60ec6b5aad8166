use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use crate::services::consent::ConsentState;
use crate::services::settings::{SettingsService, CONSENT_PREFERENCES_KEY};

/// Best-effort event sink. Every call is fire-and-forget: failures are logged
/// at debug level and swallowed, and nothing is sent for a visitor whose
/// consent record does not grant analytics.
pub struct AnalyticsDispatcher {
    client: reqwest::Client,
    collector_url: Option<String>,
    site_key: Option<String>,
    settings: Arc<SettingsService>,
}

impl AnalyticsDispatcher {
    pub fn from_env(settings: Arc<SettingsService>) -> Self {
        Self {
            client: reqwest::Client::new(),
            collector_url: std::env::var("ANALYTICS_COLLECTOR_URL").ok(),
            site_key: std::env::var("ANALYTICS_SITE_KEY").ok(),
            settings,
        }
    }

    #[cfg(test)]
    pub fn disabled(settings: Arc<SettingsService>) -> Self {
        Self {
            client: reqwest::Client::new(),
            collector_url: None,
            site_key: None,
            settings,
        }
    }

    fn analytics_granted(&self, visitor_id: &str) -> bool {
        self.settings
            .get_json::<ConsentState>(visitor_id, CONSENT_PREFERENCES_KEY)
            .ok()
            .flatten()
            .map(|c| c.analytics)
            .unwrap_or(false)
    }

    pub fn should_dispatch(&self, visitor_id: &str) -> bool {
        self.collector_url.is_some() && self.analytics_granted(visitor_id)
    }

    pub fn track_event(&self, visitor_id: &str, action: &str, category: &str, label: Option<&str>) {
        if !self.should_dispatch(visitor_id) {
            return;
        }
        let payload = json!({
            "action": action,
            "category": category,
            "label": label,
            "visitor": visitor_id,
            "site": self.site_key,
            "ts": SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs(),
        });
        self.post(payload);
    }

    /// Tells the collector to start or stop collecting for this visitor.
    /// Safe to call when no collector is configured; the call is skipped.
    pub fn set_collection(&self, visitor_id: &str, enabled: bool) {
        if self.collector_url.is_none() {
            tracing::debug!("No analytics collector configured, skipping consent sync");
            return;
        }
        let payload = json!({
            "action": if enabled { "consent_granted" } else { "consent_revoked" },
            "category": "consent",
            "visitor": visitor_id,
            "site": self.site_key,
        });
        self.post(payload);
    }

    fn post(&self, payload: serde_json::Value) {
        let url = match &self.collector_url {
            Some(url) => url.clone(),
            None => return,
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&payload).send().await {
                tracing::debug!("Analytics dispatch failed: {}", e);
            }
        });
    }

    // Named wrappers used across the handlers.

    pub fn page_view(&self, visitor_id: &str, path: &str) {
        self.track_event(visitor_id, "page_view", "navigation", Some(path));
    }

    pub fn cta_click(&self, visitor_id: &str, label: &str) {
        self.track_event(visitor_id, "cta_click", "engagement", Some(label));
    }

    pub fn form_submit(&self, visitor_id: &str, form: &str) {
        self.track_event(visitor_id, "form_submit", "lead", Some(form));
    }

    pub fn property_view(&self, visitor_id: &str, slug: &str) {
        self.track_event(visitor_id, "property_view", "catalogue", Some(slug));
    }

    pub fn property_enquiry(&self, visitor_id: &str, slug: &str) {
        self.track_event(visitor_id, "property_enquiry", "lead", Some(slug));
    }

    pub fn scroll_depth(&self, visitor_id: &str, percent: u8) {
        self.track_event(visitor_id, "scroll_depth", "engagement", Some(&percent.to_string()));
    }

    pub fn valuation_request(&self, visitor_id: &str) {
        self.track_event(visitor_id, "valuation_request", "lead", None);
    }

    pub fn promotion_view(&self, visitor_id: &str) {
        self.track_event(visitor_id, "promotion_view", "popup", None);
    }

    pub fn promotion_dismissal(&self, visitor_id: &str, step: &str) {
        self.track_event(visitor_id, "promotion_dismissal", "popup", Some(step));
    }
}
