use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::services::analytics::AnalyticsDispatcher;
use crate::services::settings::{
    SettingsService, CONSENT_PREFERENCES_KEY, CONSENT_SUMMARY_KEY,
};
use crate::services::visits::VisitRegistry;

/// Tri-state consent record. `necessary` is always true; the setters below
/// enforce that no matter what the caller sends.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsentState {
    pub necessary: bool,
    pub analytics: bool,
    pub marketing: bool,
}

impl Default for ConsentState {
    fn default() -> Self {
        Self { necessary: true, analytics: false, marketing: false }
    }
}

/// Partial update from the preferences panel. A `necessary` field is accepted
/// from older clients but has no effect.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct ConsentUpdate {
    pub necessary: Option<bool>,
    pub analytics: Option<bool>,
    pub marketing: Option<bool>,
}

#[derive(Serialize)]
pub struct ConsentView {
    pub consent: ConsentState,
    pub banner_required: bool,
    pub settings_open: bool,
}

pub struct ConsentService {
    settings: Arc<SettingsService>,
    dispatcher: Arc<AnalyticsDispatcher>,
    visits: Arc<VisitRegistry>,
}

impl ConsentService {
    pub fn new(
        settings: Arc<SettingsService>,
        dispatcher: Arc<AnalyticsDispatcher>,
        visits: Arc<VisitRegistry>,
    ) -> Self {
        Self { settings, dispatcher, visits }
    }

    pub fn current(&self, visitor_id: &str) -> Result<ConsentState, ServiceError> {
        Ok(self
            .settings
            .get_json::<ConsentState>(visitor_id, CONSENT_PREFERENCES_KEY)?
            .unwrap_or_default())
    }

    /// The banner shows only while no consent record exists. Any consent
    /// action writes one, so the banner never comes back on later mounts.
    pub fn banner_required(&self, visitor_id: &str) -> Result<bool, ServiceError> {
        let recorded = self.settings.contains(visitor_id, CONSENT_PREFERENCES_KEY)?
            || self.settings.contains(visitor_id, CONSENT_SUMMARY_KEY)?;
        Ok(!recorded)
    }

    pub fn view(&self, visitor_id: &str, visit_id: &str) -> Result<ConsentView, ServiceError> {
        let settings_open = self
            .visits
            .with_state(visit_id, |state| state.consent_settings_open)
            .unwrap_or(false);
        Ok(ConsentView {
            consent: self.current(visitor_id)?,
            banner_required: self.banner_required(visitor_id)?,
            settings_open,
        })
    }

    pub fn accept_all(&self, visitor_id: &str, visit_id: &str) -> Result<ConsentState, ServiceError> {
        let next = ConsentState { necessary: true, analytics: true, marketing: true };
        self.commit(visitor_id, visit_id, next, "accepted")
    }

    pub fn reject_all(&self, visitor_id: &str, visit_id: &str) -> Result<ConsentState, ServiceError> {
        let next = ConsentState::default();
        self.commit(visitor_id, visit_id, next, "rejected")
    }

    pub fn save_preferences(
        &self,
        visitor_id: &str,
        visit_id: &str,
        update: ConsentUpdate,
    ) -> Result<ConsentState, ServiceError> {
        let current = self.current(visitor_id)?;
        let next = ConsentState {
            necessary: true,
            analytics: update.analytics.unwrap_or(current.analytics),
            marketing: update.marketing.unwrap_or(current.marketing),
        };
        self.commit(visitor_id, visit_id, next, "custom")
    }

    pub fn open_settings(&self, visit_id: &str) {
        self.visits.with_state(visit_id, |state| state.consent_settings_open = true);
    }

    pub fn close_settings(&self, visit_id: &str) {
        self.visits.with_state(visit_id, |state| state.consent_settings_open = false);
    }

    fn commit(
        &self,
        visitor_id: &str,
        visit_id: &str,
        next: ConsentState,
        summary: &str,
    ) -> Result<ConsentState, ServiceError> {
        let previous = self.current(visitor_id)?;
        self.settings.set_json(visitor_id, CONSENT_PREFERENCES_KEY, &next)?;
        self.settings.set_raw(visitor_id, CONSENT_SUMMARY_KEY, summary)?;
        self.close_settings(visit_id);
        if previous.analytics != next.analytics {
            self.dispatcher.set_collection(visitor_id, next.analytics);
        }
        tracing::info!("Consent saved ({}) for visitor", summary);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::settings::MemorySettingsStorage;

    fn service() -> ConsentService {
        let settings = Arc::new(SettingsService::new(Arc::new(MemorySettingsStorage::default())));
        let dispatcher = Arc::new(AnalyticsDispatcher::disabled(settings.clone()));
        let visits = Arc::new(VisitRegistry::new());
        visits.register("t-1", "v-1");
        ConsentService::new(settings, dispatcher, visits)
    }

    #[tokio::test]
    async fn necessary_survives_every_action() {
        let service = service();
        let update = ConsentUpdate {
            necessary: Some(false),
            analytics: Some(true),
            marketing: None,
        };
        assert!(service.save_preferences("v-1", "t-1", update).unwrap().necessary);
        assert!(service.accept_all("v-1", "t-1").unwrap().necessary);
        assert!(service.reject_all("v-1", "t-1").unwrap().necessary);
    }

    #[tokio::test]
    async fn banner_shows_until_any_choice_is_made() {
        let service = service();
        assert!(service.banner_required("v-1").unwrap());
        service.reject_all("v-1", "t-1").unwrap();
        assert!(!service.banner_required("v-1").unwrap());
        // A later mount with the same stored state stays quiet.
        assert!(!service.banner_required("v-1").unwrap());
        assert!(service.banner_required("v-2").unwrap());
    }

    #[tokio::test]
    async fn partial_update_merges_over_current_record() {
        let service = service();
        service
            .save_preferences("v-1", "t-1", ConsentUpdate {
                analytics: Some(true),
                ..ConsentUpdate::default()
            })
            .unwrap();
        let merged = service
            .save_preferences("v-1", "t-1", ConsentUpdate {
                marketing: Some(true),
                ..ConsentUpdate::default()
            })
            .unwrap();
        assert!(merged.analytics);
        assert!(merged.marketing);
    }

    #[tokio::test]
    async fn saving_closes_the_settings_panel() {
        let service = service();
        service.open_settings("t-1");
        service.save_preferences("v-1", "t-1", ConsentUpdate::default()).unwrap();
        let view = service.view("v-1", "t-1").unwrap();
        assert!(!view.settings_open);
        assert!(!view.banner_required);
    }
}
