use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Contact-form fields as last entered, kept so a failed submission can be
/// restored for the visitor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactDraft {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub inquiry_type: String,
    pub property_id: Option<i32>,
}

#[derive(Default)]
pub struct VisitState {
    pub visitor_id: String,
    pub contact_draft: Option<ContactDraft>,
    pub newsletter_draft: Option<String>,
    pub consent_settings_open: bool,
}

struct VisitEntry {
    state: VisitState,
    last_seen: Instant,
}

/// Per-visit state, the server-side stand-in for what the browser build kept
/// in tab-scoped storage. Entries die with the visit; a scheduled job purges
/// the ones whose tab went away without saying goodbye.
pub struct VisitRegistry {
    visits: DashMap<String, VisitEntry>,
}

impl VisitRegistry {
    pub fn new() -> Self {
        Self { visits: DashMap::new() }
    }

    /// Registers a visit, returning true when it was already known (the
    /// equivalent of the old `hasVisited` tab flag).
    pub fn register(&self, visit_id: &str, visitor_id: &str) -> bool {
        let now = Instant::now();
        match self.visits.get_mut(visit_id) {
            Some(mut entry) => {
                entry.last_seen = now;
                true
            }
            None => {
                self.visits.insert(
                    visit_id.to_string(),
                    VisitEntry {
                        state: VisitState {
                            visitor_id: visitor_id.to_string(),
                            ..VisitState::default()
                        },
                        last_seen: now,
                    },
                );
                false
            }
        }
    }

    pub fn with_state<T>(&self, visit_id: &str, f: impl FnOnce(&mut VisitState) -> T) -> Option<T> {
        self.visits.get_mut(visit_id).map(|mut entry| {
            entry.last_seen = Instant::now();
            f(&mut entry.state)
        })
    }

    pub fn contact_draft(&self, visit_id: &str) -> Option<ContactDraft> {
        self.visits
            .get(visit_id)
            .and_then(|e| e.state.contact_draft.clone())
    }

    /// Drops visits idle past `max_idle`, returning their ids so dependent
    /// per-visit state (popup sessions, overlay counters) can be dropped too.
    pub fn purge_idle(&self, max_idle: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .visits
            .iter()
            .filter(|entry| entry.value().last_seen.elapsed() >= max_idle)
            .map(|entry| entry.key().clone())
            .collect();
        for visit_id in &expired {
            self.visits.remove(visit_id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }
}
