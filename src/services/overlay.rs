use dashmap::DashMap;

/// Shared registry of open overlays (mobile nav sheet, dialogs), keyed by
/// visit. Surfaces register on open and release on close; the popup
/// coordinator consults this instead of inferring overlay state from styling
/// side effects.
#[derive(Default)]
pub struct OverlayStack {
    open_counts: DashMap<String, u32>,
}

impl OverlayStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, visit_id: &str) -> u32 {
        let mut entry = self.open_counts.entry(visit_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn close(&self, visit_id: &str) -> u32 {
        match self.open_counts.get_mut(visit_id) {
            Some(mut entry) => {
                // Unbalanced close calls must not wedge the counter below zero.
                *entry = entry.saturating_sub(1);
                *entry
            }
            None => 0,
        }
    }

    pub fn is_open(&self, visit_id: &str) -> bool {
        self.open_counts.get(visit_id).map(|c| *c > 0).unwrap_or(false)
    }

    pub fn forget(&self, visit_id: &str) {
        self.open_counts.remove(visit_id);
    }
}
