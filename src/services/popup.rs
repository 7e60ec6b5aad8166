use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::services::analytics::AnalyticsDispatcher;
use crate::services::overlay::OverlayStack;
use crate::services::settings::{SettingsService, POPUP_DISMISSED_KEY};

pub const SCROLL_DEPTH_THRESHOLD: f64 = 0.6;
pub const EXIT_INTENT_EDGE_PX: f64 = 10.0;
pub const DWELL_SECS: u64 = 45;

/// One of the independent heuristics that can promote the lead-capture
/// dialog. The page reports raw measurements; qualification is decided here
/// so the thresholds live in exactly one place.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSignal {
    ExitIntent { pointer_y: f64, moving: bool, desktop: bool },
    ScrollDepth { scroll_y: f64, viewport_height: f64, document_height: f64 },
    Dwell { elapsed_secs: u64 },
}

impl TriggerSignal {
    fn qualifies(&self) -> bool {
        match *self {
            TriggerSignal::ExitIntent { pointer_y, moving, desktop } => {
                desktop && moving && pointer_y <= EXIT_INTENT_EDGE_PX
            }
            TriggerSignal::ScrollDepth { scroll_y, viewport_height, document_height } => {
                document_height > 0.0
                    && (scroll_y + viewport_height) / document_height > SCROLL_DEPTH_THRESHOLD
            }
            TriggerSignal::Dwell { elapsed_secs } => elapsed_secs >= DWELL_SECS,
        }
    }

    fn is_dwell(&self) -> bool {
        matches!(self, TriggerSignal::Dwell { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            TriggerSignal::ExitIntent { .. } => "exit_intent",
            TriggerSignal::ScrollDepth { .. } => "scroll_depth",
            TriggerSignal::Dwell { .. } => "dwell",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupDecision {
    /// The dialog opens now; the session is disarmed for good.
    Open,
    /// Signal did not qualify or an overlay was open; the session stays armed
    /// (except the one-shot dwell timer, which is spent).
    Ignored,
    /// Permanently dismissed visitor or already-triggered session.
    Suppressed,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogStep {
    Signup,
    Preferences,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum PopupPhase {
    Armed,
    Dialog(DialogStep),
    Done,
}

struct PopupSession {
    phase: PopupPhase,
    dwell_spent: bool,
}

impl Default for PopupSession {
    fn default() -> Self {
        Self { phase: PopupPhase::Armed, dwell_spent: false }
    }
}

struct TriggerCandidate {
    visit_id: String,
    visitor_id: String,
    signal: TriggerSignal,
    reply: oneshot::Sender<PopupDecision>,
}

/// Decides, at most once per visit, whether to present the two-step
/// lead-capture dialog. Signal sources post candidates into a channel and a
/// single consumer loop takes the first qualifying one, so simultaneous
/// signals cannot race the disarm flag.
pub struct PopupCoordinator {
    tx: mpsc::UnboundedSender<TriggerCandidate>,
    sessions: Arc<DashMap<String, PopupSession>>,
}

impl PopupCoordinator {
    pub fn new(
        settings: Arc<SettingsService>,
        overlays: Arc<OverlayStack>,
        dispatcher: Arc<AnalyticsDispatcher>,
    ) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<TriggerCandidate>();
        let sessions: Arc<DashMap<String, PopupSession>> = Arc::new(DashMap::new());
        let consumer_sessions = sessions.clone();
        tokio::spawn(async move {
            while let Some(candidate) = rx.recv().await {
                let decision =
                    evaluate(&settings, &overlays, &dispatcher, &consumer_sessions, &candidate);
                // The poster may have gone away; nothing to do then.
                let _ = candidate.reply.send(decision);
            }
        });
        Arc::new(Self { tx, sessions })
    }

    /// Posts a trigger candidate and waits for the coordinator's verdict.
    pub async fn offer(
        &self,
        visitor_id: &str,
        visit_id: &str,
        signal: TriggerSignal,
    ) -> PopupDecision {
        let (reply, rx) = oneshot::channel();
        let candidate = TriggerCandidate {
            visit_id: visit_id.to_string(),
            visitor_id: visitor_id.to_string(),
            signal,
            reply,
        };
        if self.tx.send(candidate).is_err() {
            return PopupDecision::Ignored;
        }
        rx.await.unwrap_or(PopupDecision::Ignored)
    }

    pub fn dialog_step(&self, visit_id: &str) -> Option<DialogStep> {
        self.sessions.get(visit_id).and_then(|s| match s.phase {
            PopupPhase::Dialog(step) => Some(step),
            _ => None,
        })
    }

    /// Step 1 succeeded; the dialog moves on to the preferences step.
    pub fn advance_to_preferences(&self, visit_id: &str) -> bool {
        match self.sessions.get_mut(visit_id) {
            Some(mut session) if session.phase == PopupPhase::Dialog(DialogStep::Signup) => {
                session.phase = PopupPhase::Dialog(DialogStep::Preferences);
                true
            }
            _ => false,
        }
    }

    /// Step 2 succeeded; the dialog closes for good.
    pub fn complete(&self, visit_id: &str) -> bool {
        match self.sessions.get_mut(visit_id) {
            Some(mut session) if session.phase == PopupPhase::Dialog(DialogStep::Preferences) => {
                session.phase = PopupPhase::Done;
                true
            }
            _ => false,
        }
    }

    /// Explicit close at either step. Returns the step the visitor abandoned
    /// so the caller can record the dismissal event.
    pub fn dismiss(&self, visit_id: &str) -> Option<DialogStep> {
        match self.sessions.get_mut(visit_id) {
            Some(mut session) => match session.phase {
                PopupPhase::Dialog(step) => {
                    session.phase = PopupPhase::Done;
                    Some(step)
                }
                _ => None,
            },
            None => None,
        }
    }

    pub fn forget(&self, visit_id: &str) {
        self.sessions.remove(visit_id);
    }
}

fn evaluate(
    settings: &SettingsService,
    overlays: &OverlayStack,
    dispatcher: &AnalyticsDispatcher,
    sessions: &DashMap<String, PopupSession>,
    candidate: &TriggerCandidate,
) -> PopupDecision {
    // A visitor who has ever been offered the popup is never offered it
    // again, per the persisted-flag-at-open semantics.
    let dismissed = settings
        .get_flag(&candidate.visitor_id, POPUP_DISMISSED_KEY)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to read popup dismissal flag: {}", e);
            true
        });
    if dismissed {
        return PopupDecision::Suppressed;
    }

    let mut session = sessions.entry(candidate.visit_id.clone()).or_default();
    if session.phase != PopupPhase::Armed {
        return PopupDecision::Suppressed;
    }
    if candidate.signal.is_dwell() && session.dwell_spent {
        return PopupDecision::Ignored;
    }
    if !candidate.signal.qualifies() {
        return PopupDecision::Ignored;
    }
    if overlays.is_open(&candidate.visit_id) {
        // Another surface holds the screen. Listeners stay armed, but the
        // one-shot dwell timer does not retry.
        if candidate.signal.is_dwell() {
            session.dwell_spent = true;
        }
        return PopupDecision::Ignored;
    }

    session.phase = PopupPhase::Dialog(DialogStep::Signup);
    drop(session);
    if let Err(e) = settings.set_flag(&candidate.visitor_id, POPUP_DISMISSED_KEY, true) {
        tracing::error!("Failed to persist popup trigger flag: {}", e);
    }
    dispatcher.promotion_view(&candidate.visitor_id);
    tracing::info!("Popup opened via {} trigger", candidate.signal.name());
    PopupDecision::Open
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::settings::MemorySettingsStorage;

    struct Fixture {
        coordinator: Arc<PopupCoordinator>,
        settings: Arc<SettingsService>,
        overlays: Arc<OverlayStack>,
    }

    fn fixture() -> Fixture {
        let settings = Arc::new(SettingsService::new(Arc::new(MemorySettingsStorage::default())));
        let overlays = Arc::new(OverlayStack::new());
        let dispatcher = Arc::new(AnalyticsDispatcher::disabled(settings.clone()));
        let coordinator = PopupCoordinator::new(settings.clone(), overlays.clone(), dispatcher);
        Fixture { coordinator, settings, overlays }
    }

    fn scroll(ratio_times_100: f64) -> TriggerSignal {
        TriggerSignal::ScrollDepth {
            scroll_y: ratio_times_100 - 50.0,
            viewport_height: 50.0,
            document_height: 100.0,
        }
    }

    fn exit_intent() -> TriggerSignal {
        TriggerSignal::ExitIntent { pointer_y: 4.0, moving: true, desktop: true }
    }

    #[tokio::test]
    async fn scroll_depth_fires_just_past_the_threshold() {
        let f = fixture();
        assert_eq!(f.coordinator.offer("v-1", "t-1", scroll(59.0)).await, PopupDecision::Ignored);
        assert_eq!(f.coordinator.offer("v-1", "t-1", scroll(61.0)).await, PopupDecision::Open);
    }

    #[tokio::test]
    async fn opens_at_most_once_per_session() {
        let f = fixture();
        assert_eq!(f.coordinator.offer("v-1", "t-1", exit_intent()).await, PopupDecision::Open);
        assert_eq!(
            f.coordinator.offer("v-1", "t-1", scroll(90.0)).await,
            PopupDecision::Suppressed
        );
        assert_eq!(
            f.coordinator
                .offer("v-1", "t-1", TriggerSignal::Dwell { elapsed_secs: 60 })
                .await,
            PopupDecision::Suppressed
        );
    }

    #[tokio::test]
    async fn simultaneous_signals_yield_a_single_open() {
        let f = fixture();
        let (a, b, c) = tokio::join!(
            f.coordinator.offer("v-1", "t-1", exit_intent()),
            f.coordinator.offer("v-1", "t-1", scroll(95.0)),
            f.coordinator.offer("v-1", "t-1", TriggerSignal::Dwell { elapsed_secs: 50 }),
        );
        let opens = [a, b, c]
            .iter()
            .filter(|d| **d == PopupDecision::Open)
            .count();
        assert_eq!(opens, 1);
    }

    #[tokio::test]
    async fn persisted_dismissal_suppresses_every_signal() {
        let f = fixture();
        f.settings.set_flag("v-1", POPUP_DISMISSED_KEY, true).unwrap();
        assert_eq!(
            f.coordinator.offer("v-1", "t-1", exit_intent()).await,
            PopupDecision::Suppressed
        );
        assert_eq!(
            f.coordinator.offer("v-1", "t-1", scroll(99.0)).await,
            PopupDecision::Suppressed
        );
    }

    #[tokio::test]
    async fn opening_persists_the_flag_for_future_sessions() {
        let f = fixture();
        assert_eq!(f.coordinator.offer("v-1", "t-1", exit_intent()).await, PopupDecision::Open);
        assert!(f.settings.get_flag("v-1", POPUP_DISMISSED_KEY).unwrap());
        // A fresh session (reload) for the same visitor is never re-offered.
        assert_eq!(
            f.coordinator.offer("v-1", "t-2", exit_intent()).await,
            PopupDecision::Suppressed
        );
    }

    #[tokio::test]
    async fn exit_intent_requires_desktop_edge_and_motion() {
        let f = fixture();
        let off_edge = TriggerSignal::ExitIntent { pointer_y: 11.0, moving: true, desktop: true };
        let still = TriggerSignal::ExitIntent { pointer_y: 4.0, moving: false, desktop: true };
        let mobile = TriggerSignal::ExitIntent { pointer_y: 4.0, moving: true, desktop: false };
        assert_eq!(f.coordinator.offer("v-1", "t-1", off_edge).await, PopupDecision::Ignored);
        assert_eq!(f.coordinator.offer("v-1", "t-1", still).await, PopupDecision::Ignored);
        assert_eq!(f.coordinator.offer("v-1", "t-1", mobile).await, PopupDecision::Ignored);
        assert_eq!(f.coordinator.offer("v-1", "t-1", exit_intent()).await, PopupDecision::Open);
    }

    #[tokio::test]
    async fn open_overlay_defers_triggers_but_spends_the_dwell_timer() {
        let f = fixture();
        f.overlays.open("t-1");
        assert_eq!(f.coordinator.offer("v-1", "t-1", scroll(80.0)).await, PopupDecision::Ignored);
        assert_eq!(
            f.coordinator
                .offer("v-1", "t-1", TriggerSignal::Dwell { elapsed_secs: 50 })
                .await,
            PopupDecision::Ignored
        );
        f.overlays.close("t-1");
        // Dwell is one-shot and does not retry.
        assert_eq!(
            f.coordinator
                .offer("v-1", "t-1", TriggerSignal::Dwell { elapsed_secs: 70 })
                .await,
            PopupDecision::Ignored
        );
        // Scroll stayed armed and wins on the next opportunity.
        assert_eq!(f.coordinator.offer("v-1", "t-1", scroll(80.0)).await, PopupDecision::Open);
    }

    #[tokio::test]
    async fn short_dwell_does_not_qualify() {
        let f = fixture();
        assert_eq!(
            f.coordinator
                .offer("v-1", "t-1", TriggerSignal::Dwell { elapsed_secs: 44 })
                .await,
            PopupDecision::Ignored
        );
        assert_eq!(
            f.coordinator
                .offer("v-1", "t-1", TriggerSignal::Dwell { elapsed_secs: 45 })
                .await,
            PopupDecision::Open
        );
    }

    #[tokio::test]
    async fn dialog_walks_signup_then_preferences() {
        let f = fixture();
        f.coordinator.offer("v-1", "t-1", exit_intent()).await;
        assert_eq!(f.coordinator.dialog_step("t-1"), Some(DialogStep::Signup));
        assert!(f.coordinator.advance_to_preferences("t-1"));
        assert_eq!(f.coordinator.dialog_step("t-1"), Some(DialogStep::Preferences));
        assert!(f.coordinator.complete("t-1"));
        assert_eq!(f.coordinator.dialog_step("t-1"), None);
        assert!(!f.coordinator.advance_to_preferences("t-1"));
    }

    #[tokio::test]
    async fn dismissal_reports_the_abandoned_step_without_reopening() {
        let f = fixture();
        f.coordinator.offer("v-1", "t-1", exit_intent()).await;
        assert_eq!(f.coordinator.dismiss("t-1"), Some(DialogStep::Signup));
        assert_eq!(f.coordinator.dismiss("t-1"), None);
        assert_eq!(
            f.coordinator.offer("v-1", "t-1", scroll(90.0)).await,
            PopupDecision::Suppressed
        );
    }
}
