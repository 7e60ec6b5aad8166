use std::sync::Arc;

use dashmap::DashMap;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::MigrationHarness;

use crate::handlers::visitor_context::VisitorContext;
use crate::repositories::content_repository::ContentRepository;
use crate::repositories::lead_repository::LeadRepository;
use crate::services::analytics::AnalyticsDispatcher;
use crate::services::consent::ConsentService;
use crate::services::overlay::OverlayStack;
use crate::services::popup::PopupCoordinator;
use crate::services::query_cache::QueryCache;
use crate::services::settings::{DbSettingsStorage, SettingsService};
use crate::services::visits::VisitRegistry;
use crate::utils::mailer::Mailer;
use crate::{AppState, DbPool, MIGRATIONS};

pub fn test_pool() -> DbPool {
    let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create pool");
    let mut conn = pool.get().unwrap();
    conn.run_pending_migrations(MIGRATIONS).unwrap();
    drop(conn);
    pool
}

/// Full application state over an in-memory database, for handler-level
/// tests.
pub fn test_state() -> Arc<AppState> {
    test_state_with_pool().0
}

/// Same, but hands the pool back so a test can sabotage the database.
pub fn test_state_with_pool() -> (Arc<AppState>, DbPool) {
    let pool = test_pool();
    let settings = Arc::new(SettingsService::new(Arc::new(DbSettingsStorage::new(
        pool.clone(),
    ))));
    let overlays = Arc::new(OverlayStack::new());
    let visits = Arc::new(VisitRegistry::new());
    let analytics = Arc::new(AnalyticsDispatcher::disabled(settings.clone()));
    let consent = Arc::new(ConsentService::new(
        settings.clone(),
        analytics.clone(),
        visits.clone(),
    ));
    let popup = PopupCoordinator::new(settings.clone(), overlays.clone(), analytics.clone());
    let state = Arc::new(AppState {
        content_repository: Arc::new(ContentRepository::new(pool.clone())),
        lead_repository: Arc::new(LeadRepository::new(pool.clone())),
        settings,
        consent,
        popup,
        overlays,
        visits,
        query_cache: Arc::new(QueryCache::new()),
        analytics,
        mailer: Arc::new(Mailer::disabled()),
        lead_limiter: DashMap::new(),
        signal_limiter: DashMap::new(),
    });
    (state, pool)
}

pub fn test_context(visitor_id: &str, visit_id: &str) -> VisitorContext {
    VisitorContext {
        visitor_id: visitor_id.to_string(),
        visit_id: visit_id.to_string(),
    }
}
