use dotenvy::dotenv;
use axum::{
    routing::{get, post},
    Router,
};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dashmap::DashMap;
use governor::{RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use tower_http::cors::{CorsLayer, AllowOrigin};
use tower_http::trace::{TraceLayer, DefaultMakeSpan, DefaultOnResponse};
use tracing::Level;
use std::sync::Arc;
use sentry;
mod handlers {
    pub mod visitor_context;
    pub mod content_handlers;
    pub mod lead_handlers;
    pub mod consent_handlers;
    pub mod popup_handlers;
    pub mod session_handlers;
    pub mod sitemap_handlers;
}
mod services {
    pub mod analytics;
    pub mod consent;
    pub mod overlay;
    pub mod popup;
    pub mod query_cache;
    pub mod settings;
    pub mod visits;
}
mod utils {
    pub mod embeds;
    pub mod mailer;
    pub mod optimistic;
}
mod error;
mod models {
    pub mod site_models;
}
mod repositories {
    pub mod content_repository;
    pub mod lead_repository;
}
mod schema;
mod jobs {
    pub mod scheduler;
}
#[cfg(test)]
mod test_support;
use repositories::content_repository::ContentRepository;
use repositories::lead_repository::LeadRepository;
use services::analytics::AnalyticsDispatcher;
use services::consent::ConsentService;
use services::overlay::OverlayStack;
use services::popup::PopupCoordinator;
use services::query_cache::QueryCache;
use services::settings::{DbSettingsStorage, SettingsService};
use services::visits::VisitRegistry;
use utils::mailer::Mailer;
use handlers::{
    consent_handlers, content_handlers, lead_handlers, popup_handlers,
    session_handlers, sitemap_handlers,
};
pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
async fn health_check() -> &'static str {
    "OK"
}
type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;
pub struct AppState {
    content_repository: Arc<ContentRepository>,
    lead_repository: Arc<LeadRepository>,
    settings: Arc<SettingsService>,
    consent: Arc<ConsentService>,
    popup: Arc<PopupCoordinator>,
    overlays: Arc<OverlayStack>,
    visits: Arc<VisitRegistry>,
    query_cache: Arc<QueryCache>,
    analytics: Arc<AnalyticsDispatcher>,
    mailer: Arc<Mailer>,
    lead_limiter: DashMap<String, KeyedLimiter>,
    signal_limiter: DashMap<String, KeyedLimiter>,
}
pub fn validate_env() {
    let required_vars = ["DATABASE_URL", "FRONTEND_URL", "SITE_URL"];
    for var in required_vars.iter() {
        std::env::var(var).expect(&format!("{} must be set", var));
    }
}
/// Prefetch the landing-page content so the first visitor after a deploy is
/// not the one paying for the cold queries. The two fetches run concurrently
/// and a failure in one does not cancel the other.
async fn warm_content_cache(state: Arc<AppState>) {
    let featured_repo = state.content_repository.clone();
    let areas_repo = state.content_repository.clone();
    let featured = state.query_cache.get_or_fetch("featured-properties", move || {
        let repo = featured_repo.clone();
        async move { repo.featured_properties().map_err(error::ServiceError::from) }
    });
    let areas = state.query_cache.get_or_fetch("enabled-areas", move || {
        let repo = areas_repo.clone();
        async move { repo.enabled_areas().map_err(error::ServiceError::from) }
    });
    let (featured, areas) = futures::join!(featured, areas);
    tracing::info!(
        "Warmed content cache: {} featured properties, {} areas",
        featured.len(),
        areas.len()
    );
}
#[tokio::main]
async fn main() {
    dotenv().ok();
    let _guard = sentry::init((std::env::var("SENTRY_DSN").unwrap_or_default(), sentry::ClientOptions {
        release: sentry::release_name!(),
        ..Default::default()
    }));
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,harborview_backend=debug"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set in environment");
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .build(manager)
        .expect("Failed to create pool");
    {
        let mut conn = pool.get().expect("Failed to get DB connection");
        conn.run_pending_migrations(MIGRATIONS)
            .expect("Failed to run migrations");
    }
    let content_repository = Arc::new(ContentRepository::new(pool.clone()));
    let lead_repository = Arc::new(LeadRepository::new(pool.clone()));
    let settings = Arc::new(SettingsService::new(Arc::new(DbSettingsStorage::new(pool.clone()))));
    let overlays = Arc::new(OverlayStack::new());
    let visits = Arc::new(VisitRegistry::new());
    let analytics = Arc::new(AnalyticsDispatcher::from_env(settings.clone()));
    let consent = Arc::new(ConsentService::new(settings.clone(), analytics.clone(), visits.clone()));
    let popup = PopupCoordinator::new(settings.clone(), overlays.clone(), analytics.clone());
    let mailer = Arc::new(Mailer::from_env());
    let state = Arc::new(AppState {
        content_repository,
        lead_repository,
        settings,
        consent,
        popup,
        overlays,
        visits,
        query_cache: Arc::new(QueryCache::new()),
        analytics,
        mailer,
        lead_limiter: DashMap::new(),
        signal_limiter: DashMap::new(),
    });
    // Public catalogue and content routes
    let content_routes = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/properties", get(content_handlers::get_properties))
        .route("/api/properties/{slug}", get(content_handlers::get_property))
        .route("/api/areas", get(content_handlers::get_areas))
        .route("/api/blog", get(content_handlers::get_blog_posts))
        .route("/api/blog/{slug}", get(content_handlers::get_blog_post))
        .route("/api/testimonials", get(content_handlers::get_testimonials))
        .route("/sitemap.xml", get(sitemap_handlers::sitemap));
    // Lead capture surfaces. there's ratelimiting inside the handlers
    let lead_routes = Router::new()
        .route("/api/leads", post(lead_handlers::submit_contact_form))
        .route("/api/leads/draft", get(lead_handlers::get_contact_draft))
        .route("/api/newsletter", post(lead_handlers::subscribe_newsletter));
    let consent_routes = Router::new()
        .route("/api/consent", get(consent_handlers::get_consent))
        .route("/api/consent/accept-all", post(consent_handlers::accept_all))
        .route("/api/consent/reject-all", post(consent_handlers::reject_all))
        .route("/api/consent/preferences", post(consent_handlers::save_preferences))
        .route("/api/consent/settings/open", post(consent_handlers::open_settings))
        .route("/api/consent/settings/close", post(consent_handlers::close_settings));
    let popup_routes = Router::new()
        .route("/api/popup/signal", post(popup_handlers::post_signal))
        .route("/api/popup/state", get(popup_handlers::get_popup_state))
        .route("/api/popup/signup", post(popup_handlers::submit_signup))
        .route("/api/popup/preferences", post(popup_handlers::submit_preferences))
        .route("/api/popup/dismiss", post(popup_handlers::dismiss_dialog));
    let session_routes = Router::new()
        .route("/api/session/start", post(session_handlers::start_session))
        .route("/api/overlay/open", post(session_handlers::open_overlay))
        .route("/api/overlay/close", post(session_handlers::close_overlay))
        .route("/api/events", post(session_handlers::track_event));
    let app = Router::new()
        .merge(content_routes)
        .merge(lead_routes)
        .merge(consent_routes)
        .merge(popup_routes)
        .merge(session_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
        )
        .layer(
            CorsLayer::new()
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::OPTIONS])
                .allow_origin(AllowOrigin::exact(std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()).parse().expect("Invalid FRONTEND_URL")))
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::ACCEPT,
                    axum::http::header::ORIGIN,
                    axum::http::HeaderName::from_static("x-visitor-id"),
                    axum::http::HeaderName::from_static("x-visit-id"),
                ])
                .allow_credentials(true)
        )
        .with_state(state.clone());
    let state_for_scheduler = state.clone();
    tokio::spawn(async move {
        jobs::scheduler::start_scheduler(state_for_scheduler).await;
    });
    let state_for_warmup = state.clone();
    tokio::spawn(async move {
        warm_content_cache(state_for_warmup).await;
    });
    use tokio::net::TcpListener;
    let port = match std::env::var("ENVIRONMENT").as_deref() {
        Ok("staging") => 3100,
        _ => 3000,
    };
    validate_env();
    tracing::info!("Starting server on port {}", port);
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await.unwrap();
    axum::serve(listener, app.into_make_service()).await.unwrap();
}
