use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};

use crate::AppState;

// Visits idle this long are considered abandoned tabs.
const VISIT_MAX_IDLE: Duration = Duration::from_secs(30 * 60);

pub async fn start_scheduler(state: Arc<AppState>) {
    let scheduler = match JobScheduler::new().await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!("Failed to create job scheduler: {}", e);
            return;
        }
    };

    let cache_state = state.clone();
    let cache_sweep = Job::new_async("0 */5 * * * *", move |_uuid, _lock| {
        let state = cache_state.clone();
        Box::pin(async move {
            let evicted = state.query_cache.evict_idle();
            if evicted > 0 {
                tracing::debug!("Evicted {} idle cache entries", evicted);
            }
        })
    });
    match cache_sweep {
        Ok(job) => {
            if let Err(e) = scheduler.add(job).await {
                tracing::error!("Failed to schedule cache sweep: {}", e);
            }
        }
        Err(e) => tracing::error!("Failed to create cache sweep job: {}", e),
    }

    let visits_state = state.clone();
    let visit_purge = Job::new_async("0 */10 * * * *", move |_uuid, _lock| {
        let state = visits_state.clone();
        Box::pin(async move {
            let expired = state.visits.purge_idle(VISIT_MAX_IDLE);
            for visit_id in &expired {
                state.popup.forget(visit_id);
                state.overlays.forget(visit_id);
            }
            if !expired.is_empty() {
                tracing::debug!("Purged {} idle visits", expired.len());
            }
        })
    });
    match visit_purge {
        Ok(job) => {
            if let Err(e) = scheduler.add(job).await {
                tracing::error!("Failed to schedule visit purge: {}", e);
            }
        }
        Err(e) => tracing::error!("Failed to create visit purge job: {}", e),
    }

    if let Err(e) = scheduler.start().await {
        tracing::error!("Failed to start job scheduler: {}", e);
    }
}
