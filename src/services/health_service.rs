use tracing::warn;

use crate::{
    dto::{health::HealthResponse, now_rfc3339},
    services::storage_monitor,
    state::SharedState,
};

/// Probe storage, then report the registry and observer counters.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    storage_monitor::check(state).await;

    let (rooms, persist_failures) = match state.registry().stats().await {
        Ok(stats) => (stats.rooms, stats.persist_failures),
        Err(err) => {
            warn!(error = %err, "room registry did not answer health check");
            (0, 0)
        }
    };

    let status = if state.is_degraded() {
        HealthResponse::DEGRADED
    } else {
        HealthResponse::OK
    };

    HealthResponse {
        status: status.to_string(),
        rooms,
        observers: state.observers().len(),
        storage: state.store().backend().to_string(),
        persist_failures,
        checked_at: now_rfc3339(),
    }
}
