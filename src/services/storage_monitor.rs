use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::{dao::storage::StorageError, state::SharedState};

/// Delay between two background storage probes.
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Probe the storage backend forever, keeping the degraded flag in sync.
///
/// The registry keeps serving from memory while degraded; this only drives reporting.
pub async fn run(state: SharedState, poll_interval: Duration) {
    loop {
        check(&state).await;
        sleep(poll_interval).await;
    }
}

/// Run one probe and update the degraded flag. Returns whether storage is healthy.
pub async fn check(state: &SharedState) -> bool {
    let result = timeout(HEALTH_TIMEOUT, state.store().health_check())
        .await
        .unwrap_or(Err(StorageError::Timeout(HEALTH_TIMEOUT)));

    match result {
        Ok(()) => {
            if state.is_degraded() {
                info!("storage healthy again; leaving degraded mode");
                state.update_degraded(false);
            }
            true
        }
        Err(err) => {
            if !state.is_degraded() {
                warn!(error = %err, "storage health check failed; entering degraded mode");
                state.update_degraded(true);
            }
            false
        }
    }
}
