use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Live rooms currently held in memory.
    pub rooms: usize,
    /// Connected WebSocket observers.
    pub observers: usize,
    /// Name of the storage backend.
    pub storage: String,
    /// Persistence writes that failed since startup.
    pub persist_failures: u64,
    /// RFC 3339 timestamp of this check.
    pub checked_at: String,
}

impl HealthResponse {
    /// Status string for an operational backend.
    pub const OK: &'static str = "ok";
    /// Status string when the storage backend is unreachable.
    pub const DEGRADED: &'static str = "degraded";
}
