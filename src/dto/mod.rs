use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health endpoint payloads.
pub mod health;
/// REST request and response bodies for rooms.
pub mod rooms;
/// Server-sent event payloads.
pub mod sse;
/// Custom validators shared by DTOs.
pub mod validation;
/// WebSocket registry protocol.
pub mod ws;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Current time formatted as RFC 3339.
pub fn now_rfc3339() -> String {
    format_system_time(SystemTime::now())
}
