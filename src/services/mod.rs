/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Single-writer room registry actor.
pub mod registry_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Background storage probe driving degraded mode.
pub mod storage_monitor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
