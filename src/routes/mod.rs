use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// `/healthcheck`.
pub mod health;
/// `/rooms` REST endpoints.
pub mod rooms;
/// `/sse/rooms`.
pub mod sse;
/// `/ws`.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(rooms::router())
        .merge(sse::router())
        .merge(websocket::router())
        .merge(docs_router())
        .with_state(state)
}

/// Swagger UI at `/docs`, backed by the generated OpenAPI document.
fn docs_router() -> Router<SharedState> {
    SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", ApiDoc::openapi())
        .into()
}
