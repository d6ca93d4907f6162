use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/rooms",
    tag = "sse",
    responses((status = 200, description = "Room list SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream the room list, starting with the current one and then after every change.
pub async fn rooms_stream(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let (initial, receiver) = sse_service::subscribe_rooms(&state).await?;
    info!("New rooms SSE connection");
    Ok(sse_service::to_sse_stream(initial, receiver))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/rooms", get(rooms_stream))
}
