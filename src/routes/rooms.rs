use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
};
use axum_valid::Valid;

use crate::{
    dto::{
        rooms::{RoomsResponse, UpdateRoomRequest},
        validation::validate_room_code,
    },
    error::{AppError, ServiceError},
    state::{
        SharedState,
        registry::{RoomDraft, RoomInfo},
    },
};

/// REST mirror of the WebSocket registry commands.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/rooms",
            get(list_rooms).post(register_room).delete(clear_rooms),
        )
        .route("/rooms/{code}", patch(update_room).delete(remove_room))
}

fn check_code(code: &str) -> Result<(), AppError> {
    validate_room_code(code).map_err(|err| AppError::BadRequest(err.to_string()))
}

#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    responses((status = 200, description = "Live rooms after evicting stale ones", body = RoomsResponse))
)]
/// Evict stale rooms and list the live ones.
pub async fn list_rooms(State(state): State<SharedState>) -> Result<Json<RoomsResponse>, AppError> {
    let rooms = state.registry().get_rooms().await?;
    Ok(Json(RoomsResponse { rooms }))
}

#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = RoomDraft,
    responses(
        (status = 201, description = "Room advertised", body = RoomInfo),
        (status = 400, description = "Invalid room draft")
    )
)]
/// Advertise a room, replacing any room with the same code.
pub async fn register_room(
    State(state): State<SharedState>,
    Valid(Json(draft)): Valid<Json<RoomDraft>>,
) -> Result<(StatusCode, Json<RoomInfo>), AppError> {
    let room = state.registry().register_room(draft).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

#[utoipa::path(
    patch,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    request_body = UpdateRoomRequest,
    responses(
        (status = 200, description = "Room updated", body = RoomInfo),
        (status = 404, description = "No room with this code")
    )
)]
/// Record the latest player count of a room.
pub async fn update_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<UpdateRoomRequest>,
) -> Result<Json<RoomInfo>, AppError> {
    check_code(&code)?;
    let updated = state
        .registry()
        .update_room(code.clone(), payload.player_count)
        .await?;
    updated
        .map(Json)
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}`")).into())
}

#[utoipa::path(
    delete,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    responses((status = 204, description = "Room no longer advertised"))
)]
/// Stop advertising a room. Unknown codes are accepted.
pub async fn remove_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<StatusCode, AppError> {
    check_code(&code)?;
    state.registry().remove_room(code).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/rooms",
    tag = "rooms",
    responses((status = 204, description = "Every room removed"))
)]
/// Drop every advertised room.
pub async fn clear_rooms(State(state): State<SharedState>) -> Result<StatusCode, AppError> {
    state.registry().clear_all_rooms().await?;
    Ok(StatusCode::NO_CONTENT)
}
