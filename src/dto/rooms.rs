use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::registry::RoomInfo;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Live rooms returned by `GET /rooms`.
pub struct RoomsResponse {
    /// Rooms still live after the eviction pass.
    pub rooms: Vec<RoomInfo>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Body of `PATCH /rooms/{code}`.
pub struct UpdateRoomRequest {
    /// Latest number of players in the room.
    pub player_count: u32,
}
