use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::validation::validate_room_code,
    error::CommandError,
    state::registry::{RoomDraft, RoomInfo},
};

/// Error code sent back when an inbound frame is rejected.
pub const INVALID_COMMAND: &str = "INVALID_COMMAND";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
/// Commands accepted from registry WebSocket clients.
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistryInboundMessage {
    /// Evict stale rooms and send the list back to the requester only.
    GetRooms,
    /// Advertise a room, replacing any room with the same code.
    RegisterRoom {
        /// Room to advertise.
        room: RoomDraft,
    },
    /// Heartbeat carrying the latest player count of a room.
    UpdateRoom {
        /// Code of the room being refreshed.
        code: String,
        /// Latest number of players.
        #[serde(rename = "playerCount")]
        player_count: u32,
    },
    /// Stop advertising a room.
    RemoveRoom {
        /// Code of the room to drop.
        code: String,
    },
    /// Drop every advertised room.
    ClearAllRooms,
}

impl RegistryInboundMessage {
    /// Parse a text frame and validate its fields before it reaches the registry.
    pub fn from_json_str(raw: &str) -> Result<Self, CommandError> {
        let message: Self = serde_json::from_str(raw)?;
        message.validate_fields()?;
        Ok(message)
    }

    fn validate_fields(&self) -> Result<(), CommandError> {
        match self {
            Self::RegisterRoom { room } => room.validate().map_err(Into::into),
            Self::UpdateRoom { code, .. } | Self::RemoveRoom { code } => {
                validate_room_code(code).map_err(|err| {
                    CommandError::invalid(
                        err.message
                            .map(|message| message.into_owned())
                            .unwrap_or_else(|| err.code.into_owned()),
                    )
                })
            }
            Self::GetRooms | Self::ClearAllRooms => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
/// Messages pushed to registry observers.
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistryOutboundMessage {
    /// Full set of live rooms, sent on connect, on `GET_ROOMS`, and after every change.
    RoomsList {
        /// Every live room.
        rooms: Vec<RoomInfo>,
    },
    /// Negative acknowledgement for a frame that was not admitted.
    Error {
        /// Machine readable error code, e.g. `INVALID_COMMAND`.
        code: String,
        /// Why the frame was rejected.
        message: String,
    },
}

impl RegistryOutboundMessage {
    /// Acknowledge a rejected frame.
    pub fn invalid_command(err: &CommandError) -> Self {
        Self::Error {
            code: INVALID_COMMAND.into(),
            message: err.to_string(),
        }
    }
}
