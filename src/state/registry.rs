//! In-memory room registry: the set of advertised rooms and the rules for mutating it.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{dto::validation::validate_room_code, state::clock::Millis};

/// Fields a host supplies when advertising a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomDraft {
    /// Short join code, unique among live rooms.
    #[validate(custom(function = "validate_room_code"))]
    pub code: String,
    /// Display name of the hosting player.
    #[validate(length(min = 1, max = 64))]
    pub host: String,
    /// Name of the character the players are matched with.
    #[serde(alias = "daterName")]
    #[validate(length(min = 1, max = 64))]
    pub subject_name: String,
    /// Number of players currently in the room.
    pub player_count: u32,
}

/// A live, joinable room as advertised to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    /// Short join code, unique among live rooms.
    pub code: String,
    /// Display name of the hosting player.
    pub host: String,
    /// Name of the character the players are matched with.
    #[serde(alias = "daterName")]
    pub subject_name: String,
    /// Number of players currently in the room.
    pub player_count: u32,
    /// Registration time, milliseconds since the Unix epoch.
    pub created_at: Millis,
    /// Time of the last register or update, milliseconds since the Unix epoch.
    pub last_update: Millis,
}

impl RoomInfo {
    fn from_draft(draft: RoomDraft, now: Millis) -> Self {
        Self {
            code: draft.code,
            host: draft.host,
            subject_name: draft.subject_name,
            player_count: draft.player_count,
            created_at: now,
            last_update: now,
        }
    }

    /// Whether the room went without updates for longer than `threshold` at `now`.
    pub fn is_stale(&self, now: Millis, threshold: Duration) -> bool {
        let threshold_ms = Millis::try_from(threshold.as_millis()).unwrap_or(Millis::MAX);
        now.saturating_sub(self.last_update) > threshold_ms
    }
}

/// Every advertised room keyed by code. This is the unit of persistence and of broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    rooms: IndexMap<String, RoomInfo>,
}

impl RegistryState {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a persisted snapshot.
    pub fn from_blob(blob: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(blob)
    }

    /// Encode the whole registry for persistence.
    pub fn to_blob(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Insert or overwrite the room for `draft.code`.
    ///
    /// Re-registering a code resets `created_at`: the old room is replaced, not refreshed.
    pub fn register(&mut self, draft: RoomDraft, now: Millis) -> RoomInfo {
        let room = RoomInfo::from_draft(draft, now);
        self.rooms.insert(room.code.clone(), room.clone());
        room
    }

    /// Set the player count of an existing room and bump its `last_update`.
    ///
    /// Returns `None` when the code is unknown; the registry is left untouched.
    pub fn update_player_count(
        &mut self,
        code: &str,
        player_count: u32,
        now: Millis,
    ) -> Option<RoomInfo> {
        let room = self.rooms.get_mut(code)?;
        room.player_count = player_count;
        room.last_update = room.last_update.max(now);
        Some(room.clone())
    }

    /// Drop a room, returning it if it existed.
    pub fn remove(&mut self, code: &str) -> Option<RoomInfo> {
        self.rooms.shift_remove(code)
    }

    /// Drop every room, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.rooms.len();
        self.rooms.clear();
        removed
    }

    /// Remove every room that is stale at `now`, returning how many were evicted.
    pub fn evict_stale(&mut self, now: Millis, threshold: Duration) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, room| !room.is_stale(now, threshold));
        before - self.rooms.len()
    }

    /// Look a room up by code.
    pub fn get(&self, code: &str) -> Option<&RoomInfo> {
        self.rooms.get(code)
    }

    /// Current rooms as a list, the shape sent to observers.
    pub fn rooms(&self) -> Vec<RoomInfo> {
        self.rooms.values().cloned().collect()
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no room is advertised.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
