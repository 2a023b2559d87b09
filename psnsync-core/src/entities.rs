//! Normalized records handed to the host.
//!
//! Every backend payload is parsed into one of these types at the transport
//! boundary; nothing above the client crate sees raw JSON.

use crate::identity::{CommunicationId, GameId, UnixTimestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// TROPHIES
// ============================================================================

/// Trophy-title metadata attached to a game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrophyTitleInfo {
    pub communication_id: CommunicationId,
    /// Backend display name of the trophy title. May be empty.
    pub display_name: String,
}

impl TrophyTitleInfo {
    pub fn new(communication_id: impl Into<CommunicationId>, display_name: impl Into<String>) -> Self {
        Self {
            communication_id: communication_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Per-title freshness entry from the trophy-titles listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrophyTitle {
    pub communication_id: CommunicationId,
    /// Last time the user's progress on this title changed.
    pub last_update_time: UnixTimestamp,
}

/// An earned trophy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Achievement {
    /// Scoped as `<communication_id>_<trophy_id>` so bundles never collide.
    pub achievement_id: String,
    pub achievement_name: String,
    pub unlock_time: UnixTimestamp,
}

impl Achievement {
    pub fn new(
        achievement_id: impl Into<String>,
        achievement_name: impl Into<String>,
        unlock_time: UnixTimestamp,
    ) -> Self {
        Self {
            achievement_id: achievement_id.into(),
            achievement_name: achievement_name.into(),
            unlock_time,
        }
    }

    /// Build the scoped achievement id for a trophy of a communication id.
    pub fn scoped_id(communication_id: &CommunicationId, trophy_id: &str) -> String {
        format!("{}_{}", communication_id, trophy_id)
    }
}

// ============================================================================
// LIBRARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedGame {
    pub game_id: GameId,
    pub game_title: String,
}

impl OwnedGame {
    pub fn new(game_id: impl Into<GameId>, game_title: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            game_title: game_title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameTime {
    pub game_id: GameId,
    pub time_played_minutes: u64,
    pub last_played: Option<UnixTimestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_name: String,
    pub owned: bool,
    pub end_time: Option<UnixTimestamp>,
}

// ============================================================================
// SOCIAL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendInfo {
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceState {
    Online,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    pub state: PresenceState,
    pub platform: Option<String>,
    pub last_online: Option<UnixTimestamp>,
}

impl UserPresence {
    pub fn unknown() -> Self {
        Self {
            state: PresenceState::Unknown,
            platform: None,
            last_online: None,
        }
    }
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Own account as reported by the profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub account_id: String,
    pub online_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub user_id: String,
    pub user_name: String,
}

impl From<UserInfo> for Authentication {
    fn from(info: UserInfo) -> Self {
        Self {
            user_id: info.account_id,
            user_name: info.online_id,
        }
    }
}

/// Descriptor of an interactive login the host has to drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStep {
    pub next_step: String,
    pub auth_params: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(Authentication),
    NextStep(NextStep),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_achievement_id() {
        let comm_id = CommunicationId::new("NPWR12784_00");
        assert_eq!(Achievement::scoped_id(&comm_id, "7"), "NPWR12784_00_7");
    }

    #[test]
    fn test_authentication_from_user_info() {
        let auth = Authentication::from(UserInfo {
            account_id: "42".to_string(),
            online_id: "player".to_string(),
        });
        assert_eq!(auth.user_id, "42");
        assert_eq!(auth.user_name, "player");
    }
}
