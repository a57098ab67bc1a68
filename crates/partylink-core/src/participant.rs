//! Participant identity and presence model.
//!
//! A participant's id is the opaque transport-assigned identifier; for the
//! host it equals the room code the room is registered under. Identity
//! equality is by id; nicknames are display-only and not unique.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PartyError, Result};

/// Maximum nickname length in characters.
pub const MAX_NICKNAME_CHARS: usize = 20;

/// Opaque transport-assigned participant identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Session role. Exactly one participant per room holds `Host`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Host => "host",
            Role::Guest => "guest",
        })
    }
}

/// Link-level presence. Disconnected participants are marked, not removed,
/// so chat history and scoreboards stay coherent for the session lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Disconnected,
}

/// One entry in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub nickname: String,
    pub role: Role,
    pub ready: bool,
    pub presence: PresenceState,
}

impl Participant {
    /// The host is always ready; readiness gating only applies to guests.
    pub fn host(id: ParticipantId, nickname: String) -> Self {
        Self {
            id,
            nickname,
            role: Role::Host,
            ready: true,
            presence: PresenceState::Online,
        }
    }

    pub fn guest(id: ParticipantId, nickname: String) -> Self {
        Self {
            id,
            nickname,
            role: Role::Guest,
            ready: false,
            presence: PresenceState::Online,
        }
    }

    pub fn is_online(&self) -> bool {
        self.presence == PresenceState::Online
    }
}

/// Validate and normalize a nickname: trimmed, 1..=20 characters.
pub fn validate_nickname(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let chars = trimmed.chars().count();
    if chars == 0 {
        return Err(PartyError::InvalidNickname("nickname is empty".into()));
    }
    if chars > MAX_NICKNAME_CHARS {
        return Err(PartyError::InvalidNickname(format!(
            "nickname exceeds {MAX_NICKNAME_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}
