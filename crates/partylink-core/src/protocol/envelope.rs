//! Session envelope (JSON).
//!
//! Wire shape: `{ "type": tag, "data": <kind-dependent>, "from": id,
//! "timestamp": millis }`. `data` is stored as `RawValue` so the session
//! runtime relays envelopes without re-parsing payloads it does not care
//! about; only interested consumers pay the decode.
//!
//! Envelopes are immutable once sent. Ordering is per-link FIFO only; the
//! host's relayed stream is the single source of cross-peer order.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::{PartyError, Result};
use crate::participant::{Participant, ParticipantId};

/// Closed set of envelope tags, plus a passthrough for game-specific action
/// tags. Unknown tags round-trip verbatim; the session core routes by kind
/// and never interprets game payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// Guest announces itself to the host. Never relayed verbatim; the host
    /// answers with a full `RosterSnapshot` instead.
    Join,
    /// Voluntary departure. The participant is marked, not removed.
    Leave,
    /// Pre-game readiness flip.
    ReadyToggle,
    /// Full roster replacement broadcast by the host after every mutation.
    RosterSnapshot,
    GameStart,
    /// Last-writer-wins game-state blob.
    GameStateUpdate,
    TurnChange,
    Chat,
    EmojiReaction,
    /// Game-specific action tag, opaque to the core.
    Game(String),
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &str {
        match self {
            EnvelopeKind::Join => "join",
            EnvelopeKind::Leave => "leave",
            EnvelopeKind::ReadyToggle => "ready-toggle",
            EnvelopeKind::RosterSnapshot => "roster-snapshot",
            EnvelopeKind::GameStart => "game-start",
            EnvelopeKind::GameStateUpdate => "game-state-update",
            EnvelopeKind::TurnChange => "turn-change",
            EnvelopeKind::Chat => "chat",
            EnvelopeKind::EmojiReaction => "emoji-reaction",
            EnvelopeKind::Game(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "join" => EnvelopeKind::Join,
            "leave" => EnvelopeKind::Leave,
            "ready-toggle" => EnvelopeKind::ReadyToggle,
            "roster-snapshot" => EnvelopeKind::RosterSnapshot,
            "game-start" => EnvelopeKind::GameStart,
            "game-state-update" => EnvelopeKind::GameStateUpdate,
            "turn-change" => EnvelopeKind::TurnChange,
            "chat" => EnvelopeKind::Chat,
            "emoji-reaction" => EnvelopeKind::EmojiReaction,
            other => EnvelopeKind::Game(other.to_string()),
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EnvelopeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EnvelopeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(EnvelopeKind::from_tag(&tag))
    }
}

/// The unit of relay between session participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Discriminated tag (field name is `type` on the wire).
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Kind-dependent payload, stored as raw JSON (lazy parsing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
    /// Sender id.
    pub from: ParticipantId,
    /// Send timestamp, integer millis since the Unix epoch.
    pub timestamp: u64,
}

impl Envelope {
    /// Build an envelope with a serialized payload, stamped with the
    /// current time.
    pub fn new<T: Serialize>(kind: EnvelopeKind, from: ParticipantId, data: &T) -> Result<Self> {
        let raw = serde_json::value::to_raw_value(data)
            .map_err(|e| PartyError::BadRequest(format!("payload encode failed: {e}")))?;
        Ok(Self {
            kind,
            data: Some(raw),
            from,
            timestamp: now_millis(),
        })
    }

    /// Build a payload-less envelope.
    pub fn bare(kind: EnvelopeKind, from: ParticipantId) -> Self {
        Self {
            kind,
            data: None,
            from,
            timestamp: now_millis(),
        }
    }

    /// Parse the lazy payload into a typed body.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T> {
        let raw = self
            .data
            .as_ref()
            .ok_or_else(|| PartyError::BadRequest(format!("{} envelope missing data", self.kind)))?;
        serde_json::from_str(raw.get())
            .map_err(|e| PartyError::BadRequest(format!("{} payload invalid: {e}", self.kind)))
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let v = serde_json::to_vec(self)
            .map_err(|e| PartyError::BadRequest(format!("envelope encode failed: {e}")))?;
        Ok(Bytes::from(v))
    }

    /// Decode wire bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| PartyError::BadRequest(format!("invalid envelope json: {e}")))
    }
}

/// Millis since the Unix epoch, saturating at zero on a badly skewed clock.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// --------------------
// Typed payload bodies
// --------------------

/// `leave` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveBody {
    pub participant_id: ParticipantId,
    pub nickname: String,
}

/// `ready-toggle` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyBody {
    pub participant_id: ParticipantId,
    pub ready: bool,
}

/// `roster-snapshot` payload: the host's entire roster as an ordered list.
/// Receivers replace their whole mapping; never treat this as a patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterSnapshotBody {
    pub participants: Vec<Participant>,
}

/// `turn-change` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnBody {
    pub participant_id: ParticipantId,
}

/// `chat` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBody {
    pub nickname: String,
    pub text: String,
}

/// `emoji-reaction` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmojiBody {
    pub nickname: String,
    pub emoji: String,
}
