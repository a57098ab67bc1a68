//! Shared error type across partylink crates.

use thiserror::Error;

use crate::participant::Role;

/// User-facing error codes (stable API).
///
/// Embedders key retry/re-entry UI off these codes rather than matching on
/// display strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCode {
    /// Rendezvous broker unreachable or address invalid.
    ConnectFailed,
    /// Peer did not complete the open handshake in time.
    LinkTimeout,
    /// Send attempted on a dead link.
    LinkClosed,
    /// Host-side: room code already registered with the broker.
    RoomCodeTaken,
    /// Could not create the room (host-side initialization).
    CreateFailed,
    /// Could not join the given room code (guest-side initialization).
    JoinFailed,
    /// Malformed input: envelope, frame, or config.
    BadRequest,
    /// Unsupported wire protocol version.
    UnsupportedVersion,
    /// Invalid caller input (nickname, room code, turn target).
    BadInput,
    /// Operation requires the host role.
    HostOnly,
    /// Operation on a session that is already closed.
    Closed,
    /// Internal error.
    Internal,
}

impl UserCode {
    /// String representation used in logs and UI plumbing.
    pub fn as_str(self) -> &'static str {
        match self {
            UserCode::ConnectFailed => "CONNECT_FAILED",
            UserCode::LinkTimeout => "LINK_TIMEOUT",
            UserCode::LinkClosed => "LINK_CLOSED",
            UserCode::RoomCodeTaken => "ROOM_CODE_TAKEN",
            UserCode::CreateFailed => "CREATE_FAILED",
            UserCode::JoinFailed => "JOIN_FAILED",
            UserCode::BadRequest => "BAD_REQUEST",
            UserCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            UserCode::BadInput => "BAD_INPUT",
            UserCode::HostOnly => "HOST_ONLY",
            UserCode::Closed => "CLOSED",
            UserCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PartyError>;

/// Unified error type used by core and the session runtime.
#[derive(Debug, Error)]
pub enum PartyError {
    /// Broker unreachable, address invalid, or dial refused.
    #[error("connect failed: {0}")]
    ConnectFailure(String),
    /// Peer did not complete the open handshake in time.
    #[error("link open timed out")]
    LinkTimeout,
    /// Send attempted on a link that is no longer open. Recovered locally by
    /// skipping that peer; never fatal to the session.
    #[error("link closed")]
    LinkClosed,
    /// Host-side: the room code is already registered with the broker.
    #[error("room code already taken")]
    RoomCodeCollision,
    /// Initialization failure wrapping the underlying cause. The session
    /// ends `Closed`; callers must not retry on the same instance.
    #[error("session init failed as {role}: {source}")]
    SessionInit {
        role: Role,
        #[source]
        source: Box<PartyError>,
    },
    /// Malformed input: envelope, frame, or config.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Frame carried an unsupported wire protocol version.
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    /// Nickname failed validation (1-20 characters).
    #[error("invalid nickname: {0}")]
    InvalidNickname(String),
    /// Room code failed validation (6 characters, A-Z0-9).
    #[error("invalid room code: {0}")]
    InvalidRoomCode(String),
    /// Turn handoff or targeted send named an id absent from the roster.
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),
    /// Operation requires the host role.
    #[error("operation requires the host role")]
    HostOnly,
    /// Operation on a session that is already closed.
    #[error("session closed")]
    Closed,
    #[error("internal: {0}")]
    Internal(String),
}

impl PartyError {
    /// Wrap an initialization failure for the given role.
    pub fn init(role: Role, source: PartyError) -> Self {
        PartyError::SessionInit {
            role,
            source: Box::new(source),
        }
    }

    /// Map internal error to a stable user-facing code.
    pub fn user_code(&self) -> UserCode {
        match self {
            PartyError::ConnectFailure(_) => UserCode::ConnectFailed,
            PartyError::LinkTimeout => UserCode::LinkTimeout,
            PartyError::LinkClosed => UserCode::LinkClosed,
            PartyError::RoomCodeCollision => UserCode::RoomCodeTaken,
            PartyError::SessionInit { role: Role::Host, .. } => UserCode::CreateFailed,
            PartyError::SessionInit { role: Role::Guest, .. } => UserCode::JoinFailed,
            PartyError::BadRequest(_) => UserCode::BadRequest,
            PartyError::UnsupportedVersion => UserCode::UnsupportedVersion,
            PartyError::InvalidNickname(_) | PartyError::InvalidRoomCode(_) => UserCode::BadInput,
            PartyError::UnknownParticipant(_) => UserCode::BadInput,
            PartyError::HostOnly => UserCode::HostOnly,
            PartyError::Closed => UserCode::Closed,
            PartyError::Internal(_) => UserCode::Internal,
        }
    }

    /// Human-readable message for initialization failures.
    ///
    /// Joining with a mistyped room code is the dominant user mistake, so it
    /// gets its own wording prompting re-entry instead of a blind retry.
    pub fn user_message(&self) -> String {
        match self {
            PartyError::SessionInit { role: Role::Host, source } => {
                format!("Could not create the room: {source}. Try again in a moment.")
            }
            PartyError::SessionInit { role: Role::Guest, source } => {
                format!("Could not join the room: {source}. Check the room code and try again.")
            }
            other => other.to_string(),
        }
    }
}
