//! partylink core: transport-agnostic session primitives, error types, and
//! the envelope wire format.
//!
//! This crate defines the domain model (participants, rooms) and the
//! wire-level contracts shared by the session runtime and any embedder. It
//! intentionally carries no transport or runtime dependencies so it can be
//! reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `PartyError`/`Result` so a session
//! process does not crash on malformed input from a peer.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod participant;
pub mod protocol;
pub mod room;

/// Shared result type.
pub use error::{PartyError, Result};
pub use participant::{Participant, ParticipantId, PresenceState, Role};
pub use room::RoomCode;
