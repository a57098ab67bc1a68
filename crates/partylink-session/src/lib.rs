//! partylink session runtime.
//!
//! This crate wires the transport adapters, the session manager state
//! machine, roster tracking, and the dispatch/application bridge into the
//! peer core a game UI consumes. It is intended to be embedded by game
//! frontends and by integration tests; it exposes no network service of its
//! own beyond the peer links themselves.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod roster;
pub mod session;
pub mod transport;

pub use client::{ChatEntry, ChatKind, EmojiReaction, PartyClient};
pub use dispatch::{Dispatcher, SessionEvent, Subscription};
pub use roster::RosterTracker;
pub use session::{SessionManager, SessionPhase};
