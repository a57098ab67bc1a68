//! Dispatch module exports.
//!
//! Re-exports the local pub-sub multiplexer so downstream consumers can
//! depend on this module directly.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, SessionEvent, Subscription};
