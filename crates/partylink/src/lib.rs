//! Top-level facade crate for partylink.
//!
//! Re-exports the core types and the session runtime so users can depend on a single crate.

pub mod core {
    pub use partylink_core::*;
}

pub mod session {
    pub use partylink_session::*;
}
