//! Protocol modules (envelope + stream framing).
//!
//! The envelope is the one format that must round-trip identically across
//! host and guests for independently reimplemented clients to interoperate.
//! Framing only matters on stream transports; datagram-shaped transports
//! carry whole envelopes natively.
//!
//! All parsers are panic-free: malformed input is reported as `PartyError`
//! instead of panicking or indexing raw buffers.

pub mod envelope;
pub mod frame;

pub use envelope::{now_millis, Envelope, EnvelopeKind};
pub use frame::{encode_frame, FrameDecoder, FRAME_VERSION, MAX_FRAME_BYTES};
