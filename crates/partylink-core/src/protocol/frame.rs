//! Stream framing for envelope bytes (panic-free).
//!
//! Frame layout: `[version u8][len u32 LE][len bytes of payload]`.
//!
//! Parsing rules:
//! - Never index (`buf[0]`) — always check available length first.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.
//!
//! A decode error poisons the stream (there is no way to resynchronize a
//! byte stream after a bad header); callers close the link on `Err`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PartyError, Result};

/// Current wire protocol version.
pub const FRAME_VERSION: u8 = 1;

/// Hard protocol cap on frame payload size. Configured limits may be lower,
/// never higher.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

const HEADER_LEN: usize = 5;

/// Encode one payload into a framed buffer.
pub fn encode_frame(payload: &[u8], max_frame_bytes: usize) -> Result<Bytes> {
    let cap = max_frame_bytes.min(MAX_FRAME_BYTES);
    if payload.len() > cap {
        return Err(PartyError::BadRequest(format!(
            "frame payload {} bytes exceeds cap {cap}",
            payload.len()
        )));
    }
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(FRAME_VERSION);
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Incremental frame decoder over an arbitrary chunk stream.
///
/// Feed bytes with [`FrameDecoder::extend`], then drain complete frames
/// with [`FrameDecoder::next_frame`] until it yields `None`.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_bytes: max_frame_bytes.min(MAX_FRAME_BYTES),
        }
    }

    /// Append a chunk read from the stream.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete frame payload, if any.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buf.remaining() < HEADER_LEN {
            return Ok(None);
        }

        // Peek the header without consuming; the frame may still be partial.
        let mut header = &self.buf[..HEADER_LEN];
        let v = header.get_u8();
        if v != FRAME_VERSION {
            return Err(PartyError::UnsupportedVersion);
        }
        let len = header.get_u32_le() as usize;
        if len > self.max_frame_bytes {
            return Err(PartyError::BadRequest(format!(
                "frame length {len} exceeds cap {}",
                self.max_frame_bytes
            )));
        }

        if self.buf.remaining() < HEADER_LEN + len {
            return Ok(None);
        }

        self.buf.advance(HEADER_LEN);
        let payload = self.buf.split_to(len).freeze();
        Ok(Some(payload))
    }
}
