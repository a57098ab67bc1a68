//! Room codes: the short human-typed address a host registers with the
//! rendezvous broker.
//!
//! Codes are 6 characters from `A-Z0-9` (36^6 addresses). Input is
//! case-insensitive (uppercased before validation); the stored form is
//! case-sensitive and is what gets registered/compared.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PartyError, Result};

/// Room code length in characters.
pub const ROOM_CODE_LEN: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A validated 6-character room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Parse user input. Uppercases first, then requires exactly 6
    /// characters from `A-Z0-9`.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.chars().count() != ROOM_CODE_LEN {
            return Err(PartyError::InvalidRoomCode(format!(
                "expected {ROOM_CODE_LEN} characters, got {:?}",
                raw.trim()
            )));
        }
        if !normalized.bytes().all(|b| ALPHABET.contains(&b)) {
            return Err(PartyError::InvalidRoomCode(format!(
                "room code must be A-Z0-9, got {normalized:?}"
            )));
        }
        Ok(Self(normalized))
    }

    /// Generate a fresh code, 6 characters drawn uniformly from the
    /// 36-character alphabet. Collisions are handled by the broker rejecting
    /// a taken address, not here.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code: String = (0..ROOM_CODE_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for RoomCode {
    type Err = PartyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
