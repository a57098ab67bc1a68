use std::time::Duration;

use serde::Deserialize;

use partylink_core::error::{PartyError, Result};
use partylink_core::protocol::frame::MAX_FRAME_BYTES;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub version: u32,

    #[serde(default)]
    pub broker: BrokerSection,

    #[serde(default)]
    pub limits: LimitSection,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PartyError::UnsupportedVersion);
        }
        self.broker.validate()?;
        self.limits.validate()?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.connect_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.open_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: 1,
            broker: BrokerSection::default(),
            limits: LimitSection::default(),
        }
    }
}

/// Rendezvous broker settings. Which broker address to use (local/dev vs.
/// public) is the embedder's deployment concern; the session only dials
/// whatever it is given.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    #[serde(default = "default_broker_addr")]
    pub addr: String,

    /// Local bind address for the host's listening socket.
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            addr: default_broker_addr(),
            bind: default_bind(),
            connect_timeout_ms: default_connect_timeout_ms(),
            open_timeout_ms: default_open_timeout_ms(),
        }
    }
}

impl BrokerSection {
    pub fn validate(&self) -> Result<()> {
        if !(1_000..=60_000).contains(&self.connect_timeout_ms) {
            return Err(PartyError::BadRequest(
                "broker.connect_timeout_ms must be between 1000 and 60000".into(),
            ));
        }
        if !(1_000..=60_000).contains(&self.open_timeout_ms) {
            return Err(PartyError::BadRequest(
                "broker.open_timeout_ms must be between 1000 and 60000".into(),
            ));
        }
        Ok(())
    }
}

fn default_broker_addr() -> String {
    "127.0.0.1:9000".into()
}
fn default_bind() -> String {
    "0.0.0.0:0".into()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_open_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitSection {
    /// Per-link outbound queue depth.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for LimitSection {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl LimitSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=65_536).contains(&self.outbound_queue) {
            return Err(PartyError::BadRequest(
                "limits.outbound_queue must be between 1 and 65536".into(),
            ));
        }
        if !(1_024..=MAX_FRAME_BYTES).contains(&self.max_frame_bytes) {
            return Err(PartyError::BadRequest(format!(
                "limits.max_frame_bytes must be between 1024 and {MAX_FRAME_BYTES}"
            )));
        }
        Ok(())
    }
}

fn default_outbound_queue() -> usize {
    256
}
fn default_max_frame_bytes() -> usize {
    MAX_FRAME_BYTES
}
