//! Transport adapter: the minimal capability surface the session core
//! needs from a peer-to-peer data channel.
//!
//! A transport knows how to `listen` under a room-code-shaped address
//! (registering with the rendezvous broker as a side effect) and to
//! `connect` to such an address. Everything after link establishment flows
//! through two primitives: a [`LinkSender`] for outbound envelopes and a
//! session-wide [`LinkEvent`] stream for inbound data and lifecycle — the
//! event-driven rendition of per-link data/open/close callbacks. No relay
//! or game logic lives here.

pub mod memory;
pub mod tcp;

use async_trait::async_trait;
use tokio::sync::mpsc;

use partylink_core::error::{PartyError, Result};
use partylink_core::participant::ParticipantId;
use partylink_core::protocol::envelope::Envelope;

pub use memory::{MemoryBroker, MemoryTransport};
pub use tcp::TcpTransport;

/// Sender half of the session's link-event stream.
pub type EventTx = mpsc::Sender<LinkEvent>;

/// Receiver half, consumed by the session manager's event loop.
pub type EventRx = mpsc::Receiver<LinkEvent>;

/// Depth of the session-wide link-event queue.
pub const EVENT_QUEUE: usize = 1024;

/// Lifecycle and data events for all links of one session, serialized onto
/// a single queue. Transports may emit duplicate `Closed` events for the
/// same peer (both directions of a link can observe the teardown); the
/// consumer treats removal as idempotent.
#[derive(Debug)]
pub enum LinkEvent {
    /// A new inbound link completed its open handshake (host side; the
    /// dialing side gets its sender from `connect` directly).
    Opened {
        peer: ParticipantId,
        sender: LinkSender,
    },
    /// One decoded envelope arrived on the link from `peer`.
    Data {
        peer: ParticipantId,
        envelope: Envelope,
    },
    /// The link to `peer` is gone (remote close, transport error, or local
    /// teardown).
    Closed { peer: ParticipantId },
}

/// Cloneable outbound handle for one link.
///
/// Dropping every clone closes the link; there is no separate close call.
#[derive(Debug, Clone)]
pub struct LinkSender {
    peer: ParticipantId,
    tx: mpsc::Sender<Envelope>,
}

impl LinkSender {
    pub fn new(peer: ParticipantId, tx: mpsc::Sender<Envelope>) -> Self {
        Self { peer, tx }
    }

    /// Remote peer's transport id.
    pub fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    /// Queue one envelope for delivery. Fails with `LinkClosed` once the
    /// peer has hung up.
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| PartyError::LinkClosed)
    }
}

/// Live listener registration. Dropping it stops accepting links and
/// releases the address at the broker; links already established survive.
pub trait Listener: Send + Sync {
    /// The address (room code) this listener is registered under.
    fn address(&self) -> &str;
}

/// The peer-to-peer transport seam.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Register `address` with the rendezvous broker and start accepting
    /// links. Each accepted link surfaces as `LinkEvent::Opened` on
    /// `events`. Fails with `RoomCodeCollision` when the address is taken
    /// and `ConnectFailure` when the broker cannot be reached.
    async fn listen(&self, address: &str, events: EventTx) -> Result<Box<dyn Listener>>;

    /// Resolve `address` via the broker and open a link to it, announcing
    /// `local_id` as this side's transport identity. Inbound traffic for
    /// the new link flows to `events`; the returned sender is the outbound
    /// half.
    async fn connect(
        &self,
        address: &str,
        local_id: &ParticipantId,
        events: EventTx,
    ) -> Result<LinkSender>;
}
