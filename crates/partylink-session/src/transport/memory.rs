//! In-process transport for tests and local simulation.
//!
//! A [`MemoryBroker`] plays the rendezvous service: listeners register a
//! room-code address in a shared registry, dialers resolve it there, and a
//! taken address is rejected exactly like the real broker rejects it. Links
//! are paired channels with a pump task per direction; each pump emits
//! `Closed` to both sides on teardown, which the session manager absorbs
//! idempotently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use partylink_core::error::{PartyError, Result};
use partylink_core::participant::ParticipantId;
use partylink_core::protocol::envelope::Envelope;

use super::{EventTx, LinkEvent, LinkSender, Listener, Transport};

const DEFAULT_LINK_QUEUE: usize = 256;
const DIAL_QUEUE: usize = 16;

struct DialRequest {
    peer: ParticipantId,
    dialer_events: EventTx,
    reply: oneshot::Sender<LinkSender>,
}

/// Shared in-process rendezvous registry.
pub struct MemoryBroker {
    listeners: DashMap<String, mpsc::Sender<DialRequest>>,
    unreachable: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: DashMap::new(),
            unreachable: AtomicBool::new(false),
        })
    }

    /// Simulate the broker being unreachable: listen/connect calls hang
    /// until the caller's own deadline fires.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Relaxed);
    }

    pub fn is_registered(&self, address: &str) -> bool {
        self.listeners.contains_key(address)
    }

    pub fn registration_count(&self) -> usize {
        self.listeners.len()
    }

    fn release(&self, address: &str) {
        self.listeners.remove(address);
    }
}

/// Transport over a shared [`MemoryBroker`].
pub struct MemoryTransport {
    broker: Arc<MemoryBroker>,
    link_queue: usize,
}

impl MemoryTransport {
    pub fn new(broker: Arc<MemoryBroker>) -> Self {
        Self {
            broker,
            link_queue: DEFAULT_LINK_QUEUE,
        }
    }
}

struct MemoryListener {
    address: String,
    broker: Arc<MemoryBroker>,
    accept_task: JoinHandle<()>,
}

impl Listener for MemoryListener {
    fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.broker.release(&self.address);
        self.accept_task.abort();
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn listen(&self, address: &str, events: EventTx) -> Result<Box<dyn Listener>> {
        if self.broker.unreachable.load(Ordering::Relaxed) {
            return std::future::pending().await;
        }

        let (accept_tx, mut accept_rx) = mpsc::channel::<DialRequest>(DIAL_QUEUE);
        match self.broker.listeners.entry(address.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(PartyError::RoomCodeCollision);
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(accept_tx);
            }
        }

        let host_id = ParticipantId::from(address);
        let link_queue = self.link_queue;
        let accept_task = tokio::spawn(async move {
            while let Some(req) = accept_rx.recv().await {
                let (to_host_tx, to_host_rx) = mpsc::channel::<Envelope>(link_queue);
                let (to_dialer_tx, to_dialer_rx) = mpsc::channel::<Envelope>(link_queue);

                let host_side = LinkSender::new(req.peer.clone(), to_dialer_tx);
                let dialer_side = LinkSender::new(host_id.clone(), to_host_tx);

                if events
                    .send(LinkEvent::Opened {
                        peer: req.peer.clone(),
                        sender: host_side,
                    })
                    .await
                    .is_err()
                {
                    // Session is gone; dropping the reply fails the dial.
                    break;
                }

                tokio::spawn(pump(
                    to_host_rx,
                    events.clone(),
                    req.peer.clone(),
                    req.dialer_events.clone(),
                    host_id.clone(),
                ));
                tokio::spawn(pump(
                    to_dialer_rx,
                    req.dialer_events,
                    host_id.clone(),
                    events.clone(),
                    req.peer,
                ));

                let _ = req.reply.send(dialer_side);
            }
        });

        Ok(Box::new(MemoryListener {
            address: address.to_string(),
            broker: Arc::clone(&self.broker),
            accept_task,
        }))
    }

    async fn connect(
        &self,
        address: &str,
        local_id: &ParticipantId,
        events: EventTx,
    ) -> Result<LinkSender> {
        if self.broker.unreachable.load(Ordering::Relaxed) {
            return std::future::pending().await;
        }

        let accept_tx = self
            .broker
            .listeners
            .get(address)
            .map(|r| r.value().clone())
            .ok_or_else(|| PartyError::ConnectFailure(format!("no listener at {address}")))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        accept_tx
            .send(DialRequest {
                peer: local_id.clone(),
                dialer_events: events,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PartyError::ConnectFailure(format!("listener at {address} is gone")))?;

        reply_rx
            .await
            .map_err(|_| PartyError::ConnectFailure(format!("dial to {address} was dropped")))
    }
}

/// Forward one direction of a link into the receiving session's event
/// queue. On teardown, notify both sides (duplicates are fine).
async fn pump(
    mut rx: mpsc::Receiver<Envelope>,
    dest: EventTx,
    sender_id: ParticipantId,
    back: EventTx,
    receiver_id: ParticipantId,
) {
    while let Some(envelope) = rx.recv().await {
        if dest
            .send(LinkEvent::Data {
                peer: sender_id.clone(),
                envelope,
            })
            .await
            .is_err()
        {
            break;
        }
    }
    let _ = dest.try_send(LinkEvent::Closed {
        peer: sender_id.clone(),
    });
    let _ = back.try_send(LinkEvent::Closed { peer: receiver_id });
}
