//! Local pub-sub multiplexer between the session event loop and game UI.
//!
//! Performs no network I/O; every network effect flows through the session
//! manager. Subscribers get bounded queues and lossy delivery: a slow
//! consumer drops events rather than stalling the event loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;

use partylink_core::participant::ParticipantId;
use partylink_core::protocol::envelope::{Envelope, EnvelopeKind};

/// Per-subscriber queue depth.
const SUBSCRIBER_QUEUE: usize = 256;

/// Everything a local consumer can observe from the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// An envelope delivered locally (inbound from a peer, post-relay at
    /// the host).
    Message(Envelope),
    /// A link finished opening.
    PeerConnected(ParticipantId),
    /// A link went away. Synthetic local notification; the roster marks
    /// the participant disconnected separately.
    PeerDisconnected(ParticipantId),
}

struct Entry {
    filter: Option<EnvelopeKind>,
    tx: mpsc::Sender<SessionEvent>,
}

/// Registry and fan-out for session event subscribers.
#[derive(Default)]
pub struct Dispatcher {
    subs: Arc<DashMap<u64, Entry>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            subs: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to every session event.
    pub fn subscribe(&self) -> Subscription {
        self.register(None)
    }

    /// Subscribe to `Message` events of one envelope kind. Lifecycle
    /// events (`PeerConnected`/`PeerDisconnected`) only reach unfiltered
    /// subscribers.
    pub fn subscribe_kind(&self, kind: EnvelopeKind) -> Subscription {
        self.register(Some(kind))
    }

    fn register(&self, filter: Option<EnvelopeKind>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        self.subs.insert(id, Entry { filter, tx });
        Subscription {
            id,
            rx,
            subs: Arc::downgrade(&self.subs),
        }
    }

    /// Fan an event out to interested subscribers. Never blocks: full
    /// queues drop the event for that subscriber, dead subscribers are
    /// pruned.
    pub fn publish(&self, event: &SessionEvent) {
        let mut dead = Vec::new();
        for entry in self.subs.iter() {
            let wanted = match (&entry.value().filter, event) {
                (None, _) => true,
                (Some(kind), SessionEvent::Message(env)) => env.kind == *kind,
                (Some(_), _) => false,
            };
            if !wanted {
                continue;
            }
            match entry.value().tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = *entry.key(), "subscriber queue full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*entry.key());
                }
            }
        }
        for id in dead {
            self.subs.remove(&id);
        }
    }

    /// Drop every subscriber (session teardown).
    pub fn clear(&self) {
        self.subs.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs.len()
    }
}

/// A live subscription. Dropping it unregisters the subscriber — the
/// scoped rendition of "subscribe returns an unsubscribe function".
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<SessionEvent>,
    subs: Weak<DashMap<u64, Entry>>,
}

impl Subscription {
    /// Await the next event; `None` once the session is torn down.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }

    /// Explicit unsubscribe; equivalent to dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subs) = self.subs.upgrade() {
            subs.remove(&self.id);
        }
    }
}
