//! Session manager: the host/client connection core.
//!
//! Owns the local identity, the set of active peer links, the host/client
//! role, and the relay policy. All session work is event-driven: the
//! single driver task consumes the link-event queue, so no two relay
//! operations ever run concurrently within one process and inbound
//! handling needs no further locking discipline.
//!
//! Topology: the host is the star hub. Guests hold exactly one link (to
//! the host); the host holds one link per guest and forwards every
//! non-`join` envelope to all other links *before* delivering it locally,
//! so the relayed stream is the one global order every client observes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use partylink_core::error::{PartyError, Result};
use partylink_core::participant::{validate_nickname, Participant, ParticipantId, Role};
use partylink_core::protocol::envelope::{
    Envelope, EnvelopeKind, LeaveBody, ReadyBody, RosterSnapshotBody,
};
use partylink_core::room::RoomCode;

use crate::config::SessionConfig;
use crate::dispatch::{Dispatcher, SessionEvent, Subscription};
use crate::roster::RosterTracker;
use crate::transport::{EventRx, LinkEvent, Listener, Transport, EVENT_QUEUE};

use super::LinkRegistry;

/// Per-peer deadline for one fan-out send. A peer slower than this is
/// skipped for that envelope; delivery to the others is unaffected.
const SEND_TIMEOUT: Duration = Duration::from_millis(1500);

/// Session lifecycle. `Hosting`/`Joining` are transient within the
/// constructors; a constructed manager is `Connected` until `disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Hosting,
    Joining,
    Connected,
    Closed,
}

struct Shared {
    role: Role,
    room: RoomCode,
    local: Participant,
    phase: Mutex<SessionPhase>,
    links: LinkRegistry,
    roster: Mutex<RosterTracker>,
    dispatcher: Dispatcher,
    listener: Mutex<Option<Box<dyn Listener>>>,
}

/// An explicitly owned, explicitly constructed session instance. There is
/// no ambient singleton: whoever needs the session gets a reference to
/// this value. Terminal after `disconnect()`; a new session requires a
/// fresh instance.
pub struct SessionManager {
    shared: Arc<Shared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("role", &self.shared.role)
            .field("room", &self.shared.room)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Initialize as host: obtain (or generate) a room code, register it
    /// with the broker, and start accepting guests.
    ///
    /// A collision on a *generated* code triggers one silent regeneration
    /// before surfacing; an explicitly requested code fails immediately.
    /// The listen attempt is bounded by `broker.connect_timeout_ms` — an
    /// unreachable broker is the dominant real-world failure here and
    /// surfaces as a distinct `SessionInit` wrapping `ConnectFailure`.
    pub async fn host(
        transport: Arc<dyn Transport>,
        cfg: &SessionConfig,
        nickname: &str,
        requested: Option<RoomCode>,
    ) -> Result<Self> {
        Self::host_inner(transport, cfg, nickname, requested)
            .await
            .map_err(|e| PartyError::init(Role::Host, e))
    }

    async fn host_inner(
        transport: Arc<dyn Transport>,
        cfg: &SessionConfig,
        nickname: &str,
        requested: Option<RoomCode>,
    ) -> Result<Self> {
        let nickname = validate_nickname(nickname)?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        let explicit = requested.is_some();
        let mut code = requested.unwrap_or_else(RoomCode::generate);
        let mut regenerated = false;
        let listener = loop {
            match timeout(
                cfg.connect_timeout(),
                transport.listen(code.as_str(), event_tx.clone()),
            )
            .await
            {
                Err(_) => {
                    return Err(PartyError::ConnectFailure(
                        "rendezvous broker unreachable (listen timed out)".into(),
                    ))
                }
                Ok(Ok(listener)) => break listener,
                Ok(Err(PartyError::RoomCodeCollision)) if !explicit && !regenerated => {
                    regenerated = true;
                    code = RoomCode::generate();
                }
                Ok(Err(e)) => return Err(e),
            }
        };
        tracing::debug!(address = listener.address(), "listener registered");

        let local = Participant::host(ParticipantId::from(code.as_str()), nickname);
        let mut roster = RosterTracker::new();
        roster.apply_join(local.clone());

        let shared = Arc::new(Shared {
            role: Role::Host,
            room: code,
            local,
            phase: Mutex::new(SessionPhase::Connected),
            links: LinkRegistry::new(),
            roster: Mutex::new(roster),
            dispatcher: Dispatcher::new(),
            listener: Mutex::new(Some(listener)),
        });
        let driver = tokio::spawn(drive(Arc::clone(&shared), event_rx));
        tracing::info!(room = %shared.room, "hosting session");
        Ok(Self {
            shared,
            driver: Mutex::new(Some(driver)),
        })
    }

    /// Initialize as client: generate a local transport identity, connect
    /// to the room code's address, and announce ourselves with a `join`
    /// envelope. The link staying open is the implicit acknowledgement —
    /// there is no explicit ack message.
    pub async fn join(
        transport: Arc<dyn Transport>,
        cfg: &SessionConfig,
        nickname: &str,
        code: RoomCode,
    ) -> Result<Self> {
        Self::join_inner(transport, cfg, nickname, code)
            .await
            .map_err(|e| PartyError::init(Role::Guest, e))
    }

    async fn join_inner(
        transport: Arc<dyn Transport>,
        cfg: &SessionConfig,
        nickname: &str,
        code: RoomCode,
    ) -> Result<Self> {
        let nickname = validate_nickname(nickname)?;
        let local_id = ParticipantId::from(generate_guest_id());
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        let link = timeout(
            cfg.connect_timeout(),
            transport.connect(code.as_str(), &local_id, event_tx.clone()),
        )
        .await
        .map_err(|_| {
            PartyError::ConnectFailure("rendezvous broker unreachable (connect timed out)".into())
        })??;

        let local = Participant::guest(local_id, nickname);
        let join = Envelope::new(EnvelopeKind::Join, local.id.clone(), &local)?;
        link.send(join).await?;

        let mut roster = RosterTracker::new();
        roster.apply_join(local.clone());

        let shared = Arc::new(Shared {
            role: Role::Guest,
            room: code,
            local,
            phase: Mutex::new(SessionPhase::Connected),
            links: LinkRegistry::new(),
            roster: Mutex::new(roster),
            dispatcher: Dispatcher::new(),
            listener: Mutex::new(None),
        });
        shared.links.insert(link);
        let driver = tokio::spawn(drive(Arc::clone(&shared), event_rx));
        tracing::info!(room = %shared.room, id = %shared.local.id, "joined session");
        Ok(Self {
            shared,
            driver: Mutex::new(Some(driver)),
        })
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn is_host(&self) -> bool {
        self.shared.role == Role::Host
    }

    pub fn room_code(&self) -> &RoomCode {
        &self.shared.room
    }

    pub fn local_participant(&self) -> &Participant {
        &self.shared.local
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared
            .phase
            .lock()
            .map(|p| *p)
            .unwrap_or(SessionPhase::Closed)
    }

    pub fn link_count(&self) -> usize {
        self.shared.links.len()
    }

    /// Send one envelope. Host: best-effort fan-out to every open link (a
    /// failure on one link is logged and skips that peer). Guest: the
    /// single host link. With no open links this is a silent no-op, not an
    /// error.
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        if self.phase() == SessionPhase::Closed {
            return Err(PartyError::Closed);
        }
        fan_out(&self.shared, &envelope, None).await;
        Ok(())
    }

    /// Build and send an envelope from the local participant.
    pub async fn send_kind<T: Serialize>(&self, kind: EnvelopeKind, data: &T) -> Result<()> {
        let envelope = Envelope::new(kind, self.shared.local.id.clone(), data)?;
        self.send(envelope).await
    }

    /// Send to one specific peer, if a link to it is open. A missing or
    /// dead link is skipped silently, matching the broadcast contract.
    pub async fn send_to_peer(&self, peer: &ParticipantId, envelope: Envelope) -> Result<()> {
        if self.phase() == SessionPhase::Closed {
            return Err(PartyError::Closed);
        }
        let Some(link) = self.shared.links.get(peer) else {
            tracing::warn!(peer = %peer, "no open link for targeted send");
            return Ok(());
        };
        let result = match timeout(SEND_TIMEOUT, link.send(envelope)).await {
            Ok(r) => r,
            Err(_) => Err(PartyError::LinkTimeout),
        };
        if let Err(e) = result {
            tracing::warn!(peer = %peer, error = %e, "targeted send failed");
        }
        Ok(())
    }

    /// Deliver an envelope to local subscribers only. Used by the host to
    /// adjudicate its own proposals through the same pipeline guests use.
    pub fn publish_local(&self, envelope: Envelope) {
        self.shared
            .dispatcher
            .publish(&SessionEvent::Message(envelope));
    }

    pub fn subscribe(&self) -> Subscription {
        self.shared.dispatcher.subscribe()
    }

    pub fn subscribe_kind(&self, kind: EnvelopeKind) -> Subscription {
        self.shared.dispatcher.subscribe_kind(kind)
    }

    pub fn roster_snapshot(&self) -> Vec<Participant> {
        self.shared
            .roster
            .lock()
            .map(|r| r.snapshot())
            .unwrap_or_default()
    }

    pub fn roster_contains(&self, id: &ParticipantId) -> bool {
        self.shared
            .roster
            .lock()
            .map(|r| r.contains(id))
            .unwrap_or(false)
    }

    pub fn next_player_after(&self, current: Option<&ParticipantId>) -> Option<ParticipantId> {
        self.shared
            .roster
            .lock()
            .ok()
            .and_then(|r| r.next_after(current))
    }

    pub fn all_ready(&self) -> bool {
        self.shared
            .roster
            .lock()
            .map(|r| r.all_ready())
            .unwrap_or(false)
    }

    /// Flip the local participant's readiness in the local roster copy.
    /// The authoritative flip happens when the host applies the relayed
    /// `ready-toggle`; this keeps the sender's own view current meanwhile.
    pub fn mark_local_ready(&self, ready: bool) {
        if let Ok(mut roster) = self.shared.roster.lock() {
            roster.apply_ready(&self.shared.local.id, ready);
        }
    }

    /// Close every link, release the listener registration, and drop all
    /// subscribers. Terminal and idempotent.
    pub fn disconnect(&self) {
        {
            let Ok(mut phase) = self.shared.phase.lock() else {
                return;
            };
            if *phase == SessionPhase::Closed {
                return;
            }
            *phase = SessionPhase::Closed;
        }
        if let Ok(mut listener) = self.shared.listener.lock() {
            *listener = None;
        }
        self.shared.links.clear();
        self.shared.dispatcher.clear();
        if let Ok(mut driver) = self.driver.lock() {
            if let Some(handle) = driver.take() {
                handle.abort();
            }
        }
        tracing::info!(room = %self.shared.room, "session closed");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Guest transport identity: 12 characters, lowercase alphanumeric.
fn generate_guest_id() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..12)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// The serialized callback queue: every link event for this session flows
/// through here, one at a time.
async fn drive(shared: Arc<Shared>, mut events: EventRx) {
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Opened { peer, sender } => {
                tracing::debug!(peer = %peer, "link opened");
                shared.links.insert(sender);
                shared
                    .dispatcher
                    .publish(&SessionEvent::PeerConnected(peer));
            }
            LinkEvent::Data { peer, envelope } => handle_data(&shared, &peer, envelope).await,
            LinkEvent::Closed { peer } => handle_closed(&shared, peer).await,
        }
    }
}

fn roster_mutating(kind: &EnvelopeKind) -> bool {
    matches!(kind, EnvelopeKind::ReadyToggle | EnvelopeKind::Leave)
}

async fn handle_data(shared: &Shared, from_link: &ParticipantId, envelope: Envelope) {
    tracing::debug!(kind = %envelope.kind, from = %envelope.from, "envelope received");
    if shared.role == Role::Host {
        if envelope.kind == EnvelopeKind::Join {
            handle_join(shared, envelope).await;
            return;
        }
        // Relay first: local delivery must not get ahead of the stream
        // guests observe.
        fan_out(shared, &envelope, Some(from_link)).await;
    }
    apply_roster_effects(shared, &envelope);
    if shared.role == Role::Host && roster_mutating(&envelope.kind) {
        broadcast_roster(shared).await;
    }
    shared
        .dispatcher
        .publish(&SessionEvent::Message(envelope));
}

/// A `join` is absorbed, never relayed verbatim: new membership must land
/// atomically everywhere, so the host answers with a full roster snapshot.
async fn handle_join(shared: &Shared, envelope: Envelope) {
    let participant: Participant = match envelope.decode_data() {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed join");
            return;
        }
    };
    let inserted = match shared.roster.lock() {
        Ok(mut roster) => roster.apply_join(participant),
        Err(_) => false,
    };
    if !inserted {
        tracing::debug!(from = %envelope.from, "duplicate join, roster unchanged");
    }
    broadcast_roster(shared).await;
    shared
        .dispatcher
        .publish(&SessionEvent::Message(envelope));
}

fn apply_roster_effects(shared: &Shared, envelope: &Envelope) {
    match &envelope.kind {
        EnvelopeKind::ReadyToggle => match envelope.decode_data::<ReadyBody>() {
            Ok(body) => {
                if let Ok(mut roster) = shared.roster.lock() {
                    roster.apply_ready(&body.participant_id, body.ready);
                }
            }
            Err(e) => tracing::warn!(error = %e, "ignoring malformed ready-toggle"),
        },
        EnvelopeKind::Leave => match envelope.decode_data::<LeaveBody>() {
            Ok(body) => {
                if let Ok(mut roster) = shared.roster.lock() {
                    roster.mark_disconnected(&body.participant_id);
                }
            }
            Err(e) => tracing::warn!(error = %e, "ignoring malformed leave"),
        },
        EnvelopeKind::RosterSnapshot => {
            // Replace-the-whole-mapping, never an incremental patch. Only
            // meaningful on replicas; the host is the snapshot's source.
            if shared.role == Role::Guest {
                match envelope.decode_data::<RosterSnapshotBody>() {
                    Ok(body) => {
                        if let Ok(mut roster) = shared.roster.lock() {
                            roster.replace_all(body.participants);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed roster snapshot"),
                }
            }
        }
        _ => {}
    }
}

/// A closed link is removed from the active set and surfaces locally as a
/// synthetic leave; the roster entry is marked disconnected, not removed.
async fn handle_closed(shared: &Shared, peer: ParticipantId) {
    if shared.links.remove(&peer).is_none() {
        // Transports may report the same teardown from both directions.
        return;
    }
    tracing::info!(peer = %peer, "link closed");
    let marked = shared
        .roster
        .lock()
        .map(|mut r| r.mark_disconnected(&peer))
        .unwrap_or(false);
    shared
        .dispatcher
        .publish(&SessionEvent::PeerDisconnected(peer));
    if shared.role == Role::Host && marked {
        broadcast_roster(shared).await;
    }
}

/// Concurrent best-effort delivery to every open link except `except`.
/// Per-link failures are logged and never abort the rest of the fan-out.
async fn fan_out(shared: &Shared, envelope: &Envelope, except: Option<&ParticipantId>) {
    let mut futs = FuturesUnordered::new();
    for link in shared.links.all() {
        if except.is_some_and(|id| id == link.peer()) {
            continue;
        }
        let envelope = envelope.clone();
        futs.push(async move {
            let result = match timeout(SEND_TIMEOUT, link.send(envelope)).await {
                Ok(r) => r,
                Err(_) => Err(PartyError::LinkTimeout),
            };
            if let Err(e) = result {
                tracing::warn!(peer = %link.peer(), error = %e, "send failed, skipping peer");
            }
        });
    }
    while futs.next().await.is_some() {}
}

async fn broadcast_roster(shared: &Shared) {
    let participants = match shared.roster.lock() {
        Ok(roster) => roster.snapshot(),
        Err(_) => return,
    };
    let body = RosterSnapshotBody { participants };
    let envelope = match Envelope::new(
        EnvelopeKind::RosterSnapshot,
        shared.local.id.clone(),
        &body,
    ) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "roster snapshot encode failed");
            return;
        }
    };
    fan_out(shared, &envelope, None).await;
}
