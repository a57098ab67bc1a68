//! Application bridge: the typed surface a game UI consumes.
//!
//! `PartyClient` owns a session and keeps the replicated view a frontend
//! renders from: the chat log (append-only for the session lifetime),
//! pending emoji reactions, the current turn holder, and the opaque
//! game-state blob. Game-specific envelope kinds pass through untouched —
//! game modules subscribe to them directly and interpret their own
//! payloads.
//!
//! Authority: the host adjudicates. A guest that needs a binding outcome
//! (who answered first, whether a move is legal) sends a proposal to the
//! host via [`PartyClient::propose`] and waits for the host's resulting
//! state update; that update is the truth. Guests *can* broadcast
//! `game-state-update` themselves — the relay does not discriminate — but
//! concurrent last-writer-wins among several writers is unarbitrated, so
//! reserve it for low-stakes updates.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::task::JoinHandle;

use partylink_core::error::{PartyError, Result};
use partylink_core::participant::{Participant, ParticipantId};
use partylink_core::protocol::envelope::{
    now_millis, ChatBody, EmojiBody, Envelope, EnvelopeKind, LeaveBody, ReadyBody, TurnBody,
};
use partylink_core::room::RoomCode;

use crate::config::SessionConfig;
use crate::dispatch::{SessionEvent, Subscription};
use crate::session::{SessionManager, SessionPhase};
use crate::transport::Transport;

/// Chat line origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Chat,
    System,
}

/// One line of the session chat log.
#[derive(Debug, Clone)]
pub struct ChatEntry {
    /// `None` for system lines.
    pub from: Option<ParticipantId>,
    pub nickname: String,
    pub text: String,
    pub timestamp: u64,
    pub kind: ChatKind,
}

/// One pending emoji reaction. The UI decides how long to show these
/// (the original fades them on a timer); the core only accumulates until
/// drained.
#[derive(Debug, Clone)]
pub struct EmojiReaction {
    pub from: ParticipantId,
    pub nickname: String,
    pub emoji: String,
    pub timestamp: u64,
}

#[derive(Default)]
struct ClientState {
    chat: Vec<ChatEntry>,
    reactions: Vec<EmojiReaction>,
    game_state: Option<Value>,
    current_turn: Option<ParticipantId>,
}

/// High-level handle over one session, host or guest.
pub struct PartyClient {
    session: Arc<SessionManager>,
    state: Arc<Mutex<ClientState>>,
    bridge: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PartyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartyClient")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl PartyClient {
    /// Host a room. The host starts with the turn.
    pub async fn create_room(
        transport: Arc<dyn Transport>,
        cfg: &SessionConfig,
        nickname: &str,
        requested: Option<RoomCode>,
    ) -> Result<Self> {
        let session = Arc::new(SessionManager::host(transport, cfg, nickname, requested).await?);
        let mut state = ClientState {
            current_turn: Some(session.local_participant().id.clone()),
            ..ClientState::default()
        };
        push_system(
            &mut state,
            format!("{} created the room", session.local_participant().nickname),
        );
        Ok(Self::start(session, state))
    }

    /// Join a room by code.
    pub async fn join_room(
        transport: Arc<dyn Transport>,
        cfg: &SessionConfig,
        nickname: &str,
        code: RoomCode,
    ) -> Result<Self> {
        let session = Arc::new(SessionManager::join(transport, cfg, nickname, code).await?);
        let mut state = ClientState::default();
        push_system(&mut state, "joined the room".to_string());
        Ok(Self::start(session, state))
    }

    fn start(session: Arc<SessionManager>, state: ClientState) -> Self {
        let state = Arc::new(Mutex::new(state));
        let sub = session.subscribe();
        let task = tokio::spawn(bridge(Arc::clone(&session), Arc::clone(&state), sub));
        Self {
            session,
            state,
            bridge: Mutex::new(Some(task)),
        }
    }

    // --------------------
    // Actions
    // --------------------

    /// Send a chat line and append it to the local log.
    pub async fn send_chat(&self, text: &str) -> Result<()> {
        let local = self.session.local_participant();
        let body = ChatBody {
            nickname: local.nickname.clone(),
            text: text.to_string(),
        };
        self.session.send_kind(EnvelopeKind::Chat, &body).await?;
        if let Ok(mut state) = self.state.lock() {
            state.chat.push(ChatEntry {
                from: Some(local.id.clone()),
                nickname: local.nickname.clone(),
                text: text.to_string(),
                timestamp: now_millis(),
                kind: ChatKind::Chat,
            });
        }
        Ok(())
    }

    /// Send an emoji reaction and record it locally.
    pub async fn send_emoji(&self, emoji: &str) -> Result<()> {
        let local = self.session.local_participant();
        let body = EmojiBody {
            nickname: local.nickname.clone(),
            emoji: emoji.to_string(),
        };
        self.session
            .send_kind(EnvelopeKind::EmojiReaction, &body)
            .await?;
        if let Ok(mut state) = self.state.lock() {
            state.reactions.push(EmojiReaction {
                from: local.id.clone(),
                nickname: local.nickname.clone(),
                emoji: emoji.to_string(),
                timestamp: now_millis(),
            });
        }
        Ok(())
    }

    /// Flip readiness. No-op for the host, which is always ready.
    pub async fn set_ready(&self, ready: bool) -> Result<()> {
        if self.session.is_host() {
            return Ok(());
        }
        let local = self.session.local_participant();
        let body = ReadyBody {
            participant_id: local.id.clone(),
            ready,
        };
        self.session
            .send_kind(EnvelopeKind::ReadyToggle, &body)
            .await?;
        self.session.mark_local_ready(ready);
        Ok(())
    }

    /// Start the game with an initial state blob. Host only.
    pub async fn start_game(&self, initial: Value) -> Result<()> {
        if !self.session.is_host() {
            return Err(PartyError::HostOnly);
        }
        self.session
            .send_kind(EnvelopeKind::GameStart, &initial)
            .await?;
        if let Ok(mut state) = self.state.lock() {
            state.game_state = Some(initial);
            push_system(&mut state, "game started".to_string());
        }
        Ok(())
    }

    /// Broadcast a game-state blob, last-writer-wins. Only the host's
    /// updates (or a proposal the host committed) are authoritative;
    /// multiple peers writing concurrently race without arbitration.
    pub async fn update_game_state(&self, value: Value) -> Result<()> {
        self.session
            .send_kind(EnvelopeKind::GameStateUpdate, &value)
            .await?;
        if let Ok(mut state) = self.state.lock() {
            state.game_state = Some(value);
        }
        Ok(())
    }

    /// Hand the turn to `next`, which must be in the roster.
    pub async fn change_turn(&self, next: ParticipantId) -> Result<()> {
        if !self.session.roster_contains(&next) {
            return Err(PartyError::UnknownParticipant(next.to_string()));
        }
        let body = TurnBody {
            participant_id: next.clone(),
        };
        self.session
            .send_kind(EnvelopeKind::TurnChange, &body)
            .await?;
        if let Ok(mut state) = self.state.lock() {
            state.current_turn = Some(next);
        }
        Ok(())
    }

    /// Hand the turn to the next participant in id order.
    pub async fn advance_turn(&self) -> Result<ParticipantId> {
        let next = self
            .next_player_id()
            .ok_or_else(|| PartyError::Internal("empty roster".into()))?;
        self.change_turn(next.clone()).await?;
        Ok(next)
    }

    /// Send a game-specific envelope to everyone this side reaches
    /// (host: all guests; guest: the host, which relays).
    pub async fn send_action(&self, kind: EnvelopeKind, data: &Value) -> Result<()> {
        self.session.send_kind(kind, data).await
    }

    /// Send a proposal for the host to adjudicate. From a guest this goes
    /// to the host alone (its only link — never broadcast); on the host it
    /// is delivered straight to local subscribers, since the host
    /// adjudicates its own moves.
    pub async fn propose(&self, kind: EnvelopeKind, data: &Value) -> Result<()> {
        let envelope = Envelope::new(kind, self.session.local_participant().id.clone(), data)?;
        if self.session.is_host() {
            self.session.publish_local(envelope);
            Ok(())
        } else {
            self.session.send(envelope).await
        }
    }

    /// Announce departure and tear the session down. Idempotent.
    pub async fn leave(&self) -> Result<()> {
        if self.session.phase() == SessionPhase::Closed {
            return Ok(());
        }
        let local = self.session.local_participant();
        let body = LeaveBody {
            participant_id: local.id.clone(),
            nickname: local.nickname.clone(),
        };
        // Best-effort goodbye; the close itself is what peers key off.
        let _ = self.session.send_kind(EnvelopeKind::Leave, &body).await;
        self.session.disconnect();
        if let Ok(mut bridge) = self.bridge.lock() {
            if let Some(handle) = bridge.take() {
                handle.abort();
            }
        }
        Ok(())
    }

    // --------------------
    // Queries
    // --------------------

    pub fn roster(&self) -> Vec<Participant> {
        self.session.roster_snapshot()
    }

    pub fn chat_log(&self) -> Vec<ChatEntry> {
        self.state
            .lock()
            .map(|s| s.chat.clone())
            .unwrap_or_default()
    }

    pub fn game_state(&self) -> Option<Value> {
        self.state.lock().ok().and_then(|s| s.game_state.clone())
    }

    pub fn current_turn(&self) -> Option<ParticipantId> {
        self.state.lock().ok().and_then(|s| s.current_turn.clone())
    }

    pub fn is_my_turn(&self) -> bool {
        self.current_turn()
            .is_some_and(|id| id == self.session.local_participant().id)
    }

    pub fn all_ready(&self) -> bool {
        self.session.all_ready()
    }

    pub fn next_player_id(&self) -> Option<ParticipantId> {
        let current = self.current_turn();
        self.session.next_player_after(current.as_ref())
    }

    pub fn room_code(&self) -> &RoomCode {
        self.session.room_code()
    }

    pub fn local(&self) -> &Participant {
        self.session.local_participant()
    }

    pub fn is_host(&self) -> bool {
        self.session.is_host()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Take all reactions accumulated since the last drain.
    pub fn drain_reactions(&self) -> Vec<EmojiReaction> {
        self.state
            .lock()
            .map(|mut s| std::mem::take(&mut s.reactions))
            .unwrap_or_default()
    }

    /// Subscribe to raw session events (for game modules).
    pub fn subscribe(&self) -> Subscription {
        self.session.subscribe()
    }

    /// Subscribe to one envelope kind.
    pub fn subscribe_kind(&self, kind: EnvelopeKind) -> Subscription {
        self.session.subscribe_kind(kind)
    }

    /// The underlying session, for consumers that need lower-level access.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }
}

impl Drop for PartyClient {
    fn drop(&mut self) {
        if let Ok(mut bridge) = self.bridge.lock() {
            if let Some(handle) = bridge.take() {
                handle.abort();
            }
        }
        self.session.disconnect();
    }
}

fn push_system(state: &mut ClientState, text: String) {
    state.chat.push(ChatEntry {
        from: None,
        nickname: "System".to_string(),
        text,
        timestamp: now_millis(),
        kind: ChatKind::System,
    });
}

/// Applies every delivered envelope to the replicated view. Runs until
/// the session's dispatcher is torn down.
async fn bridge(
    session: Arc<SessionManager>,
    state: Arc<Mutex<ClientState>>,
    mut sub: Subscription,
) {
    while let Some(event) = sub.recv().await {
        match event {
            SessionEvent::Message(envelope) => apply_message(&session, &state, envelope),
            SessionEvent::PeerConnected(peer) => {
                tracing::debug!(peer = %peer, "peer connected");
            }
            SessionEvent::PeerDisconnected(peer) => {
                let nickname = session
                    .roster_snapshot()
                    .into_iter()
                    .find(|p| p.id == peer)
                    .map(|p| p.nickname)
                    .unwrap_or_else(|| peer.to_string());
                if let Ok(mut state) = state.lock() {
                    push_system(&mut state, format!("{nickname} lost connection"));
                }
            }
        }
    }
}

fn apply_message(session: &SessionManager, state: &Mutex<ClientState>, envelope: Envelope) {
    let Ok(mut state) = state.lock() else {
        return;
    };
    match &envelope.kind {
        EnvelopeKind::Chat => match envelope.decode_data::<ChatBody>() {
            Ok(body) => state.chat.push(ChatEntry {
                from: Some(envelope.from.clone()),
                nickname: body.nickname,
                text: body.text,
                timestamp: envelope.timestamp,
                kind: ChatKind::Chat,
            }),
            Err(e) => tracing::warn!(error = %e, "ignoring malformed chat"),
        },
        EnvelopeKind::EmojiReaction => match envelope.decode_data::<EmojiBody>() {
            Ok(body) => state.reactions.push(EmojiReaction {
                from: envelope.from.clone(),
                nickname: body.nickname,
                emoji: body.emoji,
                timestamp: envelope.timestamp,
            }),
            Err(e) => tracing::warn!(error = %e, "ignoring malformed reaction"),
        },
        EnvelopeKind::GameStart => {
            match envelope.decode_data::<Value>() {
                Ok(value) => state.game_state = Some(value),
                Err(_) => state.game_state = None,
            }
            push_system(&mut state, "game started".to_string());
        }
        EnvelopeKind::GameStateUpdate => match envelope.decode_data::<Value>() {
            Ok(value) => state.game_state = Some(value),
            Err(e) => tracing::warn!(error = %e, "ignoring malformed game state"),
        },
        EnvelopeKind::TurnChange => match envelope.decode_data::<TurnBody>() {
            Ok(body) => state.current_turn = Some(body.participant_id),
            Err(e) => tracing::warn!(error = %e, "ignoring malformed turn change"),
        },
        EnvelopeKind::Join => {
            // Only the host sees raw joins; replicas learn membership from
            // snapshots.
            if session.is_host() {
                if let Ok(p) = envelope.decode_data::<Participant>() {
                    push_system(&mut state, format!("{} joined", p.nickname));
                }
            }
        }
        EnvelopeKind::Leave => {
            if let Ok(body) = envelope.decode_data::<LeaveBody>() {
                push_system(&mut state, format!("{} left", body.nickname));
            }
        }
        EnvelopeKind::RosterSnapshot | EnvelopeKind::ReadyToggle => {
            // Roster effects are applied by the session event loop.
        }
        EnvelopeKind::Game(_) => {
            // Opaque to the bridge; game modules subscribe directly.
        }
    }
}
