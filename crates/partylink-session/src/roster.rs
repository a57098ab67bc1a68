//! Presence & roster tracking.
//!
//! Authoritative only at the host: joins, ready flips, and link closes
//! mutate the host's copy, and every mutation is followed by a full
//! `roster-snapshot` broadcast. Clients replace their whole mapping on
//! each snapshot — never merge — which sidesteps ordering conflicts
//! between partial updates. Roster changes are rare next to gameplay
//! traffic, so the snapshot costs little.
//!
//! Entries live in a `BTreeMap` so iteration order, snapshot order, and
//! turn order are all the same lexicographic id order on every replica.

use std::collections::BTreeMap;

use partylink_core::participant::{Participant, ParticipantId, PresenceState, Role};

/// The id -> participant mapping plus the turn-order derivation over it.
#[derive(Debug, Default)]
pub struct RosterTracker {
    entries: BTreeMap<ParticipantId, Participant>,
}

impl RosterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a participant if absent. Idempotent against duplicate join
    /// envelopes. A second host is rejected outright.
    pub fn apply_join(&mut self, participant: Participant) -> bool {
        if participant.role == Role::Host
            && self
                .entries
                .values()
                .any(|p| p.role == Role::Host && p.id != participant.id)
        {
            tracing::warn!(id = %participant.id, "rejecting join claiming a second host");
            return false;
        }
        if self.entries.contains_key(&participant.id) {
            return false;
        }
        self.entries.insert(participant.id.clone(), participant);
        true
    }

    /// Flip one participant's readiness.
    pub fn apply_ready(&mut self, id: &ParticipantId, ready: bool) -> bool {
        match self.entries.get_mut(id) {
            Some(p) => {
                p.ready = ready;
                true
            }
            None => false,
        }
    }

    /// Mark a participant disconnected. The entry is retained so chat
    /// history and scoreboards stay attributable.
    pub fn mark_disconnected(&mut self, id: &ParticipantId) -> bool {
        match self.entries.get_mut(id) {
            Some(p) if p.presence == PresenceState::Online => {
                p.presence = PresenceState::Disconnected;
                true
            }
            _ => false,
        }
    }

    /// Replace the whole mapping from a host snapshot (client side).
    pub fn replace_all(&mut self, participants: Vec<Participant>) {
        self.entries = participants.into_iter().map(|p| (p.id.clone(), p)).collect();
    }

    /// The roster as an ordered list (lexicographic by id).
    pub fn snapshot(&self) -> Vec<Participant> {
        self.entries.values().cloned().collect()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn host_count(&self) -> usize {
        self.entries.values().filter(|p| p.role == Role::Host).count()
    }

    /// Next turn holder: advance cyclically past `current` in id order,
    /// wrapping from last back to first. With no (or an unknown) current
    /// holder, the first id starts. Deterministic given equal rosters, so
    /// replicas agree on every handoff.
    pub fn next_after(&self, current: Option<&ParticipantId>) -> Option<ParticipantId> {
        let ids: Vec<&ParticipantId> = self.entries.keys().collect();
        if ids.is_empty() {
            return None;
        }
        let next = match current.and_then(|c| ids.iter().position(|id| *id == c)) {
            Some(i) => (i + 1) % ids.len(),
            None => 0,
        };
        Some(ids[next].clone())
    }

    /// Every online participant is ready. Disconnected entries do not
    /// gate game start.
    pub fn all_ready(&self) -> bool {
        self.entries
            .values()
            .filter(|p| p.is_online())
            .all(|p| p.ready)
    }
}
