//! Active link registry: `peer id -> outbound sender`.

use dashmap::DashMap;

use partylink_core::participant::ParticipantId;

use crate::transport::LinkSender;

#[derive(Default)]
pub(crate) struct LinkRegistry {
    links: DashMap<ParticipantId, LinkSender>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sender: LinkSender) {
        self.links.insert(sender.peer().clone(), sender);
    }

    pub fn remove(&self, peer: &ParticipantId) -> Option<LinkSender> {
        self.links.remove(peer).map(|(_, sender)| sender)
    }

    pub fn get(&self, peer: &ParticipantId) -> Option<LinkSender> {
        self.links.get(peer).map(|r| r.value().clone())
    }

    /// Snapshot of all open links, for fan-out.
    pub fn all(&self) -> Vec<LinkSender> {
        self.links.iter().map(|r| r.value().clone()).collect()
    }

    /// Drop every link; peers observe the close via their transports.
    pub fn clear(&self) {
        self.links.clear();
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }
}
