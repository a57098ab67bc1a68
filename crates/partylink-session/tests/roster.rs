//! Roster tracker unit tests: join idempotency, single-host invariant,
//! disconnect marking, and turn derivation.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use partylink_core::participant::{Participant, ParticipantId, PresenceState};
use partylink_session::roster::RosterTracker;

fn host(id: &str, nick: &str) -> Participant {
    Participant::host(ParticipantId::from(id), nick.to_string())
}

fn guest(id: &str, nick: &str) -> Participant {
    Participant::guest(ParticipantId::from(id), nick.to_string())
}

#[test]
fn join_is_idempotent_by_id() {
    let mut roster = RosterTracker::new();
    assert!(roster.apply_join(guest("bbb", "Bob")));
    assert!(!roster.apply_join(guest("bbb", "Bob")));
    assert!(!roster.apply_join(guest("bbb", "Imposter")));
    assert_eq!(roster.len(), 1);
    assert_eq!(roster.get(&ParticipantId::from("bbb")).unwrap().nickname, "Bob");
}

#[test]
fn second_host_is_rejected() {
    let mut roster = RosterTracker::new();
    assert!(roster.apply_join(host("AB12CD", "Alice")));
    assert!(!roster.apply_join(host("ZZ99ZZ", "Mallory")));
    assert_eq!(roster.host_count(), 1);
    assert_eq!(roster.len(), 1);
}

#[test]
fn disconnect_marks_but_never_removes() {
    let mut roster = RosterTracker::new();
    roster.apply_join(host("AB12CD", "Alice"));
    roster.apply_join(guest("bbb", "Bob"));

    let bob = ParticipantId::from("bbb");
    assert!(roster.mark_disconnected(&bob));
    assert!(!roster.mark_disconnected(&bob)); // already marked
    assert_eq!(roster.len(), 2);
    assert_eq!(
        roster.get(&bob).unwrap().presence,
        PresenceState::Disconnected
    );
}

#[test]
fn turn_order_is_the_lexicographic_cycle() {
    let mut roster = RosterTracker::new();
    roster.apply_join(host("AB12CD", "Alice"));
    roster.apply_join(guest("bbb", "Bob"));
    roster.apply_join(guest("ccc", "Carol"));

    let a = ParticipantId::from("AB12CD");
    let b = ParticipantId::from("bbb");
    let c = ParticipantId::from("ccc");

    // No current holder: first id starts.
    assert_eq!(roster.next_after(None).unwrap(), a);
    assert_eq!(roster.next_after(Some(&a)).unwrap(), b);
    assert_eq!(roster.next_after(Some(&b)).unwrap(), c);
    // Wrap from last back to first.
    assert_eq!(roster.next_after(Some(&c)).unwrap(), a);
    // Unknown holder behaves like none.
    assert_eq!(roster.next_after(Some(&ParticipantId::from("zzz"))).unwrap(), a);
}

#[test]
fn identical_rosters_derive_identical_turns() {
    let participants = vec![
        host("AB12CD", "Alice"),
        guest("k3f8a1pz09qd", "Bob"),
        guest("m0d2h7aa11xx", "Carol"),
    ];

    let mut left = RosterTracker::new();
    for p in &participants {
        left.apply_join(p.clone());
    }
    // A replica built from a snapshot, not from joins.
    let mut right = RosterTracker::new();
    right.replace_all(left.snapshot());

    let mut current = None;
    for _ in 0..7 {
        let l = left.next_after(current.as_ref());
        let r = right.next_after(current.as_ref());
        assert_eq!(l, r);
        current = l;
    }
}

#[test]
fn all_ready_ignores_disconnected_entries() {
    let mut roster = RosterTracker::new();
    roster.apply_join(host("AB12CD", "Alice"));
    roster.apply_join(guest("bbb", "Bob"));
    assert!(!roster.all_ready()); // Bob not ready yet

    roster.apply_ready(&ParticipantId::from("bbb"), true);
    assert!(roster.all_ready());

    roster.apply_join(guest("ccc", "Carol"));
    assert!(!roster.all_ready());
    roster.mark_disconnected(&ParticipantId::from("ccc"));
    assert!(roster.all_ready()); // a dropped guest does not gate start
}

#[test]
fn snapshot_replacement_is_wholesale() {
    let mut roster = RosterTracker::new();
    roster.apply_join(guest("stale", "Old"));
    roster.replace_all(vec![host("AB12CD", "Alice"), guest("bbb", "Bob")]);
    assert_eq!(roster.len(), 2);
    assert!(!roster.contains(&ParticipantId::from("stale")));
}
