//! Domain type tests: room codes and nicknames.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use rand::rngs::StdRng;
use rand::SeedableRng;

use partylink_core::participant::validate_nickname;
use partylink_core::room::{RoomCode, ROOM_CODE_LEN};

#[test]
fn room_code_uppercases_input() {
    let code = RoomCode::parse("ab12cd").unwrap();
    assert_eq!(code.as_str(), "AB12CD");
    assert_eq!(code, RoomCode::parse("AB12CD").unwrap());
}

#[test]
fn room_code_rejects_bad_input() {
    assert!(RoomCode::parse("AB12C").is_err()); // too short
    assert!(RoomCode::parse("AB12CDE").is_err()); // too long
    assert!(RoomCode::parse("AB-2CD").is_err()); // bad charset
    assert!(RoomCode::parse("").is_err());
    assert!(RoomCode::parse("  ab12cd  ").is_ok()); // surrounding whitespace is user noise
}

#[test]
fn generated_codes_are_valid_and_seeded_generation_is_deterministic() {
    for _ in 0..64 {
        let code = RoomCode::generate();
        assert_eq!(code.as_str().len(), ROOM_CODE_LEN);
        assert!(RoomCode::parse(code.as_str()).is_ok());
    }

    let a = RoomCode::generate_with(&mut StdRng::seed_from_u64(7));
    let b = RoomCode::generate_with(&mut StdRng::seed_from_u64(7));
    assert_eq!(a, b);
}

#[test]
fn nickname_validation() {
    assert_eq!(validate_nickname("  Alice  ").unwrap(), "Alice");
    assert!(validate_nickname("").is_err());
    assert!(validate_nickname("   ").is_err());
    assert!(validate_nickname(&"x".repeat(21)).is_err());
    assert_eq!(validate_nickname(&"x".repeat(20)).unwrap().len(), 20);
}
