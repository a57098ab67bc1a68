#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use partylink_session::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
broker:
  addr: "127.0.0.1:9000"
limitz: { outbound_queue: 16 } # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.user_code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.broker.addr, "127.0.0.1:9000");
    assert_eq!(cfg.broker.connect_timeout_ms, 10_000);
    assert_eq!(cfg.broker.open_timeout_ms, 10_000);
    assert_eq!(cfg.limits.outbound_queue, 256);
}

#[test]
fn unsupported_version_fails() {
    let err = config::load_from_str("version: 2").expect_err("must fail");
    assert_eq!(err.user_code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn out_of_range_timeout_fails() {
    let bad = r#"
version: 1
broker:
  connect_timeout_ms: 100
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.user_code().as_str(), "BAD_REQUEST");
}

#[test]
fn zero_outbound_queue_fails() {
    let bad = r#"
version: 1
limits:
  outbound_queue: 0
"#;
    assert!(config::load_from_str(bad).is_err());
}
