//! TCP transport scenarios against a stub rendezvous broker.
//!
//! The stub speaks the one-line JSON register/resolve exchange: a
//! registration lives as long as its connection, exactly like the real
//! broker contract the transport assumes.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use partylink_core::participant::Role;
use partylink_core::room::RoomCode;
use partylink_session::config::SessionConfig;
use partylink_session::transport::{TcpTransport, Transport};
use partylink_session::PartyClient;

async fn spawn_stub_broker() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let codes: Arc<DashMap<String, String>> = Arc::new(DashMap::new());

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let codes = Arc::clone(&codes);
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                let Ok(Some(line)) = lines.next_line().await else {
                    return;
                };
                let Ok(req) = serde_json::from_str::<Value>(&line) else {
                    return;
                };
                match req["op"].as_str() {
                    Some("register") => {
                        let code = req["code"].as_str().unwrap_or_default().to_string();
                        let peer_addr = req["addr"].as_str().unwrap_or_default().to_string();
                        let reply = if codes.contains_key(&code) {
                            json!({"ok": false, "error": "taken"})
                        } else {
                            codes.insert(code.clone(), peer_addr);
                            json!({"ok": true})
                        };
                        let _ = write
                            .write_all(format!("{reply}\n").as_bytes())
                            .await;
                        // Registration lives as long as this connection.
                        while let Ok(Some(_)) = lines.next_line().await {}
                        codes.remove(&code);
                    }
                    Some("resolve") => {
                        let code = req["code"].as_str().unwrap_or_default();
                        let reply = match codes.get(code) {
                            Some(entry) => json!({"ok": true, "addr": entry.value()}),
                            None => json!({"ok": false, "error": "unknown"}),
                        };
                        let _ = write
                            .write_all(format!("{reply}\n").as_bytes())
                            .await;
                    }
                    _ => {}
                }
            });
        }
    });

    addr
}

async fn tcp_setup() -> (Arc<dyn Transport>, SessionConfig) {
    let broker_addr = spawn_stub_broker().await;
    let mut cfg = SessionConfig::default();
    cfg.broker.addr = broker_addr.to_string();
    cfg.broker.bind = "127.0.0.1:0".to_string();
    let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new(&cfg));
    (transport, cfg)
}

async fn wait_until(mut cond: impl FnMut() -> bool, what: &str) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn host_and_guest_exchange_chat_over_tcp() {
    let (transport, cfg) = tcp_setup().await;

    let alice = PartyClient::create_room(Arc::clone(&transport), &cfg, "Alice", None)
        .await
        .unwrap();
    let bob = PartyClient::join_room(Arc::clone(&transport), &cfg, "Bob", alice.room_code().clone())
        .await
        .unwrap();

    wait_until(
        || alice.roster().len() == 2 && bob.roster().len() == 2,
        "rosters to converge over tcp",
    )
    .await;

    bob.send_chat("over real sockets").await.unwrap();
    wait_until(
        || alice.chat_log().iter().any(|c| c.text == "over real sockets"),
        "chat to reach the host over tcp",
    )
    .await;

    alice.send_chat("ack").await.unwrap();
    wait_until(
        || bob.chat_log().iter().any(|c| c.text == "ack"),
        "host chat to reach the guest over tcp",
    )
    .await;
}

#[tokio::test]
async fn tcp_code_collision_is_rejected_by_the_broker() {
    let (transport, cfg) = tcp_setup().await;
    let code = RoomCode::parse("TT55TT").unwrap();

    let _alice = PartyClient::create_room(Arc::clone(&transport), &cfg, "Alice", Some(code.clone()))
        .await
        .unwrap();

    let err = PartyClient::create_room(Arc::clone(&transport), &cfg, "Dave", Some(code))
        .await
        .expect_err("second registration must collide");
    match err {
        partylink_core::error::PartyError::SessionInit { role: Role::Host, source } => {
            assert!(matches!(
                *source,
                partylink_core::error::PartyError::RoomCodeCollision
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn tcp_unknown_code_fails_to_join() {
    let (transport, cfg) = tcp_setup().await;
    let err = PartyClient::join_room(
        transport,
        &cfg,
        "Bob",
        RoomCode::parse("NO0NO0").unwrap(),
    )
    .await
    .expect_err("unknown code must fail");
    assert_eq!(err.user_code().as_str(), "JOIN_FAILED");
}
