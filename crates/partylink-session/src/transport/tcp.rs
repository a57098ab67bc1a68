//! Framed-TCP transport.
//!
//! The rendezvous broker is consulted only at setup, over a one-line JSON
//! exchange: a listener registers `code -> socket addr` (the registration
//! lives as long as its broker connection), a dialer resolves the code and
//! then dials the host directly. Steady-state traffic never touches the
//! broker.
//!
//! Every established link runs one IO task: outbound envelopes drain from
//! the link's queue into framed writes, inbound frames decode into
//! `LinkEvent::Data`. Task exit emits `LinkEvent::Closed` for the peer.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use partylink_core::error::{PartyError, Result};
use partylink_core::participant::ParticipantId;
use partylink_core::protocol::envelope::Envelope;
use partylink_core::protocol::frame::{encode_frame, FrameDecoder};

use crate::config::SessionConfig;

use super::{EventTx, LinkEvent, LinkSender, Listener, Transport};

const READ_CHUNK: usize = 8 * 1024;

// --------------------
// Broker line protocol
// --------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BrokerRequest {
    Register { code: String, addr: String },
    Resolve { code: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct BrokerReply {
    ok: bool,
    #[serde(default)]
    addr: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn broker_roundtrip(stream: &mut TcpStream, req: &BrokerRequest) -> Result<BrokerReply> {
    let mut line = serde_json::to_vec(req)
        .map_err(|e| PartyError::Internal(format!("broker request encode failed: {e}")))?;
    line.push(b'\n');
    stream
        .write_all(&line)
        .await
        .map_err(|e| PartyError::ConnectFailure(format!("broker write failed: {e}")))?;

    let (read, _write) = stream.split();
    let mut reply = String::new();
    BufReader::new(read)
        .read_line(&mut reply)
        .await
        .map_err(|e| PartyError::ConnectFailure(format!("broker read failed: {e}")))?;
    if reply.is_empty() {
        return Err(PartyError::ConnectFailure("broker closed connection".into()));
    }
    serde_json::from_str(&reply)
        .map_err(|e| PartyError::ConnectFailure(format!("broker reply invalid: {e}")))
}

// --------------------
// Link handshake
// --------------------

/// First frame on a fresh connection, both directions: each side announces
/// its transport identity before envelopes flow.
#[derive(Debug, Serialize, Deserialize)]
struct LinkHello {
    peer: String,
}

// --------------------
// Framed stream reader
// --------------------

struct FrameStream {
    read: OwnedReadHalf,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl FrameStream {
    fn new(read: OwnedReadHalf, max_frame_bytes: usize) -> Self {
        Self {
            read,
            decoder: FrameDecoder::new(max_frame_bytes),
            chunk: vec![0u8; READ_CHUNK],
        }
    }

    /// Next complete frame payload, `None` on clean EOF.
    async fn next(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }
            let n = self
                .read
                .read(&mut self.chunk)
                .await
                .map_err(|e| PartyError::ConnectFailure(format!("link read failed: {e}")))?;
            if n == 0 {
                return Ok(None);
            }
            self.decoder.extend(&self.chunk[..n]);
        }
    }
}

// --------------------
// Transport
// --------------------

/// Transport over direct TCP links, with broker-based rendezvous.
pub struct TcpTransport {
    broker_addr: String,
    bind: String,
    open_timeout: Duration,
    link_queue: usize,
    max_frame_bytes: usize,
}

impl TcpTransport {
    pub fn new(cfg: &SessionConfig) -> Self {
        Self {
            broker_addr: cfg.broker.addr.clone(),
            bind: cfg.broker.bind.clone(),
            open_timeout: cfg.open_timeout(),
            link_queue: cfg.limits.outbound_queue,
            max_frame_bytes: cfg.limits.max_frame_bytes,
        }
    }

    async fn broker_stream(&self) -> Result<TcpStream> {
        TcpStream::connect(&self.broker_addr)
            .await
            .map_err(|e| PartyError::ConnectFailure(format!("rendezvous broker unreachable: {e}")))
    }
}

struct TcpListenerHandle {
    address: String,
    // Held open for the lifetime of the listener; the broker releases the
    // code when this connection drops.
    _registration: TcpStream,
    accept_task: JoinHandle<()>,
}

impl Listener for TcpListenerHandle {
    fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for TcpListenerHandle {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn listen(&self, address: &str, events: EventTx) -> Result<Box<dyn Listener>> {
        let listener = TcpListener::bind(&self.bind)
            .await
            .map_err(|e| PartyError::ConnectFailure(format!("bind {} failed: {e}", self.bind)))?;
        let port = listener
            .local_addr()
            .map_err(|e| PartyError::Internal(format!("local_addr failed: {e}")))?
            .port();

        let mut registration = self.broker_stream().await?;
        // Advertise the IP the broker actually sees us on, not the bind
        // wildcard.
        let ip = registration
            .local_addr()
            .map_err(|e| PartyError::Internal(format!("local_addr failed: {e}")))?
            .ip();
        let advertised = format!("{ip}:{port}");

        let reply = broker_roundtrip(
            &mut registration,
            &BrokerRequest::Register {
                code: address.to_string(),
                addr: advertised,
            },
        )
        .await?;
        if !reply.ok {
            return match reply.error.as_deref() {
                Some("taken") => Err(PartyError::RoomCodeCollision),
                other => Err(PartyError::ConnectFailure(format!(
                    "broker rejected registration: {}",
                    other.unwrap_or("unknown")
                ))),
            };
        }

        let host_id = ParticipantId::from(address);
        let open_timeout = self.open_timeout;
        let link_queue = self.link_queue;
        let max_frame_bytes = self.max_frame_bytes;
        let accept_task = tokio::spawn(async move {
            loop {
                let stream = match listener.accept().await {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed, listener stopping");
                        break;
                    }
                };
                tokio::spawn(accept_link(
                    stream,
                    host_id.clone(),
                    events.clone(),
                    open_timeout,
                    link_queue,
                    max_frame_bytes,
                ));
            }
        });

        Ok(Box::new(TcpListenerHandle {
            address: address.to_string(),
            _registration: registration,
            accept_task,
        }))
    }

    async fn connect(
        &self,
        address: &str,
        local_id: &ParticipantId,
        events: EventTx,
    ) -> Result<LinkSender> {
        let mut broker = self.broker_stream().await?;
        let reply = broker_roundtrip(
            &mut broker,
            &BrokerRequest::Resolve {
                code: address.to_string(),
            },
        )
        .await?;
        drop(broker);

        let host_addr = match (reply.ok, reply.addr) {
            (true, Some(addr)) => addr,
            _ => {
                return Err(PartyError::ConnectFailure(format!(
                    "room code {address} not registered"
                )))
            }
        };

        let stream = TcpStream::connect(&host_addr)
            .await
            .map_err(|e| PartyError::ConnectFailure(format!("dial {host_addr} failed: {e}")))?;
        let (read, mut write) = stream.into_split();
        let mut frames = FrameStream::new(read, self.max_frame_bytes);

        // Announce ourselves, then wait for the host's hello, bounded by
        // the open deadline.
        let hello = timeout(self.open_timeout, async {
            send_hello(&mut write, local_id, self.max_frame_bytes).await?;
            read_hello(&mut frames).await
        })
        .await
        .map_err(|_| PartyError::LinkTimeout)??;

        let peer = ParticipantId::from(hello.peer);
        let (out_tx, out_rx) = mpsc::channel::<Envelope>(self.link_queue);
        let sender = LinkSender::new(peer.clone(), out_tx);
        tokio::spawn(run_link(
            frames,
            write,
            peer,
            out_rx,
            events,
            self.max_frame_bytes,
        ));
        Ok(sender)
    }
}

/// Host side of the open handshake for one inbound connection.
async fn accept_link(
    stream: TcpStream,
    host_id: ParticipantId,
    events: EventTx,
    open_timeout: Duration,
    link_queue: usize,
    max_frame_bytes: usize,
) {
    let remote = stream.peer_addr().ok();
    let (read, mut write) = stream.into_split();
    let mut frames = FrameStream::new(read, max_frame_bytes);

    let hello = match timeout(open_timeout, async {
        let hello = read_hello(&mut frames).await?;
        send_hello(&mut write, &host_id, max_frame_bytes).await?;
        Ok::<_, PartyError>(hello)
    })
    .await
    {
        Ok(Ok(hello)) => hello,
        Ok(Err(e)) => {
            tracing::warn!(?remote, error = %e, "link handshake failed");
            return;
        }
        Err(_) => {
            tracing::warn!(?remote, "link handshake timed out");
            return;
        }
    };

    let peer = ParticipantId::from(hello.peer);
    let (out_tx, out_rx) = mpsc::channel::<Envelope>(link_queue);
    let sender = LinkSender::new(peer.clone(), out_tx);
    if events
        .send(LinkEvent::Opened {
            peer: peer.clone(),
            sender,
        })
        .await
        .is_err()
    {
        return;
    }
    run_link(frames, write, peer, out_rx, events, max_frame_bytes).await;
}

async fn send_hello(
    write: &mut OwnedWriteHalf,
    id: &ParticipantId,
    max_frame_bytes: usize,
) -> Result<()> {
    let payload = serde_json::to_vec(&LinkHello {
        peer: id.as_str().to_string(),
    })
    .map_err(|e| PartyError::Internal(format!("hello encode failed: {e}")))?;
    let frame = encode_frame(&payload, max_frame_bytes)?;
    write
        .write_all(&frame)
        .await
        .map_err(|e| PartyError::ConnectFailure(format!("hello write failed: {e}")))
}

async fn read_hello(frames: &mut FrameStream) -> Result<LinkHello> {
    let payload = frames
        .next()
        .await?
        .ok_or_else(|| PartyError::ConnectFailure("peer closed during handshake".into()))?;
    serde_json::from_slice(&payload)
        .map_err(|e| PartyError::BadRequest(format!("invalid hello: {e}")))
}

/// Per-link IO loop: outbound queue -> framed writes, framed reads ->
/// `LinkEvent::Data`. Exits on either side closing; emits `Closed` once.
async fn run_link(
    mut frames: FrameStream,
    mut write: OwnedWriteHalf,
    peer: ParticipantId,
    mut out_rx: mpsc::Receiver<Envelope>,
    events: EventTx,
    max_frame_bytes: usize,
) {
    loop {
        tokio::select! {
            out = out_rx.recv() => match out {
                Some(envelope) => {
                    let framed = envelope
                        .to_bytes()
                        .and_then(|b| encode_frame(&b, max_frame_bytes));
                    match framed {
                        Ok(bytes) => {
                            if write.write_all(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(peer = %peer, error = %e, "dropping unencodable envelope");
                        }
                    }
                }
                None => break,
            },
            inbound = frames.next() => match inbound {
                Ok(Some(payload)) => match Envelope::from_slice(&payload) {
                    Ok(envelope) => {
                        if events
                            .send(LinkEvent::Data { peer: peer.clone(), envelope })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(peer = %peer, error = %e, "malformed envelope, closing link");
                        break;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "link read error");
                    break;
                }
            },
        }
    }
    let _ = write.shutdown().await;
    let _ = events.try_send(LinkEvent::Closed { peer });
}
