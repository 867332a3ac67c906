// TCP link to the relay.
//
// Provides a non-blocking interface for the engine's update loop to talk to
// the relay server. Architecture:
// - `connect()` performs TCP connect + Hello handshake on the calling
//   thread, then spawns a background reader thread.
// - The reader thread calls `framing::recv()` in a loop and pushes
//   `ServerMessage`s into an `mpsc` channel.
// - The engine holds a `BufWriter<TcpStream>` for sending and drains the
//   inbox with `poll()` (never blocks).
//
// The engine's thread never blocks on network I/O: reads happen on the
// reader thread, writes flush synchronously (acceptable for the small
// messages this protocol sends).
//
// See also: `engine.rs`, which owns a `RelayLink` and drives it from
// `pump()`; `havenfall_relay::server` for the other end of the wire.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use havenfall_protocol::{
    ActorId, ClientMessage, CommandSeq, PROTOCOL_VERSION, PeerInfo, PropertyEntry, ServerMessage,
    framing,
};
use thiserror::Error;

/// How long the handshake may wait for the relay's response.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Failures establishing or using the relay link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("handshake failed: {0}")]
    Handshake(#[source] std::io::Error),
    #[error("relay rejected the handshake: {reason}")]
    Rejected { reason: String },
    #[error("unexpected handshake response: {0}")]
    UnexpectedResponse(String),
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),
}

/// Result of a successful handshake.
pub struct WelcomeInfo {
    pub actor_id: ActorId,
    pub session_name: String,
    /// Session membership at join time, including this peer.
    pub peers: Vec<PeerInfo>,
}

/// One peer's connection to the relay.
pub struct RelayLink {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: Option<JoinHandle<()>>,
    next_sequence: u64,
}

impl RelayLink {
    /// Connect to a relay, perform the Hello handshake, and spawn the reader
    /// thread. The hashes must match whatever the session was opened with.
    pub fn connect(
        addr: &str,
        peer_name: &str,
        world_version_hash: u64,
        config_hash: u64,
        session_password: Option<String>,
    ) -> Result<(Self, WelcomeInfo), LinkError> {
        let stream = TcpStream::connect(addr).map_err(LinkError::Connect)?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).ok();

        let reader_stream = stream.try_clone().map_err(LinkError::Connect)?;
        let mut writer = BufWriter::new(stream);

        framing::send(
            &mut writer,
            &ClientMessage::Hello {
                protocol_version: PROTOCOL_VERSION,
                peer_name: peer_name.into(),
                world_version_hash,
                config_hash,
                session_password,
            },
        )
        .map_err(LinkError::Handshake)?;

        let mut reader = BufReader::new(reader_stream);
        let response: ServerMessage =
            framing::recv(&mut reader).map_err(LinkError::Handshake)?;
        let welcome = match response {
            ServerMessage::Welcome {
                actor_id,
                session_name,
                peers,
            } => WelcomeInfo {
                actor_id,
                session_name,
                peers,
            },
            ServerMessage::Rejected { reason } => return Err(LinkError::Rejected { reason }),
            other => return Err(LinkError::UnexpectedResponse(format!("{other:?}"))),
        };

        // Clear the read timeout for the long-lived reader loop.
        if let Ok(inner) = reader.get_ref().try_clone() {
            inner.set_read_timeout(None).ok();
        }

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, tx));

        Ok((
            Self {
                writer,
                inbox: rx,
                _reader_thread: Some(reader_thread),
                next_sequence: 0,
            },
            welcome,
        ))
    }

    /// Drain all queued server messages (non-blocking).
    pub fn poll(&self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Send an encoded world command. Sequence numbers preserve this peer's
    /// local issue order.
    pub fn send_command(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let sequence = CommandSeq(self.next_sequence);
        self.next_sequence += 1;
        self.send(&ClientMessage::Command {
            sequence,
            payload: payload.to_vec(),
        })
    }

    /// Send an encoded stream frame, to one peer or (with `None`) everyone.
    pub fn send_stream_frame(
        &mut self,
        target: Option<ActorId>,
        payload: Vec<u8>,
    ) -> Result<(), LinkError> {
        self.send(&ClientMessage::StreamFrame { target, payload })
    }

    /// Publish property-bag entries.
    pub fn send_properties(&mut self, entries: Vec<PropertyEntry>) -> Result<(), LinkError> {
        self.send(&ClientMessage::PropertySet { entries })
    }

    /// Broadcast the count-only convergence check.
    pub fn send_snapshot_sync(
        &mut self,
        tile_count: u64,
        structure_count: u64,
        resource_count: u64,
    ) -> Result<(), LinkError> {
        self.send(&ClientMessage::SnapshotSync {
            tile_count,
            structure_count,
            resource_count,
        })
    }

    /// Report this peer's point of interest.
    pub fn send_focus(&mut self, position: [f32; 3]) -> Result<(), LinkError> {
        self.send(&ClientMessage::Focus { position })
    }

    /// Send an RTT probe.
    pub fn send_ping(&mut self, nonce: u64) -> Result<(), LinkError> {
        self.send(&ClientMessage::Ping { nonce })
    }

    /// Announce a graceful departure. Errors are ignored — the relay treats
    /// a dropped stream the same way.
    pub fn disconnect(&mut self) {
        let _ = self.send(&ClientMessage::Goodbye);
    }

    fn send(&mut self, msg: &ClientMessage) -> Result<(), LinkError> {
        framing::send(&mut self.writer, msg).map_err(LinkError::Send)
    }
}

/// Reader thread: deserialize framed messages in a loop, push to the inbox.
/// Exits on stream close, malformed data, or the engine dropping the inbox.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerMessage>) {
    loop {
        match framing::recv::<_, ServerMessage>(&mut reader) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}
