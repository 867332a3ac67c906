// Protocol messages for peer-relay communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientMessage`: sent by peers to the relay.
// - `ServerMessage`: sent by the relay to peers.
//
// Command and stream-frame payloads are opaque byte vectors — the relay
// never inspects them, which keeps this crate independent of the world
// crate. Peers encode a `WorldCommand`/`StreamFrame` to bytes before sending
// and decode after receiving.
//
// The three replication channels map onto the vocabulary like this:
// - Command channel: `Command` in, `Command { issuer }` fanned out to every
//   peer including the sender, in relay receipt order.
// - Streamed channel: `StreamFrame { target }` in (authority only),
//   forwarded to the target peer or to everyone but the sender.
// - Property channel: `PropertySet` in (authority only); the relay stores
//   the bag and fans out `PropertyUpdate`, replaying the full bag to late
//   joiners right after `Welcome`.
//
// `SnapshotSync` carries the count-only convergence check issued when a peer
// becomes the authority. `Focus` reports a peer's point of interest for the
// authority's relevance filtering. `Ping`/`Pong` feed RTT measurement.

use serde::{Deserialize, Serialize};

use crate::types::{ActorId, CommandSeq};

/// Messages sent by a peer to the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Join a session (handshake).
    Hello {
        protocol_version: u32,
        peer_name: String,
        world_version_hash: u64,
        config_hash: u64,
        session_password: Option<String>,
    },
    /// A world command (opaque payload), to be fanned out to every peer.
    Command {
        sequence: CommandSeq,
        payload: Vec<u8>,
    },
    /// A streamed volatile-field frame (opaque payload). Authority only.
    /// `target = None` broadcasts to every other peer.
    StreamFrame {
        target: Option<ActorId>,
        payload: Vec<u8>,
    },
    /// Publish property-bag entries. Authority only; last writer wins.
    PropertySet { entries: Vec<PropertyEntry> },
    /// Count-only convergence check, issued on becoming the authority.
    SnapshotSync {
        tile_count: u64,
        structure_count: u64,
        resource_count: u64,
    },
    /// This peer's current point of interest, for relevance filtering.
    Focus { position: [f32; 3] },
    /// RTT probe; the relay answers with `Pong` carrying the same nonce.
    Ping { nonce: u64 },
    /// Peer is leaving gracefully.
    Goodbye,
}

/// Messages sent by the relay to a peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Handshake accepted. `peers` includes the new peer itself.
    Welcome {
        actor_id: ActorId,
        session_name: String,
        peers: Vec<PeerInfo>,
    },
    /// Handshake rejected.
    Rejected { reason: String },
    /// A command from some peer (possibly yourself), in session order.
    Command {
        issuer: ActorId,
        sequence: CommandSeq,
        payload: Vec<u8>,
    },
    /// A streamed frame from the authority.
    StreamFrame { from: ActorId, payload: Vec<u8> },
    /// Property-bag entries (live publish or late-join replay).
    PropertyUpdate { entries: Vec<PropertyEntry> },
    /// Convergence check from a freshly-active authority.
    SnapshotSync {
        from: ActorId,
        tile_count: u64,
        structure_count: u64,
        resource_count: u64,
    },
    /// A peer connected.
    PeerJoined { peer: PeerInfo },
    /// A peer disconnected (gracefully or not).
    PeerLeft { actor_id: ActorId, name: String },
    /// Another peer's point of interest changed.
    Focus { from: ActorId, position: [f32; 3] },
    /// Answer to `Ping`.
    Pong { nonce: u64 },
}

/// One last-writer-wins property-bag entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub key: String,
    pub value: String,
}

/// Public identity of a connected peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: ActorId,
    pub name: String,
}
