// Session state for the relay coordinator.
//
// `RelaySession` is the central data structure `server.rs` drives. All
// mutation happens through methods called from the server's single-threaded
// main loop — no internal locking — and that single loop is the whole
// consistency story: because every command, membership change, and property
// update is fanned out from one thread in the order it was handled, every
// peer receives the same events in the same order. The command fan-out is
// the session's serialization point; authority election on the peers leans
// on the same ordering for membership events.
//
// Key responsibilities:
// - Membership: assign monotonic actor ids (from 1), check password and
//   version/config hashes on join, broadcast joins and leaves.
// - Command fan-out: re-broadcast each command to every peer including the
//   sender, stamped with the sender's id, in receipt order.
// - Stream frames: forward to the targeted peer, or to everyone but the
//   sender. Payloads stay opaque — the relay never runs world logic.
// - Property bag: store the last-writer-wins entries and replay the full
//   bag to late joiners right after Welcome.
// - Snapshot syncs: fan out to everyone but the announcing authority.
// - Pings: answer directly with a Pong.
//
// Writing to peers: the session holds cloned `TcpStream` write halves in
// `BufWriter`s. Write errors on one peer are logged and otherwise ignored —
// that peer's reader thread will notice the broken pipe and deliver a
// disconnect event.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::TcpStream;

use havenfall_protocol::framing;
use havenfall_protocol::message::{PeerInfo, PropertyEntry, ServerMessage};
use havenfall_protocol::types::{ActorId, CommandSeq};
use log::{debug, info, warn};

/// One multiplayer session on the relay.
pub struct RelaySession {
    pub name: String,
    password: Option<String>,
    peers: BTreeMap<ActorId, PeerLink>,
    next_actor_id: u32,
    max_peers: u32,

    // Reference hashes, set by the first peer to join.
    world_version_hash: Option<u64>,
    config_hash: Option<u64>,

    /// The shared property bag: last writer wins, replayed to late joiners.
    properties: BTreeMap<String, String>,
}

struct PeerLink {
    name: String,
    writer: BufWriter<TcpStream>,
}

impl RelaySession {
    pub fn new(name: String, password: Option<String>, max_peers: u32) -> Self {
        Self {
            name,
            password,
            peers: BTreeMap::new(),
            next_actor_id: 1,
            max_peers,
            world_version_hash: None,
            config_hash: None,
            properties: BTreeMap::new(),
        }
    }

    /// Admit a peer: check password, capacity, and hashes; assign the next
    /// actor id; broadcast the join; send Welcome and the property bag.
    /// Returns the assigned id, or a reason string for a `Rejected`.
    pub fn add_peer(
        &mut self,
        peer_name: String,
        world_version_hash: u64,
        config_hash: u64,
        session_password: Option<String>,
        stream: TcpStream,
    ) -> Result<ActorId, String> {
        if self.password.is_some() && session_password != self.password {
            return Err("incorrect password".into());
        }
        if self.peers.len() as u32 >= self.max_peers {
            return Err("session is full".into());
        }

        // First peer pins the reference hashes; replay determinism requires
        // identical world logic and config everywhere.
        match (self.world_version_hash, self.config_hash) {
            (None, _) => {
                self.world_version_hash = Some(world_version_hash);
                self.config_hash = Some(config_hash);
            }
            (Some(w), _) if w != world_version_hash => {
                return Err("world version mismatch".into());
            }
            (_, Some(c)) if c != config_hash => {
                return Err("config hash mismatch".into());
            }
            _ => {}
        }

        let id = ActorId(self.next_actor_id);
        self.next_actor_id += 1;

        // Existing peers hear about the join before the newcomer is live, so
        // everyone's membership history lists the same ids in the same order.
        self.broadcast(&ServerMessage::PeerJoined {
            peer: PeerInfo {
                id,
                name: peer_name.clone(),
            },
        });

        let mut peer_list: Vec<PeerInfo> = self
            .peers
            .iter()
            .map(|(pid, link)| PeerInfo {
                id: *pid,
                name: link.name.clone(),
            })
            .collect();
        peer_list.push(PeerInfo {
            id,
            name: peer_name.clone(),
        });

        info!("{id:?} ('{peer_name}') joined session '{}'", self.name);
        self.peers.insert(
            id,
            PeerLink {
                name: peer_name,
                writer: BufWriter::new(stream),
            },
        );

        self.send_to(
            id,
            &ServerMessage::Welcome {
                actor_id: id,
                session_name: self.name.clone(),
                peers: peer_list,
            },
        );

        // Late joiners inherit the current descriptive state.
        if !self.properties.is_empty() {
            let entries: Vec<PropertyEntry> = self
                .properties
                .iter()
                .map(|(key, value)| PropertyEntry {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect();
            self.send_to(id, &ServerMessage::PropertyUpdate { entries });
        }

        Ok(id)
    }

    /// Drop a peer and broadcast the departure.
    pub fn remove_peer(&mut self, actor_id: ActorId) {
        if let Some(link) = self.peers.remove(&actor_id) {
            info!("{actor_id:?} ('{}') left session '{}'", link.name, self.name);
            self.broadcast(&ServerMessage::PeerLeft {
                actor_id,
                name: link.name,
            });
        }
    }

    /// Fan a command out to every peer including the sender, stamped with
    /// the sender's id. Fan-out order equals handling order on the single
    /// server thread — this call is the serialization point that lets every
    /// mirror apply commands identically.
    pub fn relay_command(&mut self, from: ActorId, sequence: CommandSeq, payload: Vec<u8>) {
        self.broadcast(&ServerMessage::Command {
            issuer: from,
            sequence,
            payload,
        });
    }

    /// Forward a streamed frame to its target, or to everyone but the
    /// sender.
    pub fn relay_stream_frame(&mut self, from: ActorId, target: Option<ActorId>, payload: Vec<u8>) {
        let msg = ServerMessage::StreamFrame { from, payload };
        match target {
            Some(peer) => self.send_to(peer, &msg),
            None => self.broadcast_except(from, &msg),
        }
    }

    /// Store property entries (last writer wins) and fan them out to every
    /// peer but the publisher.
    pub fn store_properties(&mut self, from: ActorId, entries: Vec<PropertyEntry>) {
        for entry in &entries {
            self.properties
                .insert(entry.key.clone(), entry.value.clone());
        }
        debug!(
            "{from:?} published {} property entries ({} total)",
            entries.len(),
            self.properties.len(),
        );
        self.broadcast_except(from, &ServerMessage::PropertyUpdate { entries });
    }

    /// Fan a snapshot sync out to everyone but the announcing authority.
    pub fn relay_snapshot_sync(
        &mut self,
        from: ActorId,
        tile_count: u64,
        structure_count: u64,
        resource_count: u64,
    ) {
        self.broadcast_except(
            from,
            &ServerMessage::SnapshotSync {
                from,
                tile_count,
                structure_count,
                resource_count,
            },
        );
    }

    /// Forward a focus report to everyone but the sender.
    pub fn relay_focus(&mut self, from: ActorId, position: [f32; 3]) {
        self.broadcast_except(from, &ServerMessage::Focus { from, position });
    }

    /// Answer an RTT probe.
    pub fn pong(&mut self, to: ActorId, nonce: u64) {
        self.send_to(to, &ServerMessage::Pong { nonce });
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    fn send_to(&mut self, actor_id: ActorId, msg: &ServerMessage) {
        if let Some(link) = self.peers.get_mut(&actor_id) {
            if let Err(e) = framing::send(&mut link.writer, msg) {
                warn!("write to {actor_id:?} failed: {e}");
            }
        }
    }

    fn broadcast(&mut self, msg: &ServerMessage) {
        let ids: Vec<ActorId> = self.peers.keys().copied().collect();
        for id in ids {
            self.send_to(id, msg);
        }
    }

    fn broadcast_except(&mut self, skip: ActorId, msg: &ServerMessage) {
        let ids: Vec<ActorId> = self
            .peers
            .keys()
            .copied()
            .filter(|&id| id != skip)
            .collect();
        for id in ids {
            self.send_to(id, msg);
        }
    }
}
