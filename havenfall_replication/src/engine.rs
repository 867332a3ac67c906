// The peer-side replication engine.
//
// `ReplicationEngine` ties one `WorldState` mirror to one relay link and
// drives everything from `pump(now_ms)`, the cooperative single-threaded
// update step the hosting process calls once per frame:
//
//   1. Drain the link inbox and handle each message: replay commands through
//      the local validator, overwrite volatile fields from stream frames,
//      apply property entries, feed membership changes to the authority
//      coordinator, match Pongs to Pings for RTT.
//   2. If a hand-off just made this peer the authority, announce it
//      (snapshot sync + full property publish) and rebuild the regrowth
//      schedule from the mirror.
//   3. If this peer is the authority, run the simulation tick: issue
//      regrowth commands, flush dirty property entries through the
//      optimizer's pending queue, and fan out relevance-filtered stream
//      frames.
//   4. Keep the RTT probe cadence.
//
// Local input never touches the store: `request_*` methods send a command to
// the relay and the mutation happens when the command comes back in session
// order — the same path every other peer's commands take. The engine
// overwrites each incoming command's issuer with the transport-stamped
// sender, so issuer spoofing is not possible.
//
// Timestamps are supplied by the caller. The engine never reads a clock,
// which keeps every decision replayable in tests.
//
// See also: `link.rs` for the transport, `authority.rs` for election,
// `optimizer.rs` for the tunables, and `havenfall_world` for everything the
// engine mutates.

use std::collections::BTreeMap;

use havenfall_protocol::{ActorId, PropertyEntry, ServerMessage};
use havenfall_world::WORLD_VERSION_HASH;
use havenfall_world::command::{WorldAction, WorldCommand};
use havenfall_world::config::WorldConfig;
use havenfall_world::event::WorldEvent;
use havenfall_world::frame::{ResourceMarker, StreamFrame, StructureMotion};
use havenfall_world::property;
use havenfall_world::registry::RegistryError;
use havenfall_world::store::WorldStatistics;
use havenfall_world::types::*;
use havenfall_world::world::WorldState;
use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::authority::AuthorityCoordinator;
use crate::link::{LinkError, RelayLink};
use crate::optimizer::{BandwidthOptimizer, NetworkQuality, OptimizerSettings};

/// Spacing between RTT probes.
const PING_INTERVAL_MS: u64 = 1_000;
/// Probes outstanding beyond this are assumed lost and forgotten.
const MAX_PINGS_IN_FLIGHT: usize = 8;

/// Failures constructing or commanding the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("only the authority may do this")]
    NotAuthority,
}

/// The last snapshot sync received, kept for convergence checking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotReport {
    pub from: PeerId,
    pub tile_count: u64,
    pub structure_count: u64,
    pub resource_count: u64,
    /// Whether our own statistics agreed at the moment it arrived.
    pub matches_local: bool,
}

/// One peer's replication engine: mirror, transport, authority tracking,
/// and (when elected) the authority simulation tick.
pub struct ReplicationEngine {
    link: RelayLink,
    world: WorldState,
    local_id: PeerId,
    session_name: String,
    coordinator: AuthorityCoordinator,
    optimizer: BandwidthOptimizer,
    /// Read-only mirror of the relay-stored property bag.
    properties: BTreeMap<String, String>,
    peer_names: BTreeMap<PeerId, String>,
    peer_focus: BTreeMap<PeerId, Vec3>,
    /// Authority-side regrowth schedule: node position -> due time.
    regrowth_due: BTreeMap<GridPos, u64>,
    /// Entities whose descriptive fields changed since the last publish.
    /// Hash order never leaks out: ids are sorted before queueing.
    dirty_structures: FxHashSet<u64>,
    dirty_resources: FxHashSet<u64>,
    events: Vec<WorldEvent>,
    last_snapshot: Option<SnapshotReport>,
    last_stream_tick: Option<u64>,
    /// Set when a hand-off elected us; consumed by the next pump.
    pending_takeover: bool,
    frame_tick: u64,
    next_ping_nonce: u64,
    pings_in_flight: BTreeMap<u64, u64>,
    last_ping_ms: Option<u64>,
}

impl ReplicationEngine {
    /// Connect to a relay and set up the local mirror. The config must be
    /// identical on every peer (the relay enforces this by hash).
    pub fn connect(
        addr: &str,
        peer_name: &str,
        config: WorldConfig,
        session_password: Option<String>,
    ) -> Result<Self, EngineError> {
        let config_hash = config.config_hash();
        let mut world = WorldState::new(config)?;
        let (link, welcome) = RelayLink::connect(
            addr,
            peer_name,
            WORLD_VERSION_HASH,
            config_hash,
            session_password,
        )?;

        let local_id = PeerId(welcome.actor_id.0);
        let mut peer_names = BTreeMap::new();
        for peer in &welcome.peers {
            world.insert_peer(PeerId(peer.id.0));
            peer_names.insert(PeerId(peer.id.0), peer.name.clone());
        }

        let mut coordinator = AuthorityCoordinator::new();
        let authority = coordinator.establish(world.peers());
        world.set_authority(authority);
        info!(
            "{local_id} joined session '{}' ({} peers, authority {authority:?})",
            welcome.session_name,
            welcome.peers.len(),
        );

        // A founding peer is authority from the start; announce on first pump.
        let pending_takeover = authority == Some(local_id);

        Ok(Self {
            link,
            world,
            local_id,
            session_name: welcome.session_name,
            coordinator,
            optimizer: BandwidthOptimizer::new(),
            properties: BTreeMap::new(),
            peer_names,
            peer_focus: BTreeMap::new(),
            regrowth_due: BTreeMap::new(),
            dirty_structures: FxHashSet::default(),
            dirty_resources: FxHashSet::default(),
            events: Vec::new(),
            last_snapshot: None,
            last_stream_tick: None,
            pending_takeover,
            frame_tick: 0,
            next_ping_nonce: 0,
            pings_in_flight: BTreeMap::new(),
            last_ping_ms: None,
        })
    }

    /// One cooperative update step. `now_ms` is the caller's monotonic
    /// clock; it only ever needs to move forward.
    pub fn pump(&mut self, now_ms: u64) {
        for msg in self.link.poll() {
            self.handle_message(msg, now_ms);
        }
        if self.pending_takeover {
            self.complete_takeover(now_ms);
        }
        if self.is_authority() {
            self.authority_tick(now_ms);
        }
        self.maybe_ping(now_ms);
    }

    // -- collaborator-facing API --------------------------------------------

    /// Ask for a structure at `position`. The build happens (or is rejected)
    /// when the command comes back in session order.
    pub fn request_build(
        &mut self,
        position: Vec3,
        rotation: Quat,
        kind: StructureKind,
    ) -> Result<(), EngineError> {
        self.send_action(WorldAction::Build {
            position,
            rotation,
            kind,
        })
    }

    /// Ask to retire a structure.
    pub fn request_destroy(&mut self, structure_id: StructureId) -> Result<(), EngineError> {
        self.send_action(WorldAction::Destroy { structure_id })
    }

    /// Ask to harvest up to `amount` at `position`.
    pub fn request_harvest(&mut self, position: GridPos, amount: u32) -> Result<(), EngineError> {
        self.send_action(WorldAction::Harvest { position, amount })
    }

    /// Regenerate a node explicitly. Authority-only path.
    pub fn request_regenerate(
        &mut self,
        position: GridPos,
        kind: ResourceKind,
        amount: u32,
    ) -> Result<(), EngineError> {
        if !self.is_authority() {
            return Err(EngineError::NotAuthority);
        }
        self.send_action(WorldAction::Regenerate {
            position,
            kind,
            amount,
        })
    }

    /// Report this peer's point of interest for relevance filtering.
    pub fn set_focus(&mut self, position: Vec3) -> Result<(), EngineError> {
        self.peer_focus.insert(self.local_id, position);
        self.link
            .send_focus([position.x, position.y, position.z])
            .map_err(EngineError::from)
    }

    /// Authority-side volatile-transform hook for excluded collaborator
    /// modules (physics settle and the like). The change reaches other peers
    /// on the next streamed frame. No-op on non-authority peers.
    pub fn set_structure_motion(&mut self, id: StructureId, position: Vec3, rotation: Quat) -> bool {
        if !self.is_authority() {
            return false;
        }
        self.world.store.set_structure_motion(id, position, rotation)
    }

    /// Announce a graceful departure.
    pub fn disconnect(&mut self) {
        self.link.disconnect();
    }

    // -- read-only views ----------------------------------------------------

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn is_authority(&self) -> bool {
        self.world.authority() == Some(self.local_id)
    }

    pub fn authority(&self) -> Option<PeerId> {
        self.world.authority()
    }

    pub fn statistics(&self) -> WorldStatistics {
        self.world.statistics()
    }

    pub fn peer_name(&self, peer: PeerId) -> Option<&str> {
        self.peer_names.get(&peer).map(String::as_str)
    }

    /// The mirrored property bag.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn network_quality(&self) -> NetworkQuality {
        self.optimizer.quality()
    }

    pub fn last_snapshot(&self) -> Option<SnapshotReport> {
        self.last_snapshot
    }

    /// Tick of the newest streamed frame applied to this mirror.
    pub fn last_stream_tick(&self) -> Option<u64> {
        self.last_stream_tick
    }

    /// Take all world events accumulated since the last drain.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    // -- message handling ---------------------------------------------------

    fn send_action(&mut self, action: WorldAction) -> Result<(), EngineError> {
        let cmd = WorldCommand {
            issuer: self.local_id,
            action,
        };
        self.link.send_command(&cmd.encode())?;
        Ok(())
    }

    fn handle_message(&mut self, msg: ServerMessage, now_ms: u64) {
        match msg {
            ServerMessage::Command { issuer, payload, .. } => {
                self.handle_command(issuer, &payload, now_ms);
            }
            ServerMessage::StreamFrame { from, payload } => {
                self.handle_stream_frame(from, &payload);
            }
            ServerMessage::PropertyUpdate { entries } => {
                for entry in entries {
                    if !self.world.apply_property(&entry.key, &entry.value) {
                        debug!("ignoring unusable property entry '{}'", entry.key);
                    }
                    self.properties.insert(entry.key, entry.value);
                }
            }
            ServerMessage::SnapshotSync {
                from,
                tile_count,
                structure_count,
                resource_count,
            } => {
                let stats = self.world.statistics();
                let matches_local = stats.tile_count as u64 == tile_count
                    && stats.structure_count as u64 == structure_count
                    && stats.resource_count as u64 == resource_count;
                if matches_local {
                    info!("snapshot sync from {}: mirrors converged", PeerId(from.0));
                } else {
                    warn!(
                        "snapshot sync from {} disagrees with mirror: \
                         theirs {tile_count}/{structure_count}/{resource_count}, \
                         ours {}/{}/{}",
                        PeerId(from.0),
                        stats.tile_count,
                        stats.structure_count,
                        stats.resource_count,
                    );
                }
                self.last_snapshot = Some(SnapshotReport {
                    from: PeerId(from.0),
                    tile_count,
                    structure_count,
                    resource_count,
                    matches_local,
                });
            }
            ServerMessage::PeerJoined { peer } => {
                let id = PeerId(peer.id.0);
                info!("{id} ('{}') joined", peer.name);
                self.world.insert_peer(id);
                self.peer_names.insert(id, peer.name);
                // A joiner never displaces a live authority: ids are
                // monotonic, so the joiner's id is the highest in the set.
            }
            ServerMessage::PeerLeft { actor_id, name } => {
                self.handle_peer_left(PeerId(actor_id.0), &name);
            }
            ServerMessage::Focus { from, position } => {
                self.peer_focus.insert(
                    PeerId(from.0),
                    Vec3::new(position[0], position[1], position[2]),
                );
            }
            ServerMessage::Pong { nonce } => {
                if let Some(sent_at) = self.pings_in_flight.remove(&nonce) {
                    let rtt = now_ms.saturating_sub(sent_at);
                    let peer_count = self.world.peers().len();
                    self.optimizer.record_rtt(rtt, peer_count, now_ms);
                }
            }
            ServerMessage::Welcome { .. } | ServerMessage::Rejected { .. } => {
                debug!("ignoring stray handshake message after join");
            }
        }
    }

    fn handle_command(&mut self, issuer: ActorId, payload: &[u8], now_ms: u64) {
        let mut cmd = match WorldCommand::decode(payload) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("dropping malformed command from {}: {e}", PeerId(issuer.0));
                return;
            }
        };
        // The transport-stamped sender wins over whatever the payload claims.
        cmd.issuer = PeerId(issuer.0);
        match self.world.apply(&cmd) {
            Ok(event) => {
                self.note_event(&event, now_ms);
                self.events.push(event);
            }
            Err(rejection) => {
                debug!("rejected command from {}: {rejection}", cmd.issuer);
                self.events.push(WorldEvent::CommandRejected {
                    issuer: cmd.issuer,
                    rejection,
                });
            }
        }
    }

    fn handle_stream_frame(&mut self, from: ActorId, payload: &[u8]) {
        // Only the authority streams; anything else is stale or confused.
        if self.world.authority() != Some(PeerId(from.0)) {
            debug!("ignoring stream frame from non-authority {}", PeerId(from.0));
            return;
        }
        match StreamFrame::decode(payload) {
            Ok(frame) => {
                self.world.apply_frame(&frame);
                self.last_stream_tick = Some(frame.tick);
            }
            Err(e) => {
                // The whole frame is dropped; no partial application.
                warn!("dropping malformed stream frame: {e}");
            }
        }
    }

    fn handle_peer_left(&mut self, departed: PeerId, name: &str) {
        info!("{departed} ('{name}') left");
        self.world.remove_peer(departed);
        self.peer_names.remove(&departed);
        self.peer_focus.remove(&departed);

        if self.coordinator.begin_migration(departed) {
            let elected = self.coordinator.elect(self.world.peers());
            self.world.set_authority(elected);
            match elected {
                Some(peer) if peer == self.local_id => {
                    info!("authority hand-off: this peer takes over");
                    self.pending_takeover = true;
                }
                Some(peer) => info!("authority hand-off: {peer} takes over"),
                None => info!("last peer left; no authority"),
            }
        }
    }

    /// Mark dirty entities and maintain the regrowth schedule from an
    /// accepted command's outcome.
    fn note_event(&mut self, event: &WorldEvent, now_ms: u64) {
        match event {
            WorldEvent::StructureBuilt { id, .. }
            | WorldEvent::StructureDestroyed { id, .. } => {
                self.dirty_structures.insert(id.0);
            }
            WorldEvent::ResourceHarvested {
                position,
                kind,
                depleted,
                ..
            } => {
                if let Some(node) = self.world.store.resource(*position) {
                    self.dirty_resources.insert(node.id.0);
                }
                if *depleted {
                    let delay = self.world.registry.resource_spec(*kind).regrowth_delay_ms;
                    self.regrowth_due.insert(*position, now_ms + delay);
                }
            }
            WorldEvent::ResourceRegenerated { position, .. } => {
                if let Some(node) = self.world.store.resource(*position) {
                    self.dirty_resources.insert(node.id.0);
                }
                self.regrowth_due.remove(position);
            }
            WorldEvent::CommandRejected { .. } => {}
        }
    }

    // -- authority duties ---------------------------------------------------

    /// First pump after becoming the authority: announce convergence counts,
    /// republish the full property bag, and rebuild the regrowth schedule
    /// from the mirror.
    fn complete_takeover(&mut self, now_ms: u64) {
        self.pending_takeover = false;
        let stats = self.world.statistics();
        info!(
            "announcing authority takeover: {}/{}/{} tiles/structures/resources",
            stats.tile_count, stats.structure_count, stats.resource_count,
        );
        if let Err(e) = self.link.send_snapshot_sync(
            stats.tile_count as u64,
            stats.structure_count as u64,
            stats.resource_count as u64,
        ) {
            warn!("snapshot sync send failed: {e}");
        }

        // Full publish so the bag reflects this mirror even if the previous
        // authority died mid-flush. Last writer wins on every key.
        for structure in self.world.store.structures() {
            for (key, value) in property::structure_entries(structure) {
                self.optimizer.queue_property(PropertyEntry { key, value });
            }
        }
        for node in self.world.store.resources() {
            for (key, value) in property::resource_entries(node) {
                self.optimizer.queue_property(PropertyEntry { key, value });
            }
        }

        let missing: Vec<(GridPos, ResourceKind)> = self
            .world
            .store
            .resources()
            .filter(|n| n.depleted && !self.regrowth_due.contains_key(&n.position))
            .map(|n| (n.position, n.kind))
            .collect();
        for (position, kind) in missing {
            let delay = self.world.registry.resource_spec(kind).regrowth_delay_ms;
            self.regrowth_due.insert(position, now_ms + delay);
        }
    }

    /// The simulation tick, run only while this peer is the authority.
    fn authority_tick(&mut self, now_ms: u64) {
        // Regrowth: depleted nodes whose delay elapsed come back through the
        // ordinary command channel, so every mirror applies them identically.
        let due: Vec<GridPos> = self
            .regrowth_due
            .iter()
            .filter(|&(_, &at)| at <= now_ms)
            .map(|(&pos, _)| pos)
            .collect();
        for position in due {
            self.regrowth_due.remove(&position);
            let Some((kind, amount)) = self
                .world
                .store
                .resource(position)
                .filter(|n| n.depleted)
                .map(|n| (n.kind, self.world.registry.resource_spec(n.kind).regrowth_amount))
            else {
                continue;
            };
            let cmd = WorldCommand {
                issuer: self.local_id,
                action: WorldAction::Regenerate {
                    position,
                    kind,
                    amount,
                },
            };
            if let Err(e) = self.link.send_command(&cmd.encode()) {
                warn!("regrowth command send failed: {e}");
            }
        }

        // Property channel: dirty entities enter the pending queue in id
        // order; the optimizer decides when the batch goes out.
        if !self.dirty_structures.is_empty() {
            let mut ids: Vec<u64> = self.dirty_structures.drain().collect();
            ids.sort_unstable();
            for raw in ids {
                if let Some(s) = self.world.store.structure(StructureId(raw)) {
                    for (key, value) in property::structure_entries(s) {
                        self.optimizer.queue_property(PropertyEntry { key, value });
                    }
                }
            }
        }
        if !self.dirty_resources.is_empty() {
            let mut ids: Vec<u64> = self.dirty_resources.drain().collect();
            ids.sort_unstable();
            for raw in ids {
                if let Some(n) = self.world.store.resource_by_id(ResourceId(raw)) {
                    for (key, value) in property::resource_entries(n) {
                        self.optimizer.queue_property(PropertyEntry { key, value });
                    }
                }
            }
        }
        if let Some(batch) = self.optimizer.take_due_properties(now_ms) {
            if let Err(e) = self.link.send_properties(batch) {
                warn!("property publish failed: {e}");
            }
        }

        // Streamed channel: one relevance-filtered frame per other peer.
        if self.optimizer.frame_due(now_ms) {
            self.frame_tick += 1;
            let settings = self.optimizer.settings();
            let targets: Vec<PeerId> = self
                .world
                .peers()
                .iter()
                .copied()
                .filter(|&p| p != self.local_id)
                .collect();
            for peer in targets {
                let focus = self.peer_focus.get(&peer).copied();
                let frame = build_frame(&self.world, focus, &settings, self.frame_tick);
                if let Err(e) = self
                    .link
                    .send_stream_frame(Some(ActorId(peer.0)), frame.encode())
                {
                    warn!("stream frame send to {peer} failed: {e}");
                }
            }
        }
    }

    fn maybe_ping(&mut self, now_ms: u64) {
        let due = match self.last_ping_ms {
            Some(last) => now_ms.saturating_sub(last) >= PING_INTERVAL_MS,
            None => true,
        };
        if !due {
            return;
        }
        self.last_ping_ms = Some(now_ms);
        let nonce = self.next_ping_nonce;
        self.next_ping_nonce += 1;
        self.pings_in_flight.insert(nonce, now_ms);
        while self.pings_in_flight.len() > MAX_PINGS_IN_FLIGHT {
            self.pings_in_flight.pop_first();
        }
        if let Err(e) = self.link.send_ping(nonce) {
            debug!("ping send failed: {e}");
        }
    }
}

/// Snapshot the volatile fields relevant to one peer: live entities inside
/// its relevance radius (or everything, for peers that never reported a
/// focus), capped at the batch limit. The cap rotates with the frame tick so
/// a crowded world still cycles every entity through the stream.
fn build_frame(
    world: &WorldState,
    focus: Option<Vec3>,
    settings: &OptimizerSettings,
    tick: u64,
) -> StreamFrame {
    let radius_sq = settings.relevance_radius * settings.relevance_radius;
    let in_range = |pos: Vec3| focus.is_none_or(|f| pos.distance_sq(f) <= radius_sq);

    let mut structures: Vec<StructureMotion> = world
        .store
        .structures()
        .filter(|s| !s.destroyed && in_range(s.position))
        .map(|s| StructureMotion {
            id: s.id,
            position: s.position,
            rotation: s.rotation,
        })
        .collect();
    clamp_rotating(&mut structures, settings.batch_limit, tick);

    let mut resources: Vec<ResourceMarker> = world
        .store
        .resources()
        .filter(|n| !n.depleted && in_range(Vec3::from(n.position)))
        .map(|n| ResourceMarker {
            id: n.id,
            position: n.position,
        })
        .collect();
    clamp_rotating(&mut resources, settings.batch_limit, tick);

    StreamFrame {
        tick,
        structures,
        resources,
    }
}

fn clamp_rotating<T>(entries: &mut Vec<T>, limit: usize, tick: u64) {
    if entries.len() > limit {
        let start = (tick as usize) % entries.len();
        entries.rotate_left(start);
        entries.truncate(limit);
    }
}
