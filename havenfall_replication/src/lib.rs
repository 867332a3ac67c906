// havenfall_replication — the peer-side replication engine.
//
// One `ReplicationEngine` per peer process: it owns the `WorldState` mirror,
// a TCP link to the relay, and everything needed to keep the mirror
// convergent — command replay, stream-frame application, property mirroring,
// authority election, and (when this peer is the authority) the simulation
// tick and bandwidth-adaptive fan-out.
//
// Module overview:
// - `link.rs`:      RelayLink — blocking connect/handshake, reader thread,
//                   non-blocking poll, typed sends.
// - `engine.rs`:    ReplicationEngine — the pump loop and collaborator API.
// - `authority.rs`: AuthorityCoordinator — lowest-surviving-id election.
// - `optimizer.rs`: BandwidthOptimizer — quality tiers and replication
//                   tunables.
//
// The hosting process drives everything from `pump(now_ms)` on its update
// loop; nothing here spawns work besides the link's reader thread, and
// nothing blocks.

pub mod authority;
pub mod engine;
pub mod link;
pub mod optimizer;

pub use authority::{AuthorityCoordinator, AuthorityState};
pub use engine::{EngineError, ReplicationEngine, SnapshotReport};
pub use link::{LinkError, RelayLink, WelcomeInfo};
pub use optimizer::{BandwidthOptimizer, NetworkQuality, OptimizerSettings};
