// havenfall_world — canonical world state and mutation validation.
//
// This crate contains everything a peer needs to hold and mutate its copy of
// the shared world: the entity store, the command validators, the typed
// registry, the streamed-frame and property-bag encodings, and the config.
// It has zero networking dependencies and can be tested headless.
//
// Module overview:
// - `types.rs`:    GridPos/Vec3/Quat, entity and peer ids, world enums.
// - `store.rs`:    EntityStore — tiles, structures, resource nodes, stats.
// - `registry.rs`: Validated kind -> descriptor maps (startup-checked).
// - `command.rs`:  WorldCommand / WorldAction — the replicated mutations.
// - `world.rs`:    WorldState context object, validation, Rejection taxonomy.
// - `event.rs`:    WorldEvent narrative output.
// - `frame.rs`:    StreamFrame — volatile-field snapshots.
// - `property.rs`: Property-bag key vocabulary and mirror application.
// - `config.rs`:   WorldConfig + handshake hash.
//
// The companion crates `havenfall_replication` and `havenfall_relay` move
// this crate's data between peers; the protocol crate never sees these types
// (commands and frames cross the wire as opaque bytes).
//
// **Critical constraint: determinism.** Command application is a pure
// function of (state, command). All collections that feed replicated
// decisions are `BTreeMap`/`BTreeSet`; nothing here reads clocks, RNGs, or
// anything else outside the replicated inputs.

pub mod command;
pub mod config;
pub mod event;
pub mod frame;
pub mod property;
pub mod registry;
pub mod store;
pub mod types;
pub mod world;

use const_fnv1a_hash::fnv1a_hash_str_64;

/// Hash presented at the relay handshake so peers running different world
/// logic never join the same session.
pub const WORLD_VERSION_HASH: u64 =
    fnv1a_hash_str_64(concat!("havenfall_world/", env!("CARGO_PKG_VERSION")));
