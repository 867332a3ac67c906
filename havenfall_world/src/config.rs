// Data-driven world configuration.
//
// All tunable world parameters live in `WorldConfig`, loadable from JSON.
// In a session every peer must run an identical config — command replay is
// only deterministic if capacity limits, descriptors, and seeded nodes agree
// everywhere. That is enforced at the relay handshake by comparing
// `config_hash()` values.
//
// Structure and resource descriptors are plain lists here; `registry.rs`
// turns them into validated kind-keyed maps at startup.
//
// See also: `registry.rs` for descriptor validation, `world.rs` which owns
// the config as part of `WorldState`.

use crate::registry::{ResourceSpec, StructureSpec};
use crate::types::{GridPos, ResourceKind, StructureKind, TerrainType};
use const_fnv1a_hash::fnv1a_hash_str_64;
use serde::{Deserialize, Serialize};

/// A resource node placed at world initialization. Seeding goes through the
/// same regeneration path the authority uses at runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedResource {
    pub position: GridPos,
    pub kind: ResourceKind,
    pub amount: u32,
}

/// Complete world configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Terrain grid extent: (x, z) tile counts. Tiles sit at y = 0.
    pub grid_size: (u32, u32),
    /// Terrain assigned to every tile at initialization.
    pub default_terrain: TerrainType,
    /// Maximum number of non-destroyed structures in the world. Build
    /// requests beyond this are rejected with `CapacityExceeded`.
    pub max_active_structures: u32,
    /// Structure descriptors; must cover every `StructureKind` exactly once.
    pub structure_specs: Vec<StructureSpec>,
    /// Resource descriptors; must cover every `ResourceKind` exactly once.
    pub resource_specs: Vec<ResourceSpec>,
    /// Resource nodes created at world initialization.
    pub seed_resources: Vec<SeedResource>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            grid_size: (32, 32),
            default_terrain: TerrainType::Grass,
            max_active_structures: 256,
            structure_specs: vec![
                StructureSpec {
                    kind: StructureKind::Foundation,
                    max_health: 500.0,
                },
                StructureSpec {
                    kind: StructureKind::Wall,
                    max_health: 300.0,
                },
                StructureSpec {
                    kind: StructureKind::Floor,
                    max_health: 200.0,
                },
                StructureSpec {
                    kind: StructureKind::Roof,
                    max_health: 200.0,
                },
                StructureSpec {
                    kind: StructureKind::DoorFrame,
                    max_health: 250.0,
                },
                StructureSpec {
                    kind: StructureKind::Campfire,
                    max_health: 80.0,
                },
            ],
            resource_specs: vec![
                ResourceSpec {
                    kind: ResourceKind::Wood,
                    regrowth_amount: 40,
                    regrowth_delay_ms: 60_000,
                },
                ResourceSpec {
                    kind: ResourceKind::Stone,
                    regrowth_amount: 30,
                    regrowth_delay_ms: 120_000,
                },
                ResourceSpec {
                    kind: ResourceKind::Fiber,
                    regrowth_amount: 20,
                    regrowth_delay_ms: 30_000,
                },
                ResourceSpec {
                    kind: ResourceKind::Berries,
                    regrowth_amount: 15,
                    regrowth_delay_ms: 45_000,
                },
            ],
            seed_resources: Vec::new(),
        }
    }
}

impl WorldConfig {
    /// FNV-1a hash of the serialized config, compared at the relay handshake
    /// so peers with diverging configs never enter the same session.
    pub fn config_hash(&self) -> u64 {
        // Serializing WorldConfig cannot fail: no maps with non-string keys,
        // no non-finite floats in a config that passed registry validation.
        let json = serde_json::to_string(self).unwrap_or_default();
        fnv1a_hash_str_64(&json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
