// Core types shared across the world state.
//
// Defines spatial coordinates (`GridPos` for the tile lattice, `Vec3`/`Quat`
// for structure transforms), compact entity identifiers, and the world enums.
// All types derive `Serialize`/`Deserialize` — they cross the wire inside
// commands, streamed frames, and property entries.
//
// Entity IDs are monotonic counters assigned by `EntityStore`, never reused,
// so every peer replaying the same command log assigns the same IDs. Peer IDs
// mirror the relay's actor numbering (assigned from 1 upward in join order).
//
// **Critical constraint: determinism.** Nothing in here may read system time,
// OS entropy, or anything else outside the replicated inputs.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A position on the integer tile lattice. Tiles live at y = 0; resource
/// nodes may sit above terrain features.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A world-space position. Structure transforms are float-valued; the tile
/// claim a structure holds is derived by snapping to the nearest `GridPos`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The tile this position belongs to (component-wise round-to-nearest).
    pub fn snapped(self) -> GridPos {
        GridPos::new(
            self.x.round() as i32,
            self.y.round() as i32,
            self.z.round() as i32,
        )
    }

    /// Squared distance to another position. Used by relevance filtering,
    /// which only compares against a squared radius.
    pub fn distance_sq(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

impl From<GridPos> for Vec3 {
    fn from(p: GridPos) -> Self {
        Self::new(p.x as f32, p.y as f32, p.z as f32)
    }
}

/// A rotation, stored as quaternion components. The world core never
/// normalizes or composes rotations — it only stores and replicates them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ---------------------------------------------------------------------------
// Entity and peer identifiers
// ---------------------------------------------------------------------------

/// Identity of a peer in the session. Mirrors the relay's actor numbering:
/// assigned from 1 upward in join order, so the lowest live id is always the
/// longest-connected peer (the property authority election relies on).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer{}", self.0)
    }
}

/// Unique identifier for a structure. Monotonically assigned, never reused —
/// even a rejected build must not consume an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructureId(pub u64);

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "structure{}", self.0)
    }
}

/// Unique identifier for a resource node. Nodes are keyed by position in the
/// store; the id exists so property-bag entries can address a node stably.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// World enums
// ---------------------------------------------------------------------------

/// Terrain classification of a tile. Fixed at world initialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TerrainType {
    Grass,
    Dirt,
    Sand,
    Rock,
    Water,
}

/// Kinds of player-buildable structures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StructureKind {
    Foundation,
    Wall,
    Floor,
    Roof,
    DoorFrame,
    Campfire,
}

impl StructureKind {
    /// Every variant, for startup registry validation.
    pub const ALL: [StructureKind; 6] = [
        StructureKind::Foundation,
        StructureKind::Wall,
        StructureKind::Floor,
        StructureKind::Roof,
        StructureKind::DoorFrame,
        StructureKind::Campfire,
    ];

    /// Stable name used as a property-bag value.
    pub fn name(self) -> &'static str {
        match self {
            StructureKind::Foundation => "Foundation",
            StructureKind::Wall => "Wall",
            StructureKind::Floor => "Floor",
            StructureKind::Roof => "Roof",
            StructureKind::DoorFrame => "DoorFrame",
            StructureKind::Campfire => "Campfire",
        }
    }

    /// Inverse of [`name`](Self::name). Returns `None` for unknown names.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == s)
    }
}

/// Kinds of harvestable resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Wood,
    Stone,
    Fiber,
    Berries,
}

impl ResourceKind {
    /// Every variant, for startup registry validation.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Wood,
        ResourceKind::Stone,
        ResourceKind::Fiber,
        ResourceKind::Berries,
    ];

    /// Stable name used as a property-bag value.
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Wood => "Wood",
            ResourceKind::Stone => "Stone",
            ResourceKind::Fiber => "Fiber",
            ResourceKind::Berries => "Berries",
        }
    }

    /// Inverse of [`name`](Self::name). Returns `None` for unknown names.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == s)
    }
}
