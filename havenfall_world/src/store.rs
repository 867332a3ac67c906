// Canonical entity store: tiles, structures, resource nodes.
//
// `EntityStore` holds the three entity maps and the monotonic id counters.
// Every mutator preserves the store invariants in a single call — there is
// no partially-applied state for callers to observe:
//
// - A tile's occupant, if set, references a non-destroyed structure whose
//   snapped position is that tile.
// - Structure and resource ids are never reused.
// - `0 <= amount <= max_amount` for every resource node, and
//   `depleted == (amount == 0)`.
// - At most one non-destroyed structure claims a given tile.
//
// Structures are retired in place (destroyed flag) rather than removed, so a
// late joiner replaying history can still resolve every id it hears about.
// Resource nodes are never removed either — only depleted and regenerated.
//
// Access is single-threaded by design: one peer process owns one store, and
// all mutation flows through command replay (see `world.rs`). Out-of-grid
// reads return `None`/`false`; mutators targeting missing entities are
// rejected by returning `None`/`false` rather than panicking.
//
// See also: `world.rs` for the validation layer on top of these mutators,
// `frame.rs` for volatile-field overwrites, `property.rs` for descriptive-
// field overwrites, `types.rs` for the id and enum types.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One cell of the fixed terrain grid. Created at world initialization,
/// mutated only by structure add/remove, never destroyed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tile {
    pub position: GridPos,
    pub terrain: TerrainType,
    /// The non-destroyed structure claiming this tile, if any.
    pub occupant: Option<StructureId>,
}

impl Tile {
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }
}

/// A player-built structure. Retired via the `destroyed` flag, never removed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Structure {
    pub id: StructureId,
    pub position: Vec3,
    pub rotation: Quat,
    pub kind: StructureKind,
    pub health: f32,
    pub destroyed: bool,
    pub owner: PeerId,
}

/// A harvestable resource node. Depleted in place and regenerated in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: ResourceId,
    pub position: GridPos,
    pub kind: ResourceKind,
    pub amount: u32,
    pub max_amount: u32,
    pub depleted: bool,
}

/// Derived counts over the store. Always computed, never cached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldStatistics {
    pub tile_count: usize,
    pub structure_count: usize,
    pub active_structure_count: usize,
    pub resource_count: usize,
}

/// The canonical entity maps. `BTreeMap` throughout so iteration order is
/// deterministic across every peer replaying the same command log.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntityStore {
    tiles: BTreeMap<GridPos, Tile>,
    structures: BTreeMap<StructureId, Structure>,
    resources: BTreeMap<GridPos, ResourceNode>,
    /// Secondary index for property-bag addressing: resource id -> position.
    resource_index: BTreeMap<ResourceId, GridPos>,
    next_structure_id: u64,
    next_resource_id: u64,
}

impl EntityStore {
    /// Lay out the fixed terrain grid: `size_x * size_z` tiles at y = 0.
    /// Called once at world initialization.
    pub fn init_grid(&mut self, size_x: u32, size_z: u32, terrain: TerrainType) {
        for x in 0..size_x as i32 {
            for z in 0..size_z as i32 {
                let position = GridPos::new(x, 0, z);
                self.tiles.insert(
                    position,
                    Tile {
                        position,
                        terrain,
                        occupant: None,
                    },
                );
            }
        }
    }

    // -- tiles --------------------------------------------------------------

    pub fn tile(&self, position: GridPos) -> Option<&Tile> {
        self.tiles.get(&position)
    }

    /// Whether a tile can NOT be claimed by a new structure. Positions
    /// outside the grid are never claimable and so count as occupied.
    pub fn is_position_occupied(&self, position: GridPos) -> bool {
        match self.tiles.get(&position) {
            Some(tile) => tile.is_occupied(),
            None => true,
        }
    }

    // -- structures ---------------------------------------------------------

    /// Insert a new structure and claim its tile. Returns `None` (without
    /// consuming an id) if the tile is occupied or outside the grid.
    pub fn add_structure(
        &mut self,
        position: Vec3,
        rotation: Quat,
        kind: StructureKind,
        owner: PeerId,
        max_health: f32,
    ) -> Option<StructureId> {
        let tile_pos = position.snapped();
        if self.is_position_occupied(tile_pos) {
            return None;
        }
        self.next_structure_id += 1;
        let id = StructureId(self.next_structure_id);
        self.structures.insert(
            id,
            Structure {
                id,
                position,
                rotation,
                kind,
                health: max_health,
                destroyed: false,
                owner,
            },
        );
        // is_position_occupied returned false, so the tile exists.
        if let Some(tile) = self.tiles.get_mut(&tile_pos) {
            tile.occupant = Some(id);
        }
        Some(id)
    }

    /// Retire a structure: set the destroyed flag and free its tile.
    /// Returns `false` for unknown or already-destroyed ids.
    pub fn remove_structure(&mut self, id: StructureId) -> bool {
        let Some(structure) = self.structures.get_mut(&id) else {
            return false;
        };
        if structure.destroyed {
            return false;
        }
        structure.destroyed = true;
        let tile_pos = structure.position.snapped();
        if let Some(tile) = self.tiles.get_mut(&tile_pos) {
            if tile.occupant == Some(id) {
                tile.occupant = None;
            }
        }
        true
    }

    pub fn structure(&self, id: StructureId) -> Option<&Structure> {
        self.structures.get(&id)
    }

    pub fn structures(&self) -> impl Iterator<Item = &Structure> {
        self.structures.values()
    }

    /// Overwrite a structure's volatile transform (streamed channel, or the
    /// authority-side physics hook). The tile claim established at build time
    /// is not re-derived — volatile motion is sub-tile jitter, not relocation.
    /// Returns `false` for unknown or destroyed ids.
    pub fn set_structure_motion(&mut self, id: StructureId, position: Vec3, rotation: Quat) -> bool {
        match self.structures.get_mut(&id) {
            Some(s) if !s.destroyed => {
                s.position = position;
                s.rotation = rotation;
                true
            }
            _ => false,
        }
    }

    /// Overwrite a structure's health (property channel). Returns `false`
    /// for unknown ids.
    pub fn set_structure_health(&mut self, id: StructureId, health: f32) -> bool {
        match self.structures.get_mut(&id) {
            Some(s) => {
                s.health = health;
                true
            }
            None => false,
        }
    }

    /// Overwrite a structure's kind (property channel). Returns `false` for
    /// unknown ids.
    pub fn set_structure_kind(&mut self, id: StructureId, kind: StructureKind) -> bool {
        match self.structures.get_mut(&id) {
            Some(s) => {
                s.kind = kind;
                true
            }
            None => false,
        }
    }

    // -- resources ----------------------------------------------------------

    pub fn resource(&self, position: GridPos) -> Option<&ResourceNode> {
        self.resources.get(&position)
    }

    pub fn resource_by_id(&self, id: ResourceId) -> Option<&ResourceNode> {
        self.resource_index
            .get(&id)
            .and_then(|pos| self.resources.get(pos))
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceNode> {
        self.resources.values()
    }

    /// Whether a harvest of `amount` can be fully served at `position`.
    pub fn is_resource_available(&self, position: GridPos, amount: u32) -> bool {
        match self.resources.get(&position) {
            Some(node) => !node.depleted && amount <= node.amount,
            None => false,
        }
    }

    /// Drain up to `amount` from the node at `position`, clamping to what
    /// remains. Returns the quantity actually removed, or `None` if there is
    /// no node, the node is depleted, or `amount` is zero.
    pub fn harvest(&mut self, position: GridPos, amount: u32) -> Option<u32> {
        let node = self.resources.get_mut(&position)?;
        if node.depleted || amount == 0 {
            return None;
        }
        let removed = amount.min(node.amount);
        node.amount -= removed;
        node.depleted = node.amount == 0;
        Some(removed)
    }

    /// Create or reset the node at `position` with the given kind and amount.
    /// `max_amount` is set to the supplied amount so the amount invariant
    /// holds for any value the authority chooses. Returns the node's id.
    pub fn regenerate(&mut self, position: GridPos, kind: ResourceKind, amount: u32) -> ResourceId {
        if let Some(node) = self.resources.get_mut(&position) {
            node.kind = kind;
            node.amount = amount;
            node.max_amount = amount;
            node.depleted = amount == 0;
            return node.id;
        }
        self.next_resource_id += 1;
        let id = ResourceId(self.next_resource_id);
        self.resources.insert(
            position,
            ResourceNode {
                id,
                position,
                kind,
                amount,
                max_amount: amount,
                depleted: amount == 0,
            },
        );
        self.resource_index.insert(id, position);
        id
    }

    /// Move a node to a new grid key (streamed channel echo whose position
    /// diverged from ours). Skipped if the target key is already taken by a
    /// different node. Returns `true` if the node ended up at `new_position`.
    pub fn rehome_resource(&mut self, id: ResourceId, new_position: GridPos) -> bool {
        let Some(&old_position) = self.resource_index.get(&id) else {
            return false;
        };
        if old_position == new_position {
            return true;
        }
        if self.resources.contains_key(&new_position) {
            return false;
        }
        if let Some(mut node) = self.resources.remove(&old_position) {
            node.position = new_position;
            self.resources.insert(new_position, node);
            self.resource_index.insert(id, new_position);
            return true;
        }
        false
    }

    /// Overwrite a node's kind (property channel).
    pub fn set_resource_kind(&mut self, id: ResourceId, kind: ResourceKind) -> bool {
        let Some(&pos) = self.resource_index.get(&id) else {
            return false;
        };
        match self.resources.get_mut(&pos) {
            Some(node) => {
                node.kind = kind;
                true
            }
            None => false,
        }
    }

    /// Overwrite a node's amount (property channel). Raises `max_amount` if
    /// needed and re-derives the depleted flag, keeping the invariants intact
    /// whatever the published value is.
    pub fn set_resource_amount(&mut self, id: ResourceId, amount: u32) -> bool {
        let Some(&pos) = self.resource_index.get(&id) else {
            return false;
        };
        match self.resources.get_mut(&pos) {
            Some(node) => {
                node.amount = amount;
                node.max_amount = node.max_amount.max(amount);
                node.depleted = amount == 0;
                true
            }
            None => false,
        }
    }

    /// Force a node into the depleted state (property channel). A published
    /// `Depleted = false` carries no amount and is ignored — the paired
    /// amount entry restores the node instead.
    pub fn set_resource_depleted(&mut self, id: ResourceId, depleted: bool) -> bool {
        if !depleted {
            return false;
        }
        let Some(&pos) = self.resource_index.get(&id) else {
            return false;
        };
        match self.resources.get_mut(&pos) {
            Some(node) => {
                node.amount = 0;
                node.depleted = true;
                true
            }
            None => false,
        }
    }

    // -- statistics ---------------------------------------------------------

    /// Derived counts, recomputed on every call.
    pub fn statistics(&self) -> WorldStatistics {
        WorldStatistics {
            tile_count: self.tiles.len(),
            structure_count: self.structures.len(),
            active_structure_count: self
                .structures
                .values()
                .filter(|s| !s.destroyed)
                .count(),
            resource_count: self.resources.len(),
        }
    }

    /// Count of non-destroyed structures, used by the build capacity check.
    pub fn active_structure_count(&self) -> usize {
        self.structures.values().filter(|s| !s.destroyed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_grid() -> EntityStore {
        let mut store = EntityStore::default();
        store.init_grid(8, 8, TerrainType::Grass);
        store
    }

    #[test]
    fn grid_init_creates_tiles_at_ground_level() {
        let store = store_with_grid();
        assert_eq!(store.statistics().tile_count, 64);
        let tile = store.tile(GridPos::new(3, 0, 5)).unwrap();
        assert_eq!(tile.terrain, TerrainType::Grass);
        assert!(!tile.is_occupied());
        assert!(store.tile(GridPos::new(3, 1, 5)).is_none());
    }

    #[test]
    fn out_of_grid_positions_are_never_claimable() {
        let store = store_with_grid();
        assert!(store.is_position_occupied(GridPos::new(-1, 0, 0)));
        assert!(store.is_position_occupied(GridPos::new(100, 0, 100)));
    }

    #[test]
    fn add_structure_claims_tile_and_assigns_increasing_ids() {
        let mut store = store_with_grid();
        let a = store
            .add_structure(
                Vec3::new(2.0, 0.0, 2.0),
                Quat::IDENTITY,
                StructureKind::Wall,
                PeerId(7),
                100.0,
            )
            .unwrap();
        let b = store
            .add_structure(
                Vec3::new(3.0, 0.0, 2.0),
                Quat::IDENTITY,
                StructureKind::Wall,
                PeerId(7),
                100.0,
            )
            .unwrap();
        assert!(b > a);
        assert!(store.is_position_occupied(GridPos::new(2, 0, 2)));
        assert_eq!(
            store.tile(GridPos::new(2, 0, 2)).unwrap().occupant,
            Some(a)
        );
        assert_eq!(store.structure(a).unwrap().owner, PeerId(7));
    }

    #[test]
    fn occupied_tile_does_not_consume_an_id() {
        let mut store = store_with_grid();
        let first = store
            .add_structure(
                Vec3::new(2.0, 0.0, 2.0),
                Quat::IDENTITY,
                StructureKind::Wall,
                PeerId(1),
                100.0,
            )
            .unwrap();
        assert!(
            store
                .add_structure(
                    Vec3::new(2.2, 0.0, 1.8),
                    Quat::IDENTITY,
                    StructureKind::Floor,
                    PeerId(2),
                    50.0,
                )
                .is_none()
        );
        // Next successful build gets the very next id.
        let next = store
            .add_structure(
                Vec3::new(5.0, 0.0, 5.0),
                Quat::IDENTITY,
                StructureKind::Floor,
                PeerId(2),
                50.0,
            )
            .unwrap();
        assert_eq!(next.0, first.0 + 1);
    }

    #[test]
    fn remove_structure_frees_tile_but_keeps_entry() {
        let mut store = store_with_grid();
        let id = store
            .add_structure(
                Vec3::new(4.0, 0.0, 4.0),
                Quat::IDENTITY,
                StructureKind::Campfire,
                PeerId(1),
                40.0,
            )
            .unwrap();
        assert!(store.remove_structure(id));
        assert!(!store.is_position_occupied(GridPos::new(4, 0, 4)));
        assert!(store.structure(id).unwrap().destroyed);
        // Retiring twice is rejected.
        assert!(!store.remove_structure(id));
        // The id is not freed for reuse.
        let next = store
            .add_structure(
                Vec3::new(4.0, 0.0, 4.0),
                Quat::IDENTITY,
                StructureKind::Campfire,
                PeerId(1),
                40.0,
            )
            .unwrap();
        assert!(next > id);
    }

    #[test]
    fn motion_setter_skips_destroyed_structures() {
        let mut store = store_with_grid();
        let id = store
            .add_structure(
                Vec3::new(1.0, 0.0, 1.0),
                Quat::IDENTITY,
                StructureKind::Wall,
                PeerId(1),
                100.0,
            )
            .unwrap();
        assert!(store.set_structure_motion(id, Vec3::new(1.1, 0.0, 1.0), Quat::IDENTITY));
        assert_eq!(store.structure(id).unwrap().position.x, 1.1);
        store.remove_structure(id);
        assert!(!store.set_structure_motion(id, Vec3::new(9.0, 0.0, 9.0), Quat::IDENTITY));
    }

    #[test]
    fn harvest_clamps_to_remaining() {
        let mut store = store_with_grid();
        let pos = GridPos::new(3, 0, 3);
        store.regenerate(pos, ResourceKind::Wood, 10);
        assert_eq!(store.harvest(pos, 15), Some(10));
        let node = store.resource(pos).unwrap();
        assert_eq!(node.amount, 0);
        assert!(node.depleted);
        // Depleted node: no-op.
        assert_eq!(store.harvest(pos, 1), None);
    }

    #[test]
    fn harvest_partial_leaves_remainder() {
        let mut store = store_with_grid();
        let pos = GridPos::new(3, 0, 3);
        store.regenerate(pos, ResourceKind::Stone, 10);
        assert_eq!(store.harvest(pos, 4), Some(4));
        let node = store.resource(pos).unwrap();
        assert_eq!(node.amount, 6);
        assert!(!node.depleted);
    }

    #[test]
    fn harvest_zero_is_rejected() {
        let mut store = store_with_grid();
        let pos = GridPos::new(3, 0, 3);
        store.regenerate(pos, ResourceKind::Fiber, 5);
        assert_eq!(store.harvest(pos, 0), None);
        assert_eq!(store.resource(pos).unwrap().amount, 5);
    }

    #[test]
    fn regenerate_resets_in_place_and_keeps_id() {
        let mut store = store_with_grid();
        let pos = GridPos::new(6, 0, 1);
        let id = store.regenerate(pos, ResourceKind::Berries, 8);
        store.harvest(pos, 8);
        assert!(store.resource(pos).unwrap().depleted);
        let id_again = store.regenerate(pos, ResourceKind::Berries, 12);
        assert_eq!(id, id_again);
        let node = store.resource(pos).unwrap();
        assert_eq!(node.amount, 12);
        assert_eq!(node.max_amount, 12);
        assert!(!node.depleted);
    }

    #[test]
    fn resource_ids_are_unique_and_indexed() {
        let mut store = store_with_grid();
        let a = store.regenerate(GridPos::new(1, 0, 1), ResourceKind::Wood, 5);
        let b = store.regenerate(GridPos::new(2, 0, 1), ResourceKind::Stone, 5);
        assert_ne!(a, b);
        assert_eq!(store.resource_by_id(a).unwrap().position, GridPos::new(1, 0, 1));
        assert_eq!(store.resource_by_id(b).unwrap().kind, ResourceKind::Stone);
    }

    #[test]
    fn rehome_moves_node_unless_target_taken() {
        let mut store = store_with_grid();
        let a = store.regenerate(GridPos::new(1, 0, 1), ResourceKind::Wood, 5);
        store.regenerate(GridPos::new(2, 0, 2), ResourceKind::Stone, 5);
        assert!(!store.rehome_resource(a, GridPos::new(2, 0, 2)));
        assert!(store.rehome_resource(a, GridPos::new(3, 0, 3)));
        assert_eq!(store.resource_by_id(a).unwrap().position, GridPos::new(3, 0, 3));
        assert!(store.resource(GridPos::new(1, 0, 1)).is_none());
    }

    #[test]
    fn statistics_counts_active_separately() {
        let mut store = store_with_grid();
        let id = store
            .add_structure(
                Vec3::new(1.0, 0.0, 1.0),
                Quat::IDENTITY,
                StructureKind::Wall,
                PeerId(1),
                100.0,
            )
            .unwrap();
        store
            .add_structure(
                Vec3::new(2.0, 0.0, 1.0),
                Quat::IDENTITY,
                StructureKind::Wall,
                PeerId(1),
                100.0,
            )
            .unwrap();
        store.remove_structure(id);
        store.regenerate(GridPos::new(5, 0, 5), ResourceKind::Wood, 10);
        let stats = store.statistics();
        assert_eq!(stats.tile_count, 64);
        assert_eq!(stats.structure_count, 2);
        assert_eq!(stats.active_structure_count, 1);
        assert_eq!(stats.resource_count, 1);
    }

    #[test]
    fn depleted_property_overwrite_keeps_invariant() {
        let mut store = store_with_grid();
        let id = store.regenerate(GridPos::new(1, 0, 1), ResourceKind::Wood, 5);
        assert!(store.set_resource_depleted(id, true));
        let node = store.resource_by_id(id).unwrap();
        assert_eq!(node.amount, 0);
        assert!(node.depleted);
        // Un-depleting without an amount is ignored.
        assert!(!store.set_resource_depleted(id, false));
        assert!(store.resource_by_id(id).unwrap().depleted);
        // An amount overwrite restores the node and re-derives the flag.
        assert!(store.set_resource_amount(id, 3));
        let node = store.resource_by_id(id).unwrap();
        assert_eq!(node.amount, 3);
        assert!(!node.depleted);
    }
}
