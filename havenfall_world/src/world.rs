// World state and mutation validation.
//
// `WorldState` is the explicit context object one peer process owns: the
// entity store, the validated registry, the config, the known-peer set, and
// the current authority. There is no ambient global — the replication layer
// constructs one and passes it by reference wherever it is needed.
//
// `apply()` is the mutation validator. For each action it checks the
// preconditions in order, commits through the store's invariant-preserving
// mutators, and returns a `WorldEvent` — or a `Rejection`, in which case the
// store is untouched. Application is a deterministic pure function of
// (state, command): every peer replaying the same command sequence reaches
// the same store. That determinism is what lets "broadcast the command, let
// every peer recompute the result" substitute for a distributed lock.
//
// Membership and authority are fed in from transport events (`insert_peer`,
// `remove_peer`, `set_authority`) by the replication layer; validators only
// read them. Local player input never touches the store directly — it is
// sent as a command and applied when the transport delivers it back.
//
// See also: `store.rs` for the invariant-preserving mutators, `command.rs`
// for the action vocabulary, `event.rs` for outcomes, `frame.rs` /
// `property.rs` for the two non-command replication channels.

use crate::command::{WorldAction, WorldCommand};
use crate::config::WorldConfig;
use crate::event::WorldEvent;
use crate::registry::{Registry, RegistryError};
use crate::store::{EntityStore, WorldStatistics};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Why a command was dropped. Every rejection is locally recovered: the
/// command is ignored, state is unchanged, and a `CommandRejected` event is
/// the only trace.
#[derive(Clone, Copy, Debug, PartialEq, Error, Serialize, Deserialize)]
pub enum Rejection {
    #[error("requester {0} is not a known peer")]
    InvalidRequester(PeerId),
    #[error("tile {0} is already claimed")]
    PositionOccupied(GridPos),
    #[error("active structure limit {limit} reached")]
    CapacityExceeded { limit: u32 },
    #[error("{requester} owns neither {structure_id} nor the authority")]
    NotOwner {
        structure_id: StructureId,
        requester: PeerId,
    },
    #[error("no harvestable resource at {0}")]
    ResourceUnavailable(GridPos),
    #[error("{0} does not name a live structure")]
    UnknownStructure(StructureId),
}

/// The world one peer holds: canonical on the authority, a mirror elsewhere.
#[derive(Clone, Debug)]
pub struct WorldState {
    pub config: WorldConfig,
    pub registry: Registry,
    pub store: EntityStore,
    peers: BTreeSet<PeerId>,
    authority: Option<PeerId>,
}

impl WorldState {
    /// Build a fresh world: validate the registry, lay out the terrain grid,
    /// and seed the configured resource nodes through the regeneration path.
    pub fn new(config: WorldConfig) -> Result<Self, RegistryError> {
        let registry = Registry::from_config(&config)?;
        let mut store = EntityStore::default();
        store.init_grid(config.grid_size.0, config.grid_size.1, config.default_terrain);
        for seed in &config.seed_resources {
            store.regenerate(seed.position, seed.kind, seed.amount);
        }
        Ok(Self {
            config,
            registry,
            store,
            peers: BTreeSet::new(),
            authority: None,
        })
    }

    // -- membership and authority (fed from transport events) ---------------

    pub fn insert_peer(&mut self, peer: PeerId) {
        self.peers.insert(peer);
    }

    pub fn remove_peer(&mut self, peer: PeerId) {
        self.peers.remove(&peer);
    }

    pub fn is_known_peer(&self, peer: PeerId) -> bool {
        self.peers.contains(&peer)
    }

    pub fn peers(&self) -> &BTreeSet<PeerId> {
        &self.peers
    }

    pub fn set_authority(&mut self, authority: Option<PeerId>) {
        self.authority = authority;
    }

    pub fn authority(&self) -> Option<PeerId> {
        self.authority
    }

    // -- command application ------------------------------------------------

    /// Validate and apply one command. On rejection the store is unchanged.
    pub fn apply(&mut self, cmd: &WorldCommand) -> Result<WorldEvent, Rejection> {
        match &cmd.action {
            WorldAction::Build {
                position,
                rotation,
                kind,
            } => self.apply_build(cmd.issuer, *position, *rotation, *kind),
            WorldAction::Destroy { structure_id } => {
                self.apply_destroy(cmd.issuer, *structure_id)
            }
            WorldAction::Harvest { position, amount } => {
                self.apply_harvest(cmd.issuer, *position, *amount)
            }
            WorldAction::Regenerate {
                position,
                kind,
                amount,
            } => Ok(self.apply_regenerate(*position, *kind, *amount)),
        }
    }

    fn apply_build(
        &mut self,
        issuer: PeerId,
        position: Vec3,
        rotation: Quat,
        kind: StructureKind,
    ) -> Result<WorldEvent, Rejection> {
        if !self.is_known_peer(issuer) {
            return Err(Rejection::InvalidRequester(issuer));
        }
        let limit = self.config.max_active_structures;
        if self.store.active_structure_count() >= limit as usize {
            return Err(Rejection::CapacityExceeded { limit });
        }
        let tile = position.snapped();
        if self.store.is_position_occupied(tile) {
            return Err(Rejection::PositionOccupied(tile));
        }
        let max_health = self.registry.structure_spec(kind).max_health;
        // Preconditions all passed; the store mutator re-checks the tile and
        // only then consumes an id.
        match self
            .store
            .add_structure(position, rotation, kind, issuer, max_health)
        {
            Some(id) => Ok(WorldEvent::StructureBuilt {
                id,
                kind,
                tile,
                owner: issuer,
            }),
            None => Err(Rejection::PositionOccupied(tile)),
        }
    }

    fn apply_destroy(
        &mut self,
        issuer: PeerId,
        structure_id: StructureId,
    ) -> Result<WorldEvent, Rejection> {
        let structure = self
            .store
            .structure(structure_id)
            .filter(|s| !s.destroyed)
            .ok_or(Rejection::UnknownStructure(structure_id))?;
        let is_owner = structure.owner == issuer;
        let is_authority = self.authority == Some(issuer);
        if !is_owner && !is_authority {
            return Err(Rejection::NotOwner {
                structure_id,
                requester: issuer,
            });
        }
        self.store.remove_structure(structure_id);
        Ok(WorldEvent::StructureDestroyed {
            id: structure_id,
            by: issuer,
        })
    }

    fn apply_harvest(
        &mut self,
        issuer: PeerId,
        position: GridPos,
        amount: u32,
    ) -> Result<WorldEvent, Rejection> {
        if !self.is_known_peer(issuer) {
            return Err(Rejection::InvalidRequester(issuer));
        }
        let removed = self
            .store
            .harvest(position, amount)
            .ok_or(Rejection::ResourceUnavailable(position))?;
        // harvest() succeeded, so the node exists.
        let node = match self.store.resource(position) {
            Some(node) => node,
            None => return Err(Rejection::ResourceUnavailable(position)),
        };
        Ok(WorldEvent::ResourceHarvested {
            position,
            kind: node.kind,
            by: issuer,
            removed,
            depleted: node.depleted,
        })
    }

    fn apply_regenerate(
        &mut self,
        position: GridPos,
        kind: ResourceKind,
        amount: u32,
    ) -> WorldEvent {
        // Authority-only path by convention; carries no requester check.
        self.store.regenerate(position, kind, amount);
        WorldEvent::ResourceRegenerated {
            position,
            kind,
            amount,
        }
    }

    // -- derived views ------------------------------------------------------

    pub fn statistics(&self) -> WorldStatistics {
        self.store.statistics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_peers(peers: &[u32]) -> WorldState {
        let mut config = WorldConfig::default();
        config.grid_size = (16, 16);
        config.seed_resources.push(crate::config::SeedResource {
            position: GridPos::new(3, 0, 3),
            kind: ResourceKind::Wood,
            amount: 10,
        });
        let mut world = WorldState::new(config).unwrap();
        for &p in peers {
            world.insert_peer(PeerId(p));
        }
        world
    }

    fn build_cmd(issuer: u32, x: f32, z: f32) -> WorldCommand {
        WorldCommand {
            issuer: PeerId(issuer),
            action: WorldAction::Build {
                position: Vec3::new(x, 0.0, z),
                rotation: Quat::IDENTITY,
                kind: StructureKind::Wall,
            },
        }
    }

    #[test]
    fn build_on_empty_tile_succeeds() {
        let mut world = world_with_peers(&[7]);
        let event = world.apply(&build_cmd(7, 10.0, 5.0)).unwrap();
        let WorldEvent::StructureBuilt { id, tile, owner, .. } = event else {
            panic!("expected StructureBuilt, got {event:?}");
        };
        assert_eq!(id, StructureId(1));
        assert_eq!(tile, GridPos::new(10, 0, 5));
        assert_eq!(owner, PeerId(7));
        assert!(world.store.is_position_occupied(tile));
        let s = world.store.structure(id).unwrap();
        assert_eq!(s.kind, StructureKind::Wall);
        assert_eq!(s.health, 300.0);
    }

    #[test]
    fn build_from_unknown_peer_is_rejected() {
        let mut world = world_with_peers(&[7]);
        assert_eq!(
            world.apply(&build_cmd(9, 1.0, 1.0)).unwrap_err(),
            Rejection::InvalidRequester(PeerId(9))
        );
    }

    #[test]
    fn build_on_occupied_tile_leaves_store_unchanged() {
        let mut world = world_with_peers(&[7, 9]);
        world.apply(&build_cmd(7, 10.0, 5.0)).unwrap();
        let before = world.statistics();
        assert_eq!(
            world.apply(&build_cmd(9, 10.2, 4.9)).unwrap_err(),
            Rejection::PositionOccupied(GridPos::new(10, 0, 5))
        );
        assert_eq!(world.statistics(), before);
        // The losing request must not have consumed an id.
        let event = world.apply(&build_cmd(9, 1.0, 1.0)).unwrap();
        assert!(matches!(
            event,
            WorldEvent::StructureBuilt {
                id: StructureId(2),
                ..
            }
        ));
    }

    #[test]
    fn build_beyond_capacity_is_rejected() {
        let mut world = world_with_peers(&[1]);
        world.config.max_active_structures = 2;
        world.apply(&build_cmd(1, 1.0, 1.0)).unwrap();
        world.apply(&build_cmd(1, 2.0, 1.0)).unwrap();
        assert_eq!(
            world.apply(&build_cmd(1, 3.0, 1.0)).unwrap_err(),
            Rejection::CapacityExceeded { limit: 2 }
        );
        // Destroying one frees capacity.
        world
            .apply(&WorldCommand {
                issuer: PeerId(1),
                action: WorldAction::Destroy {
                    structure_id: StructureId(1),
                },
            })
            .unwrap();
        assert!(world.apply(&build_cmd(1, 3.0, 1.0)).is_ok());
    }

    #[test]
    fn destroy_requires_owner_or_authority() {
        let mut world = world_with_peers(&[7, 9, 2]);
        world.set_authority(Some(PeerId(2)));
        world.apply(&build_cmd(7, 10.0, 5.0)).unwrap();
        let destroy = |issuer: u32| WorldCommand {
            issuer: PeerId(issuer),
            action: WorldAction::Destroy {
                structure_id: StructureId(1),
            },
        };

        // Peer 9 is neither owner nor authority.
        assert_eq!(
            world.apply(&destroy(9)).unwrap_err(),
            Rejection::NotOwner {
                structure_id: StructureId(1),
                requester: PeerId(9),
            }
        );
        assert!(!world.store.structure(StructureId(1)).unwrap().destroyed);

        // The owner may destroy.
        world.apply(&destroy(7)).unwrap();
        assert!(world.store.structure(StructureId(1)).unwrap().destroyed);
        assert!(!world.store.is_position_occupied(GridPos::new(10, 0, 5)));
    }

    #[test]
    fn authority_may_destroy_anything() {
        let mut world = world_with_peers(&[7, 2]);
        world.set_authority(Some(PeerId(2)));
        world.apply(&build_cmd(7, 10.0, 5.0)).unwrap();
        let event = world
            .apply(&WorldCommand {
                issuer: PeerId(2),
                action: WorldAction::Destroy {
                    structure_id: StructureId(1),
                },
            })
            .unwrap();
        assert_eq!(
            event,
            WorldEvent::StructureDestroyed {
                id: StructureId(1),
                by: PeerId(2),
            }
        );
    }

    #[test]
    fn destroy_unknown_or_retired_structure_is_rejected() {
        let mut world = world_with_peers(&[7]);
        let destroy = WorldCommand {
            issuer: PeerId(7),
            action: WorldAction::Destroy {
                structure_id: StructureId(99),
            },
        };
        assert_eq!(
            world.apply(&destroy).unwrap_err(),
            Rejection::UnknownStructure(StructureId(99))
        );
        world.apply(&build_cmd(7, 1.0, 1.0)).unwrap();
        let destroy1 = WorldCommand {
            issuer: PeerId(7),
            action: WorldAction::Destroy {
                structure_id: StructureId(1),
            },
        };
        world.apply(&destroy1).unwrap();
        assert_eq!(
            world.apply(&destroy1).unwrap_err(),
            Rejection::UnknownStructure(StructureId(1))
        );
    }

    #[test]
    fn harvest_reports_removed_not_requested() {
        let mut world = world_with_peers(&[7]);
        let event = world
            .apply(&WorldCommand {
                issuer: PeerId(7),
                action: WorldAction::Harvest {
                    position: GridPos::new(3, 0, 3),
                    amount: 15,
                },
            })
            .unwrap();
        assert_eq!(
            event,
            WorldEvent::ResourceHarvested {
                position: GridPos::new(3, 0, 3),
                kind: ResourceKind::Wood,
                by: PeerId(7),
                removed: 10,
                depleted: true,
            }
        );
        // A second harvest on the depleted node is rejected, store unchanged.
        assert_eq!(
            world
                .apply(&WorldCommand {
                    issuer: PeerId(7),
                    action: WorldAction::Harvest {
                        position: GridPos::new(3, 0, 3),
                        amount: 1,
                    },
                })
                .unwrap_err(),
            Rejection::ResourceUnavailable(GridPos::new(3, 0, 3))
        );
    }

    #[test]
    fn harvest_from_unknown_peer_is_rejected() {
        let mut world = world_with_peers(&[7]);
        assert_eq!(
            world
                .apply(&WorldCommand {
                    issuer: PeerId(99),
                    action: WorldAction::Harvest {
                        position: GridPos::new(3, 0, 3),
                        amount: 1,
                    },
                })
                .unwrap_err(),
            Rejection::InvalidRequester(PeerId(99))
        );
    }

    #[test]
    fn regenerate_resets_regardless_of_prior_state() {
        let mut world = world_with_peers(&[7]);
        world
            .apply(&WorldCommand {
                issuer: PeerId(7),
                action: WorldAction::Harvest {
                    position: GridPos::new(3, 0, 3),
                    amount: 10,
                },
            })
            .unwrap();
        let event = world
            .apply(&WorldCommand {
                issuer: PeerId(7),
                action: WorldAction::Regenerate {
                    position: GridPos::new(3, 0, 3),
                    kind: ResourceKind::Wood,
                    amount: 40,
                },
            })
            .unwrap();
        assert_eq!(
            event,
            WorldEvent::ResourceRegenerated {
                position: GridPos::new(3, 0, 3),
                kind: ResourceKind::Wood,
                amount: 40,
            }
        );
        let node = world.store.resource(GridPos::new(3, 0, 3)).unwrap();
        assert_eq!(node.amount, 40);
        assert!(!node.depleted);
    }

    #[test]
    fn identical_command_logs_converge() {
        let commands = vec![
            build_cmd(7, 10.0, 5.0),
            build_cmd(9, 10.0, 5.0), // rejected on both sides
            WorldCommand {
                issuer: PeerId(9),
                action: WorldAction::Harvest {
                    position: GridPos::new(3, 0, 3),
                    amount: 6,
                },
            },
            WorldCommand {
                issuer: PeerId(7),
                action: WorldAction::Destroy {
                    structure_id: StructureId(1),
                },
            },
        ];
        let mut a = world_with_peers(&[7, 9]);
        let mut b = world_with_peers(&[7, 9]);
        for cmd in &commands {
            let _ = a.apply(cmd);
            let _ = b.apply(cmd);
        }
        assert_eq!(a.statistics(), b.statistics());
        assert_eq!(
            serde_json::to_string(&a.store).unwrap(),
            serde_json::to_string(&b.store).unwrap()
        );
    }
}
