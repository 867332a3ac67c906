// Streamed volatile-field frames.
//
// Every sync interval the authority snapshots the volatile fields of live
// entities — structure position/rotation, resource position — into a
// `StreamFrame` and sends one (relevance-filtered) frame per peer. Receivers
// overwrite their mirrors' volatile fields with whatever the frame says.
// This channel carries no semantic validation: unknown ids are skipped,
// stale values are tolerated, and a frame that fails to decode is dropped
// whole rather than partially applied.
//
// Entry counts ride as the JSON array lengths under the length-delimited
// wire framing; the frame crosses the relay as opaque bytes, like commands.
//
// See also: `store.rs` (`set_structure_motion`, `rehome_resource`),
// `command.rs` for the semantic channel.

use crate::types::*;
use crate::world::WorldState;
use serde::{Deserialize, Serialize};

/// Volatile transform of one live structure.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructureMotion {
    pub id: StructureId,
    pub position: Vec3,
    pub rotation: Quat,
}

/// Position echo of one resource node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceMarker {
    pub id: ResourceId,
    pub position: GridPos,
}

/// One streamed snapshot of volatile fields, authority -> peer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    /// Frame counter on the sending authority, for observability only.
    pub tick: u64,
    pub structures: Vec<StructureMotion>,
    pub resources: Vec<ResourceMarker>,
}

impl StreamFrame {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl WorldState {
    /// Overwrite volatile fields from a received frame. Unknown or destroyed
    /// entities are skipped. Returns how many entries were applied.
    pub fn apply_frame(&mut self, frame: &StreamFrame) -> usize {
        let mut applied = 0;
        for m in &frame.structures {
            if self.store.set_structure_motion(m.id, m.position, m.rotation) {
                applied += 1;
            }
        }
        for r in &frame.resources {
            if self.store.rehome_resource(r.id, r.position) {
                applied += 1;
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{WorldAction, WorldCommand};
    use crate::config::WorldConfig;

    fn world_with_structure() -> (WorldState, StructureId) {
        let mut config = WorldConfig::default();
        config.grid_size = (16, 16);
        let mut world = WorldState::new(config).unwrap();
        world.insert_peer(PeerId(1));
        world
            .apply(&WorldCommand {
                issuer: PeerId(1),
                action: WorldAction::Build {
                    position: Vec3::new(4.0, 0.0, 4.0),
                    rotation: Quat::IDENTITY,
                    kind: StructureKind::Wall,
                },
            })
            .unwrap();
        (world, StructureId(1))
    }

    #[test]
    fn frame_overwrites_structure_transform() {
        let (mut world, id) = world_with_structure();
        let frame = StreamFrame {
            tick: 3,
            structures: vec![StructureMotion {
                id,
                position: Vec3::new(4.05, 0.0, 3.98),
                rotation: Quat::new(0.0, 0.7, 0.0, 0.7),
            }],
            resources: vec![],
        };
        assert_eq!(world.apply_frame(&frame), 1);
        let s = world.store.structure(id).unwrap();
        assert_eq!(s.position, Vec3::new(4.05, 0.0, 3.98));
        assert_eq!(s.rotation, Quat::new(0.0, 0.7, 0.0, 0.7));
    }

    #[test]
    fn unknown_entries_are_skipped_not_fatal() {
        let (mut world, id) = world_with_structure();
        let frame = StreamFrame {
            tick: 1,
            structures: vec![
                StructureMotion {
                    id: StructureId(999),
                    position: Vec3::new(0.0, 0.0, 0.0),
                    rotation: Quat::IDENTITY,
                },
                StructureMotion {
                    id,
                    position: Vec3::new(4.1, 0.0, 4.0),
                    rotation: Quat::IDENTITY,
                },
            ],
            resources: vec![ResourceMarker {
                id: ResourceId(42),
                position: GridPos::new(1, 0, 1),
            }],
        };
        assert_eq!(world.apply_frame(&frame), 1);
        assert_eq!(world.store.structure(id).unwrap().position.x, 4.1);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let frame = StreamFrame {
            tick: 9,
            structures: vec![StructureMotion {
                id: StructureId(2),
                position: Vec3::new(1.5, 0.0, -2.5),
                rotation: Quat::IDENTITY,
            }],
            resources: vec![ResourceMarker {
                id: ResourceId(1),
                position: GridPos::new(3, 0, 3),
            }],
        };
        assert_eq!(StreamFrame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn malformed_bytes_fail_to_decode() {
        assert!(StreamFrame::decode(b"{\"tick\":").is_err());
        assert!(StreamFrame::decode(b"[1,2,3]").is_err());
    }
}
