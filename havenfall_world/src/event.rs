// Narrative world events.
//
// `WorldEvent` is the output half of command application: every accepted
// command produces one, and rejected commands produce `CommandRejected` so
// UI callers can poll outcomes without the core growing a retry path.
// Events are data for the hosting process (event log, HUD); nothing in the
// core acts on them except the replication engine's regrowth scheduling.

use crate::types::*;
use crate::world::Rejection;
use serde::{Deserialize, Serialize};

/// One observable outcome of applying a command to the world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    StructureBuilt {
        id: StructureId,
        kind: StructureKind,
        tile: GridPos,
        owner: PeerId,
    },
    StructureDestroyed {
        id: StructureId,
        by: PeerId,
    },
    ResourceHarvested {
        position: GridPos,
        kind: ResourceKind,
        by: PeerId,
        /// Actually-removed quantity, after clamping to what remained.
        removed: u32,
        depleted: bool,
    },
    ResourceRegenerated {
        position: GridPos,
        kind: ResourceKind,
        amount: u32,
    },
    /// A command failed validation and was dropped.
    CommandRejected {
        issuer: PeerId,
        rejection: Rejection,
    },
}
