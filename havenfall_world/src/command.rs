// Commands that mutate world state.
//
// All replicated mutation goes through `WorldCommand` — it is the only way
// any peer's store changes besides the streamed and property channels (which
// carry no semantics, only field overwrites). A command is broadcast once to
// every peer including its sender; each peer independently validates and
// applies it, so the world is a deterministic state machine:
// `(state, command) -> (new_state, event)`.
//
// The issuer field names the requesting peer. On receipt the replication
// layer overwrites it with the transport-stamped sender before application,
// so a peer cannot issue commands in another peer's name.
//
// Commands carry no target tick: the transport's delivery order is the
// serialization point, and every peer applies commands in that order.
//
// See also: `world.rs` for `WorldState::apply`, `frame.rs` and `property.rs`
// for the non-command channels.

use crate::types::*;
use serde::{Deserialize, Serialize};

/// A replicated mutation request from one peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldCommand {
    pub issuer: PeerId,
    pub action: WorldAction,
}

/// The specific mutation a command requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WorldAction {
    /// Place a structure. The tile claim is derived by snapping `position`.
    Build {
        position: Vec3,
        rotation: Quat,
        kind: StructureKind,
    },
    /// Retire a structure and free its tile. Only the owner or the current
    /// authority may do this.
    Destroy { structure_id: StructureId },
    /// Drain up to `amount` from the node at `position` (clamped to what
    /// remains).
    Harvest { position: GridPos, amount: u32 },
    /// Create or reset the node at `position`. Authority-only path; carries
    /// no requester check.
    Regenerate {
        position: GridPos,
        kind: ResourceKind,
        amount: u32,
    },
}

impl WorldCommand {
    /// Serialize for the wire. Commands cross the relay as opaque bytes.
    pub fn encode(&self) -> Vec<u8> {
        // A WorldCommand always serializes: plain structs and enums only.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Deserialize from the wire. A failure here means the whole command is
    /// dropped by the caller (malformed payload), never partially applied.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let cmd = WorldCommand {
            issuer: PeerId(7),
            action: WorldAction::Build {
                position: Vec3::new(10.0, 0.0, 5.0),
                rotation: Quat::IDENTITY,
                kind: StructureKind::Wall,
            },
        };
        let bytes = cmd.encode();
        let restored = WorldCommand::decode(&bytes).unwrap();
        assert_eq!(cmd, restored);
    }

    #[test]
    fn unknown_variant_is_a_decode_error() {
        let bytes = br#"{"issuer":1,"action":{"Teleport":{"x":1}}}"#;
        assert!(WorldCommand::decode(bytes).is_err());
    }

    #[test]
    fn truncated_payload_is_a_decode_error() {
        let cmd = WorldCommand {
            issuer: PeerId(2),
            action: WorldAction::Harvest {
                position: GridPos::new(3, 0, 3),
                amount: 15,
            },
        };
        let bytes = cmd.encode();
        assert!(WorldCommand::decode(&bytes[..bytes.len() / 2]).is_err());
    }
}
