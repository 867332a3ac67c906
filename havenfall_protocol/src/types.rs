// Core ID types for the wire protocol.
//
// Relay-scoped identifiers shared by `message.rs` and the relay's session
// management. Actor ids are compact integers assigned by the relay from 1
// upward in join order — they double as the world-side peer identity, and
// their monotonicity is what makes "lowest surviving id" a valid authority
// election rule.

use serde::{Deserialize, Serialize};

/// Relay-assigned peer id. Assigned from 1 upward, never reused in a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u32);

/// Per-peer monotonic command sequence number, preserving local issue order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandSeq(pub u64);
