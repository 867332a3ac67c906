// Property-bag vocabulary for low-churn descriptive fields.
//
// The authority publishes rarely-changing fields into a shared last-writer-
// wins key/value bag (stored on the relay, mirrored read-only by peers) so
// streamed frames never repeat them. Keys follow a fixed vocabulary:
//
//   Structure_{id}_Type | Structure_{id}_Health | Structure_{id}_Destroyed
//   Resource_{id}_Type  | Resource_{id}_Amount  | Resource_{id}_Depleted
//
// Values are plain strings. `apply_property` parses one entry and overwrites
// the matching mirror field; anything unparsable is ignored by returning
// `false` (the caller logs it) — a bad entry never partially applies.
//
// See also: `store.rs` for the field setters, `frame.rs` for the volatile
// channel this one complements.

use crate::store::{ResourceNode, Structure};
use crate::types::{ResourceId, ResourceKind, StructureId, StructureKind};
use crate::world::WorldState;

/// Bag entries describing one structure, in key order.
pub fn structure_entries(s: &Structure) -> Vec<(String, String)> {
    let id = s.id.0;
    vec![
        (format!("Structure_{id}_Type"), s.kind.name().to_string()),
        (format!("Structure_{id}_Health"), s.health.to_string()),
        (format!("Structure_{id}_Destroyed"), s.destroyed.to_string()),
    ]
}

/// Bag entries describing one resource node, in key order.
pub fn resource_entries(n: &ResourceNode) -> Vec<(String, String)> {
    let id = n.id.0;
    vec![
        (format!("Resource_{id}_Type"), n.kind.name().to_string()),
        (format!("Resource_{id}_Amount"), n.amount.to_string()),
        (format!("Resource_{id}_Depleted"), n.depleted.to_string()),
    ]
}

/// `Structure_{id}_{field}` / `Resource_{id}_{field}` -> (entity, id, field).
fn parse_key(key: &str) -> Option<(&'static str, u64, &str)> {
    let (head, field) = key.rsplit_once('_')?;
    if let Some(id_str) = head.strip_prefix("Structure_") {
        return Some(("Structure", id_str.parse().ok()?, field));
    }
    if let Some(id_str) = head.strip_prefix("Resource_") {
        return Some(("Resource", id_str.parse().ok()?, field));
    }
    None
}

impl WorldState {
    /// Apply one property-bag entry to the mirror. Returns `false` (and
    /// changes nothing) for unknown keys, unknown ids, or unparsable values.
    pub fn apply_property(&mut self, key: &str, value: &str) -> bool {
        let Some((entity, id, field)) = parse_key(key) else {
            return false;
        };
        match (entity, field) {
            ("Structure", "Type") => match StructureKind::parse(value) {
                Some(kind) => self.store.set_structure_kind(StructureId(id), kind),
                None => false,
            },
            ("Structure", "Health") => match value.parse::<f32>() {
                Ok(health) => self.store.set_structure_health(StructureId(id), health),
                Err(_) => false,
            },
            ("Structure", "Destroyed") => match value.parse::<bool>() {
                // Retiring through the bag frees the tile like a Destroy
                // command would; un-retiring is never applied.
                Ok(true) => self.store.remove_structure(StructureId(id)),
                Ok(false) | Err(_) => false,
            },
            ("Resource", "Type") => match ResourceKind::parse(value) {
                Some(kind) => self.store.set_resource_kind(ResourceId(id), kind),
                None => false,
            },
            ("Resource", "Amount") => match value.parse::<u32>() {
                Ok(amount) => self.store.set_resource_amount(ResourceId(id), amount),
                Err(_) => false,
            },
            ("Resource", "Depleted") => match value.parse::<bool>() {
                Ok(depleted) => self.store.set_resource_depleted(ResourceId(id), depleted),
                Err(_) => false,
            },
            _ => false,
        }
    }
}
