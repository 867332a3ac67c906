// Typed registry of structure and resource descriptors.
//
// Maps every `StructureKind` and `ResourceKind` to its descriptor, built and
// validated once at startup (`Registry::from_config`). A kind with a missing
// or nonsensical descriptor is a startup error, not a runtime fallback —
// after construction every lookup is total.
//
// See also: `config.rs` where the descriptor lists live as tunable data,
// `world.rs` which reads max health and regrowth parameters during command
// application.

use crate::config::WorldConfig;
use crate::types::{ResourceKind, StructureKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Descriptor for one structure kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StructureSpec {
    pub kind: StructureKind,
    /// Health a freshly built structure starts with.
    pub max_health: f32,
}

/// Descriptor for one resource kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    /// Amount a node regrows to when the authority regenerates it.
    pub regrowth_amount: u32,
    /// Delay between a node depleting and the authority regenerating it,
    /// in engine milliseconds.
    pub regrowth_delay_ms: u64,
}

/// Registry construction errors. All of these mean the config is unusable;
/// none can occur after startup.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no structure descriptor for {0:?}")]
    MissingStructure(StructureKind),
    #[error("duplicate structure descriptor for {0:?}")]
    DuplicateStructure(StructureKind),
    #[error("structure descriptor for {0:?} has non-positive max health")]
    InvalidMaxHealth(StructureKind),
    #[error("no resource descriptor for {0:?}")]
    MissingResource(ResourceKind),
    #[error("duplicate resource descriptor for {0:?}")]
    DuplicateResource(ResourceKind),
    #[error("resource descriptor for {0:?} has zero regrowth amount")]
    InvalidRegrowth(ResourceKind),
}

/// Validated kind -> descriptor maps. Total over both enums by construction.
#[derive(Clone, Debug)]
pub struct Registry {
    structures: BTreeMap<StructureKind, StructureSpec>,
    resources: BTreeMap<ResourceKind, ResourceSpec>,
}

impl Registry {
    /// Build the registry from config, checking that every kind has exactly
    /// one sane descriptor.
    pub fn from_config(config: &WorldConfig) -> Result<Self, RegistryError> {
        let mut structures = BTreeMap::new();
        for spec in &config.structure_specs {
            if spec.max_health <= 0.0 {
                return Err(RegistryError::InvalidMaxHealth(spec.kind));
            }
            if structures.insert(spec.kind, spec.clone()).is_some() {
                return Err(RegistryError::DuplicateStructure(spec.kind));
            }
        }
        for kind in StructureKind::ALL {
            if !structures.contains_key(&kind) {
                return Err(RegistryError::MissingStructure(kind));
            }
        }

        let mut resources = BTreeMap::new();
        for spec in &config.resource_specs {
            if spec.regrowth_amount == 0 {
                return Err(RegistryError::InvalidRegrowth(spec.kind));
            }
            if resources.insert(spec.kind, spec.clone()).is_some() {
                return Err(RegistryError::DuplicateResource(spec.kind));
            }
        }
        for kind in ResourceKind::ALL {
            if !resources.contains_key(&kind) {
                return Err(RegistryError::MissingResource(kind));
            }
        }

        Ok(Self {
            structures,
            resources,
        })
    }

    /// Descriptor for a structure kind. Total: `from_config` guarantees an
    /// entry for every variant.
    pub fn structure_spec(&self, kind: StructureKind) -> &StructureSpec {
        &self.structures[&kind]
    }

    /// Descriptor for a resource kind. Total, as above.
    pub fn resource_spec(&self, kind: ResourceKind) -> &ResourceSpec {
        &self.resources[&kind]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let registry = Registry::from_config(&WorldConfig::default()).unwrap();
        for kind in StructureKind::ALL {
            assert!(registry.structure_spec(kind).max_health > 0.0);
        }
        for kind in ResourceKind::ALL {
            assert!(registry.resource_spec(kind).regrowth_amount > 0);
        }
    }

    #[test]
    fn missing_structure_descriptor_is_a_startup_error() {
        let mut config = WorldConfig::default();
        config
            .structure_specs
            .retain(|s| s.kind != StructureKind::Campfire);
        assert_eq!(
            Registry::from_config(&config).unwrap_err(),
            RegistryError::MissingStructure(StructureKind::Campfire)
        );
    }

    #[test]
    fn duplicate_descriptor_is_a_startup_error() {
        let mut config = WorldConfig::default();
        config.resource_specs.push(ResourceSpec {
            kind: ResourceKind::Wood,
            regrowth_amount: 99,
            regrowth_delay_ms: 1,
        });
        assert_eq!(
            Registry::from_config(&config).unwrap_err(),
            RegistryError::DuplicateResource(ResourceKind::Wood)
        );
    }

    #[test]
    fn nonsensical_values_are_startup_errors() {
        let mut config = WorldConfig::default();
        config.structure_specs[0].max_health = 0.0;
        let kind = config.structure_specs[0].kind;
        assert_eq!(
            Registry::from_config(&config).unwrap_err(),
            RegistryError::InvalidMaxHealth(kind)
        );
    }
}
