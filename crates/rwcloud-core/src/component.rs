//! Mapping requested resources onto a tier's component types
//!
//! Callers describe a component as cpu, memory and replica count. The
//! control plane only accepts component-type ids, so the request is
//! resolved against the tier's reference list first.

use std::fmt;

use crate::error::ComponentResolutionError;
use crate::model::{AvailableComponentType, ComponentResource, Tier, TierId};

/// Requested shape of one component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSpec {
    pub cpu: u32,
    pub memory_gib: u32,
    pub replica: u32,
}

impl ComponentSpec {
    pub fn new(cpu: u32, memory_gib: u32, replica: u32) -> Self {
        Self {
            cpu,
            memory_gib,
            replica,
        }
    }

    /// CPU as the reference data spells it
    pub fn cpu_label(&self) -> String {
        self.cpu.to_string()
    }

    /// Memory as the reference data spells it, e.g. "4 GB"
    pub fn memory_label(&self) -> String {
        format!("{} GB", self.memory_gib)
    }
}

impl fmt::Display for ComponentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vCPU, {} GB x{}",
            self.cpu, self.memory_gib, self.replica
        )
    }
}

/// Pick the component type for `spec` out of `available`
///
/// Only exact (cpu, memory) matches qualify. Among several matches the one
/// allowing the most replicas wins; on a tie the first listed wins.
pub fn resolve_component_type(
    component: &str,
    tier: TierId,
    available: &[AvailableComponentType],
    spec: &ComponentSpec,
) -> Result<ComponentResource, ComponentResolutionError> {
    let cpu = spec.cpu_label();
    let memory = spec.memory_label();

    let mut best: Option<&AvailableComponentType> = None;
    for candidate in available
        .iter()
        .filter(|t| t.cpu == cpu && t.memory == memory)
    {
        if best.is_none_or(|b| candidate.maximum > b.maximum) {
            best = Some(candidate);
        }
    }

    let Some(chosen) = best else {
        return Err(ComponentResolutionError::NoMatch {
            component: component.to_string(),
            tier: tier.to_string(),
            cpu,
            memory,
            available: available
                .iter()
                .map(|t| format!("{} ({} vCPU, {})", t.id, t.cpu, t.memory))
                .collect(),
        });
    };

    if spec.replica > chosen.maximum {
        return Err(ComponentResolutionError::ReplicaExceeded {
            component: component.to_string(),
            component_type_id: chosen.id.clone(),
            requested: spec.replica,
            maximum: chosen.maximum,
        });
    }

    Ok(ComponentResource {
        component_type_id: chosen.id.clone(),
        cpu: chosen.cpu.clone(),
        memory: chosen.memory.clone(),
        replica: spec.replica,
    })
}

/// Reference list of `component` in the tier `tier` out of `tiers`
pub fn available_component_types<'a>(
    tiers: &'a [Tier],
    tier: TierId,
    component: &str,
) -> Result<&'a [AvailableComponentType], ComponentResolutionError> {
    let found = tiers
        .iter()
        .find(|t| t.id == Some(tier))
        .ok_or_else(|| ComponentResolutionError::UnknownTier(tier.to_string()))?;
    found
        .component_types(component)
        .ok_or_else(|| ComponentResolutionError::UnknownComponent(component.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{COMPONENT_COMPUTE, COMPONENT_METASTORE};
    use crate::simulated::default_tiers;
    use pretty_assertions::assert_eq;

    fn reference() -> Vec<AvailableComponentType> {
        vec![
            AvailableComponentType {
                id: "p-1c4g".into(),
                cpu: "1".into(),
                memory: "4 GB".into(),
                maximum: 3,
            },
            AvailableComponentType {
                id: "p-2c8g".into(),
                cpu: "2".into(),
                memory: "8 GB".into(),
                maximum: 3,
            },
        ]
    }

    #[test]
    fn test_exact_match_resolves() {
        let got = resolve_component_type(
            COMPONENT_COMPUTE,
            TierId::Standard,
            &reference(),
            &ComponentSpec::new(2, 8, 1),
        )
        .unwrap();
        assert_eq!(got, ComponentResource {
            component_type_id: "p-2c8g".into(),
            cpu: "2".into(),
            memory: "8 GB".into(),
            replica: 1,
        });
    }

    #[test]
    fn test_no_match_lists_alternatives() {
        let err = resolve_component_type(
            COMPONENT_COMPUTE,
            TierId::Standard,
            &reference(),
            &ComponentSpec::new(4, 16, 1),
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("p-1c4g"));
        assert!(msg.contains("p-2c8g"));
        assert!(msg.contains("Standard"));
    }

    #[test]
    fn test_replica_over_maximum() {
        let err = resolve_component_type(
            COMPONENT_COMPUTE,
            TierId::Standard,
            &reference(),
            &ComponentSpec::new(1, 4, 4),
        )
        .unwrap_err();
        assert_eq!(err, ComponentResolutionError::ReplicaExceeded {
            component: "compute".into(),
            component_type_id: "p-1c4g".into(),
            requested: 4,
            maximum: 3,
        });
        assert!(err.to_string().contains("at most 3"));
    }

    #[test]
    fn test_highest_maximum_wins_and_first_wins_ties() {
        let mut list = reference();
        list.push(AvailableComponentType {
            id: "p-1c4g-large".into(),
            cpu: "1".into(),
            memory: "4 GB".into(),
            maximum: 10,
        });
        list.push(AvailableComponentType {
            id: "p-1c4g-large-b".into(),
            cpu: "1".into(),
            memory: "4 GB".into(),
            maximum: 10,
        });

        let got = resolve_component_type(
            COMPONENT_COMPUTE,
            TierId::Standard,
            &list,
            &ComponentSpec::new(1, 4, 5),
        )
        .unwrap();
        assert_eq!(got.component_type_id, "p-1c4g-large");
    }

    #[test]
    fn test_lookup_by_tier_and_component() {
        let tiers = default_tiers();
        let list = available_component_types(&tiers, TierId::Byoc, COMPONENT_METASTORE).unwrap();
        assert_eq!(list.len(), 2);

        assert_eq!(
            available_component_types(&tiers, TierId::Free, COMPONENT_COMPUTE).unwrap_err(),
            ComponentResolutionError::UnknownTier("Free".into())
        );
        assert_eq!(
            available_component_types(&tiers, TierId::Standard, "postgresql").unwrap_err(),
            ComponentResolutionError::UnknownComponent("postgresql".into())
        );
    }
}
