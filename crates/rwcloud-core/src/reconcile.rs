//! Declarative cluster reconciliation
//!
//! Given the observed and the desired shape of a cluster, the planner
//! rejects every change to an immutable attribute in one pass, then emits the
//! targeted mutations needed, in a fixed order:
//!
//! 1. engine version
//! 2. engine configuration
//! 3. metadata store configuration
//! 4. component shapes (compute, compactor, frontend, meta)
//!
//! Each mutation is applied through its own await-flow. The first failure
//! stops the run; mutations already applied stay applied.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cloud::CloudClient;
use crate::error::{CoreError, ImmutableField, ImmutableFieldError, Result};
use crate::model::{Cluster, UpdateResourcesRequest};

/// One targeted mutation of an existing cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationIntent {
    UpdateVersion(String),
    UpdateEngineConfig(String),
    UpdateMetaStoreConfig(String),
    UpdateResources(UpdateResourcesRequest),
}

impl MutationIntent {
    /// Step name used in progress events and [`CoreError::StepFailed`]
    pub fn step(&self) -> &'static str {
        match self {
            MutationIntent::UpdateVersion(_) => "update cluster version",
            MutationIntent::UpdateEngineConfig(_) => "update engine config",
            MutationIntent::UpdateMetaStoreConfig(_) => "update meta store config",
            MutationIntent::UpdateResources(_) => "update cluster resources",
        }
    }
}

/// Result of a reconciliation run
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// Intents applied, in order
    pub applied: Vec<MutationIntent>,
    /// The cluster as read back after the last step
    pub cluster: Cluster,
}

/// Every attempted change to an immutable attribute
pub fn check_immutable(observed: &Cluster, desired: &Cluster) -> Vec<ImmutableFieldError> {
    let mut violations = Vec::new();
    let mut check = |field, previous: String, desired: String| {
        if previous != desired {
            violations.push(ImmutableFieldError {
                field,
                previous,
                desired,
            });
        }
    };

    check(ImmutableField::Name, observed.name.clone(), desired.name.clone());
    check(ImmutableField::Region, observed.region.clone(), desired.region.clone());

    let (was, want) = (&observed.resources, &desired.resources);
    if !was.components.metastore.same_shape(&want.components.metastore) {
        check(
            ImmutableField::MetaStoreResource,
            was.components.metastore.to_string(),
            want.components.metastore.to_string(),
        );
    }
    check(
        ImmutableField::ComputeFileCacheEnabled,
        was.enable_compute_file_cache.to_string(),
        want.enable_compute_file_cache.to_string(),
    );
    check(
        ImmutableField::ComputeFileCacheSize,
        format!("{} GiB", was.compute_file_cache_size_gib),
        format!("{} GiB", want.compute_file_cache_size_gib),
    );
    check(
        ImmutableField::MetaStoreVolumeSize,
        format!("{} GiB", was.metastore_volume_size_gib),
        format!("{} GiB", want.metastore_volume_size_gib),
    );
    violations
}

/// Ordered mutations turning `observed` into `desired`
///
/// # Errors
///
/// [`CoreError::ImmutableFields`] listing every violation when any immutable
/// attribute differs; no intents are produced in that case.
pub fn plan_update(observed: &Cluster, desired: &Cluster) -> Result<Vec<MutationIntent>> {
    let violations = check_immutable(observed, desired);
    if !violations.is_empty() {
        return Err(CoreError::ImmutableFields(violations));
    }

    let mut intents = Vec::new();
    if observed.image_tag != desired.image_tag {
        intents.push(MutationIntent::UpdateVersion(desired.image_tag.clone()));
    }
    if observed.engine_config != desired.engine_config {
        intents.push(MutationIntent::UpdateEngineConfig(desired.engine_config.clone()));
    }
    if observed.metastore_config != desired.metastore_config {
        intents.push(MutationIntent::UpdateMetaStoreConfig(
            desired.metastore_config.clone(),
        ));
    }
    let (was, want) = (&observed.resources.components, &desired.resources.components);
    if !was.same_mutable_shape(want) {
        intents.push(MutationIntent::UpdateResources(want.into()));
    }
    Ok(intents)
}

impl CloudClient {
    /// Bring the cluster named `desired.name` in `desired.region` to the
    /// desired shape
    ///
    /// The current state is fetched first; see [`CloudClient::reconcile_cluster_from`].
    pub async fn reconcile_cluster(
        &self,
        desired: &Cluster,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome> {
        let observed = self
            .get_cluster_by_name(&desired.region, &desired.name)
            .await?;
        self.reconcile_cluster_from(&observed, desired, cancel).await
    }

    /// Apply the plan from `observed` to `desired`, one await-flow per intent
    ///
    /// A failing step is reported as [`CoreError::StepFailed`] naming it;
    /// earlier steps are not rolled back.
    pub async fn reconcile_cluster_from(
        &self,
        observed: &Cluster,
        desired: &Cluster,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome> {
        let intents = plan_update(observed, desired)?;
        info!(
            cluster = %observed.name,
            ns_id = %observed.ns_id,
            steps = intents.len(),
            "reconciling cluster"
        );

        let mut cluster = observed.clone();
        let mut applied = Vec::with_capacity(intents.len());
        for intent in intents {
            debug!(step = intent.step(), "applying");
            let ns_id = observed.ns_id;
            let result = match &intent {
                MutationIntent::UpdateVersion(version) => {
                    self.update_cluster_version_and_wait(ns_id, version, cancel)
                        .await
                }
                MutationIntent::UpdateEngineConfig(config) => {
                    self.update_engine_config_and_wait(ns_id, config, cancel)
                        .await
                }
                MutationIntent::UpdateMetaStoreConfig(config) => {
                    self.update_metastore_config_and_wait(ns_id, config, cancel)
                        .await
                }
                MutationIntent::UpdateResources(req) => {
                    self.update_cluster_resources_and_wait(ns_id, req, cancel)
                        .await
                }
            };
            cluster = result.map_err(|e| e.in_step(intent.step()))?;
            applied.push(intent);
        }

        Ok(UpdateOutcome { applied, cluster })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ClusterResources, ClusterStatus, ComponentRequest, ComponentResource, HealthStatus, TierId,
    };
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn cluster() -> Cluster {
        let mut resources = ClusterResources::default();
        let c = &mut resources.components;
        c.compute = ComponentResource::new("p-2c8g", 1);
        c.compactor = ComponentResource::new("p-1c4g", 1);
        c.frontend = ComponentResource::new("p-1c4g", 1);
        c.meta = ComponentResource::new("p-1c4g", 1);
        c.metastore = ComponentResource::new("p-1c4g", 1);
        Cluster {
            id: 7,
            ns_id: Uuid::new_v4(),
            name: "foo".to_string(),
            region: "us-east-1".to_string(),
            tier: TierId::Standard,
            image_tag: "v1.9.0".to_string(),
            engine_config: String::new(),
            metastore_config: String::new(),
            resources,
            status: ClusterStatus::Running,
            health: HealthStatus::Healthy,
        }
    }

    #[test]
    fn test_no_change_no_intents() {
        let c = cluster();
        assert!(plan_update(&c, &c).unwrap().is_empty());
    }

    #[test]
    fn test_all_violations_reported_together() {
        let observed = cluster();
        let mut desired = observed.clone();
        desired.region = "eu-west-1".to_string();
        desired.resources.components.metastore.replica = 3;
        desired.image_tag = "v2.0.0".to_string();

        let err = plan_update(&observed, &desired).unwrap_err();
        let CoreError::ImmutableFields(violations) = err else {
            panic!("expected immutable field error, got {err:?}");
        };
        let fields: Vec<_> = violations.iter().map(|v| v.field).collect();
        assert_eq!(fields, vec![ImmutableField::Region, ImmutableField::MetaStoreResource]);
    }

    #[test]
    fn test_file_cache_and_volume_are_immutable() {
        let observed = cluster();
        let mut desired = observed.clone();
        desired.resources.enable_compute_file_cache = false;
        desired.resources.compute_file_cache_size_gib = 50;
        desired.resources.metastore_volume_size_gib = 40;

        let fields: Vec<_> = check_immutable(&observed, &desired)
            .into_iter()
            .map(|v| v.field)
            .collect();
        assert_eq!(fields, vec![
            ImmutableField::ComputeFileCacheEnabled,
            ImmutableField::ComputeFileCacheSize,
            ImmutableField::MetaStoreVolumeSize,
        ]);
    }

    #[test]
    fn test_intents_follow_fixed_order() {
        let observed = cluster();
        let mut desired = observed.clone();
        desired.resources.components.frontend.replica = 2;
        desired.metastore_config = "[etcd]".to_string();
        desired.engine_config = "[server]".to_string();
        desired.image_tag = "v2.0.0".to_string();

        let steps: Vec<_> = plan_update(&observed, &desired)
            .unwrap()
            .iter()
            .map(MutationIntent::step)
            .collect();
        assert_eq!(steps, vec![
            "update cluster version",
            "update engine config",
            "update meta store config",
            "update cluster resources",
        ]);
    }

    #[test]
    fn test_resource_intent_carries_all_mutable_components() {
        let observed = cluster();
        let mut desired = observed.clone();
        desired.resources.components.compactor.replica = 2;

        let intents = plan_update(&observed, &desired).unwrap();
        let [MutationIntent::UpdateResources(req)] = intents.as_slice() else {
            panic!("expected a single resource update, got {intents:?}");
        };
        assert_eq!(req.compactor, ComponentRequest {
            component_type_id: "p-1c4g".to_string(),
            replica: 2,
        });
        assert_eq!(req.compute.component_type_id, "p-2c8g");
    }

    #[test]
    fn test_cpu_and_memory_labels_do_not_count_as_changes() {
        let observed = cluster();
        let mut desired = observed.clone();
        desired.resources.components.compute.cpu = "2".to_string();
        desired.resources.components.compute.memory = "8 GB".to_string();
        assert!(plan_update(&observed, &desired).unwrap().is_empty());
    }
}
