//! Typed control-plane entities and request bodies
//!
//! Field names follow the JSON wire format (camelCase) through serde
//! renames, while the Rust names describe what the field means.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const COMPONENT_COMPUTE: &str = "compute";
pub const COMPONENT_COMPACTOR: &str = "compactor";
pub const COMPONENT_FRONTEND: &str = "frontend";
pub const COMPONENT_META: &str = "meta";
pub const COMPONENT_METASTORE: &str = "etcd";

/// Lifecycle status of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterStatus {
    Creating,
    Running,
    Updating,
    Deleting,
    Failed,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Health indicator, orthogonal to [`ClusterStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Service class constraining the available component shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TierId {
    Free,
    Invited,
    #[default]
    Standard,
    #[serde(rename = "BYOC")]
    Byoc,
    Benchmark,
    #[serde(rename = "Developer-Free")]
    DeveloperFree,
    #[serde(rename = "Developer-Basic")]
    DeveloperBasic,
    #[serde(rename = "Developer-Test")]
    DeveloperTest,
    Test,
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TierId::Free => "Free",
            TierId::Invited => "Invited",
            TierId::Standard => "Standard",
            TierId::Byoc => "BYOC",
            TierId::Benchmark => "Benchmark",
            TierId::DeveloperFree => "Developer-Free",
            TierId::DeveloperBasic => "Developer-Basic",
            TierId::DeveloperTest => "Developer-Test",
            TierId::Test => "Test",
        };
        f.write_str(name)
    }
}

/// Resource shape of one cluster component
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResource {
    pub component_type_id: String,
    #[serde(default)]
    pub cpu: String,
    #[serde(default)]
    pub memory: String,
    pub replica: u32,
}

impl ComponentResource {
    pub fn new(component_type_id: impl Into<String>, replica: u32) -> Self {
        Self {
            component_type_id: component_type_id.into(),
            replica,
            ..Default::default()
        }
    }

    /// Two shapes are equal when type and replica count match; cpu and
    /// memory are derived from the type.
    pub fn same_shape(&self, other: &ComponentResource) -> bool {
        self.component_type_id == other.component_type_id && self.replica == other.replica
    }
}

impl fmt::Display for ComponentResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}", self.component_type_id, self.replica)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterComponents {
    pub compute: ComponentResource,
    pub compactor: ComponentResource,
    pub frontend: ComponentResource,
    pub meta: ComponentResource,
    /// Metadata store; fixed after creation
    #[serde(rename = "etcd")]
    pub metastore: ComponentResource,
}

impl ClusterComponents {
    /// Whether the mutable components (everything but the metadata store)
    /// have the same shape
    pub fn same_mutable_shape(&self, other: &ClusterComponents) -> bool {
        self.compute.same_shape(&other.compute)
            && self.compactor.same_shape(&other.compactor)
            && self.frontend.same_shape(&other.frontend)
            && self.meta.same_shape(&other.meta)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResources {
    pub components: ClusterComponents,
    pub enable_compute_file_cache: bool,
    #[serde(rename = "computeFileCacheSizeGiB")]
    pub compute_file_cache_size_gib: u32,
    #[serde(rename = "etcdVolumeSizeGiB")]
    pub metastore_volume_size_gib: u32,
}

impl Default for ClusterResources {
    fn default() -> Self {
        Self {
            components: ClusterComponents::default(),
            enable_compute_file_cache: true,
            compute_file_cache_size_gib: 20,
            metastore_volume_size_gib: 20,
        }
    }
}

/// A managed streaming-database cluster (a "tenant" on the wire)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Region-scoped numeric id
    #[serde(default)]
    pub id: u64,
    pub ns_id: Uuid,
    #[serde(rename = "tenantName")]
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub tier: TierId,
    pub image_tag: String,
    #[serde(rename = "rwConfig", default)]
    pub engine_config: String,
    #[serde(rename = "etcdConfig", default)]
    pub metastore_config: String,
    pub resources: ClusterResources,
    pub status: ClusterStatus,
    #[serde(rename = "healthStatus", default)]
    pub health: HealthStatus,
}

impl Cluster {
    /// Running and healthy in the same observation
    pub fn is_ready(&self) -> bool {
        self.status == ClusterStatus::Running && self.health == HealthStatus::Healthy
    }
}

/// Account-level cluster record used to locate the owning region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub id: u64,
    pub ns_id: Uuid,
    pub region: String,
    #[serde(rename = "tenantName")]
    pub name: String,
}

/// One entry of the region directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionInfo {
    pub region_name: String,
    pub url: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default, rename = "isBYOCOnly")]
    pub is_byoc_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRequest {
    pub component_type_id: String,
    pub replica: u32,
}

impl From<&ComponentResource> for ComponentRequest {
    fn from(c: &ComponentResource) -> Self {
        Self {
            component_type_id: c.component_type_id.clone(),
            replica: c.replica,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentsRequest {
    pub compute: ComponentRequest,
    pub compactor: ComponentRequest,
    pub frontend: ComponentRequest,
    pub meta: ComponentRequest,
    #[serde(rename = "etcd")]
    pub metastore: ComponentRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesRequest {
    pub components: ComponentsRequest,
    pub enable_compute_file_cache: bool,
    #[serde(rename = "computeFileCacheSizeGiB")]
    pub compute_file_cache_size_gib: u32,
    #[serde(rename = "etcdVolumeSizeGiB")]
    pub metastore_volume_size_gib: u32,
}

/// Body of the create-cluster call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClusterRequest {
    pub tenant_name: String,
    pub image_tag: String,
    pub tier: TierId,
    #[serde(rename = "rwConfig")]
    pub engine_config: String,
    #[serde(rename = "etcdConfig")]
    pub metastore_config: String,
    pub resources: ResourcesRequest,
}

impl CreateClusterRequest {
    /// Build the create body from a declared cluster
    pub fn from_cluster(cluster: &Cluster) -> Self {
        let r = &cluster.resources;
        Self {
            tenant_name: cluster.name.clone(),
            image_tag: cluster.image_tag.clone(),
            tier: cluster.tier,
            engine_config: cluster.engine_config.clone(),
            metastore_config: cluster.metastore_config.clone(),
            resources: ResourcesRequest {
                components: ComponentsRequest {
                    compute: (&r.components.compute).into(),
                    compactor: (&r.components.compactor).into(),
                    frontend: (&r.components.frontend).into(),
                    meta: (&r.components.meta).into(),
                    metastore: (&r.components.metastore).into(),
                },
                enable_compute_file_cache: r.enable_compute_file_cache,
                compute_file_cache_size_gib: r.compute_file_cache_size_gib,
                metastore_volume_size_gib: r.metastore_volume_size_gib,
            },
        }
    }
}

/// Body of the resource-shape update; the metadata store is not included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResourcesRequest {
    pub compute: ComponentRequest,
    pub compactor: ComponentRequest,
    pub frontend: ComponentRequest,
    pub meta: ComponentRequest,
}

impl From<&ClusterComponents> for UpdateResourcesRequest {
    fn from(c: &ClusterComponents) -> Self {
        Self {
            compute: (&c.compute).into(),
            compactor: (&c.compactor).into(),
            frontend: (&c.frontend).into(),
            meta: (&c.meta).into(),
        }
    }
}

/// Database user of a cluster; the password is never returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterUser {
    pub username: String,
    #[serde(rename = "usecreatedb")]
    pub createdb: bool,
    #[serde(rename = "usesuper")]
    pub superuser: bool,
    #[serde(rename = "usesysid", default)]
    pub sys_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub tenant_id: u64,
    pub username: String,
    pub password: String,
    pub createdb: bool,
    pub superuser: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserPasswordRequest {
    pub tenant_id: u64,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserList {
    #[serde(default)]
    pub dbusers: Option<Vec<ClusterUser>>,
}

/// Status of a private link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivateLinkStatus {
    Creating,
    Created,
    Deleting,
    Error,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for PrivateLinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrivateLinkStatus::Creating => "CREATING",
            PrivateLinkStatus::Created => "CREATED",
            PrivateLinkStatus::Deleting => "DELETING",
            PrivateLinkStatus::Error => "ERROR",
            PrivateLinkStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Private network connection between a cluster and a target in the
/// caller's network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateLink {
    pub id: Uuid,
    pub tenant_id: u64,
    pub connection_name: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub status: PrivateLinkStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrivateLinkRequest {
    pub connection_name: String,
    pub target: String,
}

/// A private link together with the cluster that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateLinkInfo {
    pub cluster_ns_id: Uuid,
    pub private_link: PrivateLink,
}

/// Account-level private link record, used to find the owning region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPrivateLink {
    pub id: Uuid,
    pub region: String,
    pub tenant_id: u64,
    #[serde(default)]
    pub connection_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateLinkPage {
    pub private_links: Vec<AccountPrivateLink>,
    pub offset: u64,
    pub limit: u64,
    pub size: u64,
}

/// Allowed (cpu, memory) combination for a component in a tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableComponentType {
    pub id: String,
    pub cpu: String,
    pub memory: String,
    pub maximum: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableMetaStore {
    #[serde(default)]
    pub etcd_nodes: Vec<AvailableComponentType>,
}

/// Reference data for one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
    pub id: Option<TierId>,
    #[serde(default)]
    pub available_compute_nodes: Vec<AvailableComponentType>,
    #[serde(default)]
    pub available_compactor_nodes: Vec<AvailableComponentType>,
    #[serde(default)]
    pub available_frontend_nodes: Vec<AvailableComponentType>,
    #[serde(default)]
    pub available_meta_nodes: Vec<AvailableComponentType>,
    #[serde(default)]
    pub available_meta_store: AvailableMetaStore,
    #[serde(default, rename = "maximumEtcdSizeGiB")]
    pub maximum_metastore_size_gib: u32,
}

impl Tier {
    /// Reference list for a component by its wire name
    pub fn component_types(&self, component: &str) -> Option<&[AvailableComponentType]> {
        match component {
            COMPONENT_COMPUTE => Some(&self.available_compute_nodes),
            COMPONENT_COMPACTOR => Some(&self.available_compactor_nodes),
            COMPONENT_FRONTEND => Some(&self.available_frontend_nodes),
            COMPONENT_META => Some(&self.available_meta_nodes),
            COMPONENT_METASTORE => Some(&self.available_meta_store.etcd_nodes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TierList {
    pub tiers: Vec<Tier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_wire_names() {
        let json = serde_json::json!({
            "id": 7,
            "nsId": "6a2c3f8e-8c1c-4a3e-9a55-7e9b6a0f3c11",
            "tenantName": "foo",
            "region": "us-east-1",
            "tier": "BYOC",
            "imageTag": "v1.9.0",
            "rwConfig": "[server]",
            "etcdConfig": "",
            "resources": {
                "components": {
                    "compute": {"componentTypeId": "p-2c8g", "cpu": "2", "memory": "8 GB", "replica": 1},
                    "compactor": {"componentTypeId": "p-1c4g", "replica": 1},
                    "frontend": {"componentTypeId": "p-1c4g", "replica": 1},
                    "meta": {"componentTypeId": "p-1c4g", "replica": 1},
                    "etcd": {"componentTypeId": "p-1c4g", "replica": 1}
                },
                "enableComputeFileCache": true,
                "computeFileCacheSizeGiB": 20,
                "etcdVolumeSizeGiB": 20
            },
            "status": "Running",
            "healthStatus": "Healthy"
        });

        let cluster: Cluster = serde_json::from_value(json).unwrap();
        assert_eq!(cluster.name, "foo");
        assert_eq!(cluster.tier, TierId::Byoc);
        assert_eq!(cluster.engine_config, "[server]");
        assert_eq!(cluster.resources.components.compute.cpu, "2");
        assert!(cluster.is_ready());
    }

    #[test]
    fn test_unknown_statuses_fall_back() {
        let status: ClusterStatus = serde_json::from_value(serde_json::json!("Quiescing")).unwrap();
        assert_eq!(status, ClusterStatus::Unknown);
        let link: PrivateLinkStatus =
            serde_json::from_value(serde_json::json!("PENDING_ACCEPT")).unwrap();
        assert_eq!(link, PrivateLinkStatus::Unknown);
        let created: PrivateLinkStatus = serde_json::from_value(serde_json::json!("CREATED")).unwrap();
        assert_eq!(created, PrivateLinkStatus::Created);
    }

    #[test]
    fn test_health_status_falls_back_and_defaults_to_unknown() {
        let health: HealthStatus = serde_json::from_value(serde_json::json!("Degraded")).unwrap();
        assert_eq!(health, HealthStatus::Unknown);
        let healthy: HealthStatus = serde_json::from_value(serde_json::json!("Healthy")).unwrap();
        assert_eq!(healthy, HealthStatus::Healthy);
        assert_eq!(HealthStatus::default(), HealthStatus::Unknown);
        assert_eq!(serde_json::to_value(HealthStatus::Unhealthy).unwrap(), "Unhealthy");
    }

    #[test]
    fn test_same_shape_ignores_derived_fields() {
        let a = ComponentResource {
            component_type_id: "p-1c4g".into(),
            cpu: "1".into(),
            memory: "4 GB".into(),
            replica: 2,
        };
        let b = ComponentResource::new("p-1c4g", 2);
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&ComponentResource::new("p-1c4g", 3)));
    }
}
