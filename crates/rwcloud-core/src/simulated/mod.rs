//! In-memory control plane
//!
//! [`SimulatedBackend`] implements [`AccountService`], [`RegionService`] (per
//! region, through [`SimulatedRegion`]) and [`RegionConnector`], so the same
//! await-flows run against it as against the live API. It is constructed
//! explicitly and shared by cloning; clones see the same state.
//!
//! Each region has its own reader/writer lock and no operation ever holds
//! two region locks at once. Mutations answer with the same status codes as
//! the live API and resolve asynchronously on the tokio clock according to
//! [`SimulationOptions`]; with the default zero delays they settle
//! immediately.
//!
//! Every mutation call is appended to a journal that tests can inspect with
//! [`SimulatedBackend::journal`].

mod state;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use self::state::{ClusterRecord, LinkRecord, Pending, RegionState, UserRecord};
use crate::api::{AccountService, ApiResponse, RegionConnector, RegionService};
use crate::error::{CoreError, Result};
use crate::model::{
    AccountPrivateLink, AvailableComponentType, AvailableMetaStore, Cluster, ClusterComponents,
    ClusterInfo, ClusterResources, ClusterStatus, ClusterUser, ComponentRequest,
    ComponentResource, CreateClusterRequest, CreatePrivateLinkRequest, CreateUserRequest,
    HealthStatus, PrivateLink, PrivateLinkPage, PrivateLinkStatus, RegionInfo, Tier, TierId,
    UpdateResourcesRequest, UpdateUserPasswordRequest,
};

/// Timing of simulated asynchronous transitions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationOptions {
    /// Time from an accepted cluster or private-link mutation until its
    /// status resolves (Running, Created, or gone)
    pub settle_delay: Duration,
    /// Additional time a Running cluster stays unhealthy
    pub health_delay: Duration,
    /// Time a newly created private link stays invisible to reads
    pub link_visibility_delay: Duration,
}

/// A mutation call received by the simulated backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    CreateCluster { region: String, name: String },
    DeleteCluster { region: String, id: u64 },
    UpdateVersion { region: String, id: u64, version: String },
    UpdateEngineConfig { region: String, id: u64 },
    UpdateMetaStoreConfig { region: String, id: u64 },
    UpdateResources {
        region: String,
        id: u64,
        request: UpdateResourcesRequest,
    },
    CreateUser { region: String, id: u64, username: String },
    UpdateUserPassword { region: String, id: u64, username: String },
    DeleteUser { region: String, id: u64, username: String },
    CreatePrivateLink { region: String, id: u64 },
    DeletePrivateLink { region: String, id: u64, link_id: Uuid },
}

impl RecordedCall {
    pub fn region(&self) -> &str {
        match self {
            RecordedCall::CreateCluster { region, .. }
            | RecordedCall::DeleteCluster { region, .. }
            | RecordedCall::UpdateVersion { region, .. }
            | RecordedCall::UpdateEngineConfig { region, .. }
            | RecordedCall::UpdateMetaStoreConfig { region, .. }
            | RecordedCall::UpdateResources { region, .. }
            | RecordedCall::CreateUser { region, .. }
            | RecordedCall::UpdateUserPassword { region, .. }
            | RecordedCall::DeleteUser { region, .. }
            | RecordedCall::CreatePrivateLink { region, .. }
            | RecordedCall::DeletePrivateLink { region, .. } => region,
        }
    }
}

struct Shared {
    regions: HashMap<String, Arc<RwLock<RegionState>>>,
    options: SimulationOptions,
    tiers: Vec<Tier>,
    next_id: AtomicU64,
    credentials_valid: AtomicBool,
    journal: Mutex<Vec<RecordedCall>>,
}

/// Shared handle to the in-memory control plane
#[derive(Clone)]
pub struct SimulatedBackend {
    inner: Arc<Shared>,
}

impl SimulatedBackend {
    /// Backend serving `regions`, settling every transition immediately
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_options(regions, SimulationOptions::default())
    }

    pub fn with_options<I, S>(regions: I, options: SimulationOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_tiers(regions, options, default_tiers())
    }

    pub fn with_tiers<I, S>(regions: I, options: SimulationOptions, tiers: Vec<Tier>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let regions = regions
            .into_iter()
            .map(|r| (r.into(), Arc::new(RwLock::new(RegionState::default()))))
            .collect();
        Self {
            inner: Arc::new(Shared {
                regions,
                options,
                tiers,
                next_id: AtomicU64::new(1),
                credentials_valid: AtomicBool::new(true),
                journal: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn options(&self) -> SimulationOptions {
        self.inner.options
    }

    /// Regional service for `region`
    pub fn region(&self, region: &str) -> Result<SimulatedRegion> {
        let state = self
            .inner
            .regions
            .get(region)
            .cloned()
            .ok_or_else(|| CoreError::RegionNotFound(region.to_string()))?;
        Ok(SimulatedRegion {
            name: region.to_string(),
            state,
            backend: self.clone(),
        })
    }

    /// Region names, sorted
    pub fn regions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.regions.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Make `ping` answer 403 until re-enabled
    pub fn set_credentials_valid(&self, valid: bool) {
        self.inner.credentials_valid.store(valid, Ordering::SeqCst);
    }

    /// Snapshot of every mutation call received so far, in arrival order
    pub fn journal(&self) -> Vec<RecordedCall> {
        self.lock_journal().clone()
    }

    pub fn clear_journal(&self) {
        self.lock_journal().clear();
    }

    /// Clusters of `region` as currently observed, in insertion order
    pub async fn clusters(&self, region: &str) -> Result<Vec<Cluster>> {
        let state = self.region(region)?.state;
        let now = Instant::now();
        let guard = state.read().await;
        Ok(guard.clusters.iter().filter_map(|r| r.view(now)).collect())
    }

    /// Store `cluster` as-is in its region, already settled
    ///
    /// A zero `id` is replaced by a fresh one. Returns the stored cluster.
    pub async fn insert_cluster(&self, mut cluster: Cluster) -> Result<Cluster> {
        let state = self.region(&cluster.region)?.state;
        if cluster.id == 0 {
            cluster.id = self.next_id();
        }
        let mut guard = state.write().await;
        guard.settle(Instant::now());
        guard.clusters.push(ClusterRecord::new(cluster.clone(), None));
        Ok(cluster)
    }

    /// Replace the stored cluster with the same ns_id wholesale
    ///
    /// Users and private links are kept; any pending transition is dropped.
    pub async fn replace_cluster(&self, cluster: Cluster) -> Result<()> {
        let state = self.region(&cluster.region)?.state;
        let now = Instant::now();
        let mut guard = state.write().await;
        guard.settle(now);
        let record = guard
            .by_ns_id_mut(cluster.ns_id, now)
            .ok_or_else(|| CoreError::ClusterNotFound(cluster.ns_id.to_string()))?;
        record.cluster = cluster;
        record.pending = None;
        Ok(())
    }

    /// Force the status of a private link, e.g. to simulate a failed
    /// provisioning
    pub async fn set_private_link_status(
        &self,
        link_id: Uuid,
        status: PrivateLinkStatus,
    ) -> Result<()> {
        let now = Instant::now();
        for state in self.inner.regions.values() {
            let mut guard = state.write().await;
            guard.settle(now);
            for record in &mut guard.clusters {
                if let Some(link) = record.private_links.iter_mut().find(|l| l.link.id == link_id) {
                    link.link.status = status;
                    link.visible_at = link.visible_at.min(now);
                    return Ok(());
                }
            }
        }
        Err(CoreError::PrivateLinkNotFound(link_id.to_string()))
    }

    /// Stored password of a cluster user, if both exist
    pub async fn cluster_user_password(&self, ns_id: Uuid, username: &str) -> Option<String> {
        let now = Instant::now();
        for state in self.inner.regions.values() {
            let guard = state.read().await;
            if let Some(record) = guard.by_ns_id(ns_id, now) {
                return record.user(username).map(|u| u.password.clone());
            }
        }
        None
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn lock_journal(&self) -> std::sync::MutexGuard<'_, Vec<RecordedCall>> {
        self.inner
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: RecordedCall) {
        debug!(?call, "simulated mutation");
        self.lock_journal().push(call);
    }

    /// Fill cpu and memory from the reference data; `None` for a component
    /// type no tier offers
    fn component(&self, req: &ComponentRequest) -> Option<ComponentResource> {
        let known = self.inner.tiers.iter().find_map(|tier| {
            [
                &tier.available_compute_nodes,
                &tier.available_compactor_nodes,
                &tier.available_frontend_nodes,
                &tier.available_meta_nodes,
                &tier.available_meta_store.etcd_nodes,
            ]
            .into_iter()
            .flatten()
            .find(|t| t.id == req.component_type_id)
        })?;
        Some(ComponentResource {
            component_type_id: req.component_type_id.clone(),
            cpu: known.cpu.clone(),
            memory: known.memory.clone(),
            replica: req.replica,
        })
    }

    fn components<const N: usize>(
        &self,
        requests: [&ComponentRequest; N],
    ) -> std::result::Result<[ComponentResource; N], ApiResponse<()>> {
        let mut out = Vec::with_capacity(N);
        for req in requests {
            let resource = self.component(req).ok_or_else(|| {
                ApiResponse::empty(StatusCode::BAD_REQUEST).with_message(format!(
                    "unknown component type {}",
                    req.component_type_id
                ))
            })?;
            out.push(resource);
        }
        out.try_into().map_err(|_| ApiResponse::empty(StatusCode::INTERNAL_SERVER_ERROR))
    }

    fn converge(&self, now: Instant) -> Pending {
        let running_at = now + self.inner.options.settle_delay;
        Pending::Converge {
            running_at,
            healthy_at: running_at + self.inner.options.health_delay,
        }
    }
}

impl std::fmt::Debug for SimulatedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBackend")
            .field("regions", &self.regions())
            .field("options", &self.inner.options)
            .finish()
    }
}

#[async_trait]
impl AccountService for SimulatedBackend {
    async fn ping(&self) -> Result<ApiResponse<()>> {
        if self.inner.credentials_valid.load(Ordering::SeqCst) {
            Ok(ApiResponse::empty(StatusCode::OK))
        } else {
            Ok(ApiResponse::empty(StatusCode::FORBIDDEN).with_message("invalid API key"))
        }
    }

    async fn list_regions(&self) -> Result<ApiResponse<Vec<RegionInfo>>> {
        let regions = self
            .regions()
            .into_iter()
            .map(|name| RegionInfo {
                url: format!("simulated://{name}"),
                region_name: name,
                platform: "simulated".to_string(),
                is_byoc_only: false,
            })
            .collect();
        Ok(ApiResponse::new(StatusCode::OK, regions))
    }

    async fn get_cluster_info(&self, ns_id: Uuid) -> Result<ApiResponse<ClusterInfo>> {
        let now = Instant::now();
        for name in self.regions() {
            let state = self.region(&name)?.state;
            let guard = state.read().await;
            if let Some(c) = guard.by_ns_id(ns_id, now).and_then(|r| r.view(now)) {
                return Ok(ApiResponse::new(
                    StatusCode::OK,
                    ClusterInfo {
                        id: c.id,
                        ns_id: c.ns_id,
                        region: c.region,
                        name: c.name,
                    },
                ));
            }
        }
        Ok(not_found(format!("cluster {ns_id} not found")))
    }

    async fn list_private_links(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<ApiResponse<PrivateLinkPage>> {
        if limit == 0 {
            return Ok(ApiResponse::empty(StatusCode::BAD_REQUEST).with_message("limit must be positive"));
        }
        let now = Instant::now();
        let mut all = Vec::new();
        for name in self.regions() {
            let state = self.region(&name)?.state;
            let guard = state.read().await;
            for record in guard.clusters.iter().filter(|r| r.is_visible(now)) {
                all.extend(record.private_links.iter().filter_map(|l| l.view(now)).map(
                    |link| AccountPrivateLink {
                        id: link.id,
                        region: name.clone(),
                        tenant_id: link.tenant_id,
                        connection_name: link.connection_name,
                    },
                ));
            }
        }

        let size = all.len() as u64;
        let page = all
            .into_iter()
            .skip(offset.saturating_mul(limit) as usize)
            .take(limit as usize)
            .collect();
        Ok(ApiResponse::new(
            StatusCode::OK,
            PrivateLinkPage {
                private_links: page,
                offset,
                limit,
                size,
            },
        ))
    }
}

impl RegionConnector for SimulatedBackend {
    fn connect(&self, region: &RegionInfo) -> Result<Arc<dyn RegionService>> {
        Ok(Arc::new(self.region(&region.region_name)?))
    }
}

/// One region of a [`SimulatedBackend`]
#[derive(Clone)]
pub struct SimulatedRegion {
    name: String,
    state: Arc<RwLock<RegionState>>,
    backend: SimulatedBackend,
}

impl SimulatedRegion {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a settled cluster for a mutation; `None` when it is missing
    /// or being deleted
    fn record_mut<'a>(
        guard: &'a mut RegionState,
        id: u64,
        now: Instant,
    ) -> std::result::Result<&'a mut ClusterRecord, ApiResponse<()>> {
        guard.settle(now);
        match guard.by_id_mut(id, now) {
            None => Err(not_found(format!("cluster {id} not found"))),
            Some(r) if r.is_deleting() => Err(ApiResponse::empty(StatusCode::CONFLICT)
                .with_message(format!("cluster {id} is being deleted"))),
            Some(r) => Ok(r),
        }
    }

    /// Apply a desired-state change that the cluster converges to asynchronously
    async fn update<F>(&self, id: u64, call: RecordedCall, apply: F) -> Result<ApiResponse<()>>
    where
        F: FnOnce(&mut Cluster) + Send,
    {
        self.backend.record(call);
        let now = Instant::now();
        let mut guard = self.state.write().await;
        let record = match Self::record_mut(&mut guard, id, now) {
            Ok(r) => r,
            Err(res) => return Ok(res),
        };
        apply(&mut record.cluster);
        record.cluster.status = ClusterStatus::Updating;
        record.pending = Some(self.backend.converge(now));
        Ok(ApiResponse::empty(StatusCode::ACCEPTED))
    }
}

impl std::fmt::Debug for SimulatedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedRegion")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl RegionService for SimulatedRegion {
    async fn get_cluster_by_id(&self, id: u64) -> Result<ApiResponse<Cluster>> {
        let now = Instant::now();
        let guard = self.state.read().await;
        Ok(match guard.by_id(id, now).and_then(|r| r.view(now)) {
            Some(c) => ApiResponse::new(StatusCode::OK, c),
            None => not_found(format!("cluster {id} not found")),
        })
    }

    async fn get_cluster_by_name(&self, name: &str) -> Result<ApiResponse<Cluster>> {
        let now = Instant::now();
        let guard = self.state.read().await;
        Ok(match guard.by_name(name, now).and_then(|r| r.view(now)) {
            Some(c) => ApiResponse::new(StatusCode::OK, c),
            None => not_found(format!("cluster {name} not found")),
        })
    }

    async fn create_cluster(&self, req: &CreateClusterRequest) -> Result<ApiResponse<Cluster>> {
        self.backend.record(RecordedCall::CreateCluster {
            region: self.name.clone(),
            name: req.tenant_name.clone(),
        });
        if req.tenant_name.is_empty() {
            return Ok(ApiResponse::empty(StatusCode::BAD_REQUEST)
                .with_message("cluster name must not be empty"));
        }

        let r = &req.resources;
        let c = &r.components;
        let [compute, compactor, frontend, meta, metastore] = match self.backend.components([
            &c.compute,
            &c.compactor,
            &c.frontend,
            &c.meta,
            &c.metastore,
        ]) {
            Ok(resolved) => resolved,
            Err(res) => return Ok(ApiResponse::empty(res.status).with_message(res.message)),
        };
        let cluster = Cluster {
            id: self.backend.next_id(),
            ns_id: Uuid::new_v4(),
            name: req.tenant_name.clone(),
            region: self.name.clone(),
            tier: req.tier,
            image_tag: req.image_tag.clone(),
            engine_config: req.engine_config.clone(),
            metastore_config: req.metastore_config.clone(),
            resources: ClusterResources {
                components: ClusterComponents {
                    compute,
                    compactor,
                    frontend,
                    meta,
                    metastore,
                },
                enable_compute_file_cache: r.enable_compute_file_cache,
                compute_file_cache_size_gib: r.compute_file_cache_size_gib,
                metastore_volume_size_gib: r.metastore_volume_size_gib,
            },
            status: ClusterStatus::Creating,
            health: HealthStatus::Unknown,
        };

        let now = Instant::now();
        let mut guard = self.state.write().await;
        guard.settle(now);
        if guard.by_name(&cluster.name, now).is_some() {
            return Ok(ApiResponse::empty(StatusCode::CONFLICT)
                .with_message(format!("cluster {} already exists", cluster.name)));
        }
        let record = ClusterRecord::new(cluster, Some(self.backend.converge(now)));
        let accepted = record.view(now);
        guard.clusters.push(record);
        Ok(match accepted {
            Some(c) => ApiResponse::new(StatusCode::ACCEPTED, c),
            None => ApiResponse::empty(StatusCode::ACCEPTED),
        })
    }

    async fn delete_cluster(&self, id: u64) -> Result<ApiResponse<()>> {
        self.backend.record(RecordedCall::DeleteCluster {
            region: self.name.clone(),
            id,
        });
        let now = Instant::now();
        let mut guard = self.state.write().await;
        guard.settle(now);
        let Some(record) = guard.by_id_mut(id, now) else {
            return Ok(not_found(format!("cluster {id} not found")));
        };
        if !record.is_deleting() {
            record.cluster.status = ClusterStatus::Deleting;
            record.pending = Some(Pending::Delete {
                gone_at: now + self.backend.inner.options.settle_delay,
            });
        }
        Ok(ApiResponse::empty(StatusCode::ACCEPTED))
    }

    async fn update_cluster_version(&self, id: u64, version: &str) -> Result<ApiResponse<()>> {
        let call = RecordedCall::UpdateVersion {
            region: self.name.clone(),
            id,
            version: version.to_string(),
        };
        self.update(id, call, |c| c.image_tag = version.to_string())
            .await
    }

    async fn update_engine_config(&self, id: u64, config: &str) -> Result<ApiResponse<()>> {
        let call = RecordedCall::UpdateEngineConfig {
            region: self.name.clone(),
            id,
        };
        self.update(id, call, |c| c.engine_config = config.to_string())
            .await
    }

    async fn update_metastore_config(&self, id: u64, config: &str) -> Result<ApiResponse<()>> {
        let call = RecordedCall::UpdateMetaStoreConfig {
            region: self.name.clone(),
            id,
        };
        self.update(id, call, |c| c.metastore_config = config.to_string())
            .await
    }

    async fn update_cluster_resources(
        &self,
        id: u64,
        req: &UpdateResourcesRequest,
    ) -> Result<ApiResponse<()>> {
        let call = RecordedCall::UpdateResources {
            region: self.name.clone(),
            id,
            request: req.clone(),
        };
        let components = match self
            .backend
            .components([&req.compute, &req.compactor, &req.frontend, &req.meta])
        {
            Ok(resolved) => resolved,
            Err(res) => {
                self.backend.record(call);
                return Ok(res);
            }
        };
        self.update(id, call, move |c| {
            let [compute, compactor, frontend, meta] = components;
            let target = &mut c.resources.components;
            target.compute = compute;
            target.compactor = compactor;
            target.frontend = frontend;
            target.meta = meta;
        })
        .await
    }

    async fn get_tiers(&self) -> Result<ApiResponse<Vec<Tier>>> {
        Ok(ApiResponse::new(StatusCode::OK, self.backend.inner.tiers.clone()))
    }

    async fn list_cluster_users(&self, id: u64) -> Result<ApiResponse<Vec<ClusterUser>>> {
        let now = Instant::now();
        let guard = self.state.read().await;
        Ok(match guard.by_id(id, now) {
            Some(record) => ApiResponse::new(
                StatusCode::OK,
                record.users.iter().map(|u| u.user.clone()).collect(),
            ),
            None => not_found(format!("cluster {id} not found")),
        })
    }

    async fn create_cluster_user(
        &self,
        req: &CreateUserRequest,
    ) -> Result<ApiResponse<ClusterUser>> {
        self.backend.record(RecordedCall::CreateUser {
            region: self.name.clone(),
            id: req.tenant_id,
            username: req.username.clone(),
        });
        let now = Instant::now();
        let sys_id = self.backend.next_id();
        let mut guard = self.state.write().await;
        guard.settle(now);
        let Some(record) = guard.by_id_mut(req.tenant_id, now) else {
            return Ok(not_found(format!("cluster {} not found", req.tenant_id)));
        };
        if record.user(&req.username).is_some() {
            return Ok(ApiResponse::empty(StatusCode::CONFLICT)
                .with_message(format!("user {} already exists", req.username)));
        }
        let user = ClusterUser {
            username: req.username.clone(),
            createdb: req.createdb,
            superuser: req.superuser,
            sys_id,
        };
        record.users.push(UserRecord {
            user: user.clone(),
            password: req.password.clone(),
        });
        Ok(ApiResponse::new(StatusCode::OK, user))
    }

    async fn update_cluster_user_password(
        &self,
        req: &UpdateUserPasswordRequest,
    ) -> Result<ApiResponse<()>> {
        self.backend.record(RecordedCall::UpdateUserPassword {
            region: self.name.clone(),
            id: req.tenant_id,
            username: req.username.clone(),
        });
        let now = Instant::now();
        let mut guard = self.state.write().await;
        guard.settle(now);
        let Some(record) = guard.by_id_mut(req.tenant_id, now) else {
            return Ok(not_found(format!("cluster {} not found", req.tenant_id)));
        };
        let Some(user) = record.user_mut(&req.username) else {
            return Ok(not_found(format!("user {} not found", req.username)));
        };
        user.password = req.password.clone();
        Ok(ApiResponse::empty(StatusCode::OK))
    }

    async fn delete_cluster_user(&self, id: u64, username: &str) -> Result<ApiResponse<()>> {
        self.backend.record(RecordedCall::DeleteUser {
            region: self.name.clone(),
            id,
            username: username.to_string(),
        });
        let now = Instant::now();
        let mut guard = self.state.write().await;
        guard.settle(now);
        let Some(record) = guard.by_id_mut(id, now) else {
            return Ok(not_found(format!("cluster {id} not found")));
        };
        let before = record.users.len();
        record.users.retain(|u| u.user.username != username);
        Ok(if record.users.len() == before {
            not_found(format!("user {username} not found"))
        } else {
            ApiResponse::empty(StatusCode::OK)
        })
    }

    async fn get_private_link(&self, id: u64, link_id: Uuid) -> Result<ApiResponse<PrivateLink>> {
        let now = Instant::now();
        let guard = self.state.read().await;
        let Some(record) = guard.by_id(id, now) else {
            return Ok(not_found(format!("cluster {id} not found")));
        };
        Ok(match record.link(link_id, now) {
            Some(link) => ApiResponse::new(StatusCode::OK, link),
            None => not_found(format!("private link {link_id} not found")),
        })
    }

    async fn create_private_link(
        &self,
        id: u64,
        req: &CreatePrivateLinkRequest,
    ) -> Result<ApiResponse<PrivateLink>> {
        self.backend.record(RecordedCall::CreatePrivateLink {
            region: self.name.clone(),
            id,
        });
        if req.connection_name.is_empty() || req.target.is_empty() {
            return Ok(ApiResponse::empty(StatusCode::BAD_REQUEST)
                .with_message("connection name and target are required"));
        }
        let now = Instant::now();
        let options = self.backend.inner.options;
        let mut guard = self.state.write().await;
        guard.settle(now);
        let Some(record) = guard.by_id_mut(id, now) else {
            return Ok(not_found(format!("cluster {id} not found")));
        };
        let link = PrivateLink {
            id: Uuid::new_v4(),
            tenant_id: id,
            connection_name: req.connection_name.clone(),
            target: Some(req.target.clone()),
            endpoint: None,
            status: PrivateLinkStatus::Creating,
        };
        record.private_links.push(LinkRecord {
            link: link.clone(),
            visible_at: now + options.link_visibility_delay,
            created_at: now + options.settle_delay,
            gone_at: None,
            resolved_endpoint: format!("{}.privatelink.{}.simulated", req.connection_name, self.name),
        });
        Ok(ApiResponse::new(StatusCode::ACCEPTED, link))
    }

    async fn delete_private_link(&self, id: u64, link_id: Uuid) -> Result<ApiResponse<()>> {
        self.backend.record(RecordedCall::DeletePrivateLink {
            region: self.name.clone(),
            id,
            link_id,
        });
        let now = Instant::now();
        let gone_at = now + self.backend.inner.options.settle_delay;
        let mut guard = self.state.write().await;
        guard.settle(now);
        let Some(record) = guard.by_id_mut(id, now) else {
            return Ok(not_found(format!("cluster {id} not found")));
        };
        let Some(link) = record.link_mut(link_id, now) else {
            return Ok(not_found(format!("private link {link_id} not found")));
        };
        if link.gone_at.is_none() {
            link.gone_at = Some(gone_at);
        }
        Ok(ApiResponse::empty(StatusCode::ACCEPTED))
    }
}

fn not_found<T>(message: String) -> ApiResponse<T> {
    ApiResponse::empty(StatusCode::NOT_FOUND).with_message(message)
}

/// Reference data served by default: two shapes, three replicas at most,
/// for the Standard, BYOC and Invited tiers
pub fn default_tiers() -> Vec<Tier> {
    let types = vec![
        AvailableComponentType {
            id: "p-1c4g".to_string(),
            cpu: "1".to_string(),
            memory: "4 GB".to_string(),
            maximum: 3,
        },
        AvailableComponentType {
            id: "p-2c8g".to_string(),
            cpu: "2".to_string(),
            memory: "8 GB".to_string(),
            maximum: 3,
        },
    ];
    [TierId::Standard, TierId::Byoc, TierId::Invited]
        .into_iter()
        .map(|id| Tier {
            id: Some(id),
            available_compute_nodes: types.clone(),
            available_compactor_nodes: types.clone(),
            available_frontend_nodes: types.clone(),
            available_meta_nodes: types.clone(),
            available_meta_store: AvailableMetaStore {
                etcd_nodes: types.clone(),
            },
            maximum_metastore_size_gib: 20,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComponentsRequest;
    use crate::model::ResourcesRequest;

    fn component(id: &str, replica: u32) -> ComponentRequest {
        ComponentRequest {
            component_type_id: id.to_string(),
            replica,
        }
    }

    fn create_request(name: &str) -> CreateClusterRequest {
        CreateClusterRequest {
            tenant_name: name.to_string(),
            image_tag: "v1.9.0".to_string(),
            tier: TierId::Standard,
            engine_config: String::new(),
            metastore_config: String::new(),
            resources: ResourcesRequest {
                components: ComponentsRequest {
                    compute: component("p-2c8g", 1),
                    compactor: component("p-1c4g", 1),
                    frontend: component("p-1c4g", 1),
                    meta: component("p-1c4g", 1),
                    metastore: component("p-1c4g", 1),
                },
                enable_compute_file_cache: true,
                compute_file_cache_size_gib: 20,
                metastore_volume_size_gib: 20,
            },
        }
    }

    #[tokio::test]
    async fn test_create_fills_shape_from_reference_data() {
        let backend = SimulatedBackend::new(["us-east-1"]);
        let region = backend.region("us-east-1").unwrap();

        let res = region.create_cluster(&create_request("foo")).await.unwrap();
        assert_eq!(res.status, StatusCode::ACCEPTED);
        let cluster = res.body.unwrap();
        assert_eq!(cluster.resources.components.compute.cpu, "2");
        assert_eq!(cluster.resources.components.compute.memory, "8 GB");
        assert!(cluster.is_ready());

        let dup = region.create_cluster(&create_request("foo")).await.unwrap();
        assert_eq!(dup.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_component_type_is_rejected() {
        let backend = SimulatedBackend::new(["us-east-1"]);
        let region = backend.region("us-east-1").unwrap();

        let mut req = create_request("foo");
        req.resources.components.meta = component("p-64c256g", 1);
        let res = region.create_cluster(&req).await.unwrap();
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert!(res.message.contains("p-64c256g"));

        let id = region
            .create_cluster(&create_request("foo"))
            .await
            .unwrap()
            .body
            .unwrap()
            .id;
        let mut update = UpdateResourcesRequest::from(&ClusterComponents::default());
        update.compute = component("p-64c256g", 1);
        let res = region.update_cluster_resources(id, &update).await.unwrap();
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            region.get_cluster_by_id(id).await.unwrap().body.unwrap().status,
            ClusterStatus::Running
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_endpoint_appears_only_once_created() {
        let backend = SimulatedBackend::with_options(
            ["us-east-1"],
            SimulationOptions {
                settle_delay: Duration::from_secs(30),
                ..Default::default()
            },
        );
        let region = backend.region("us-east-1").unwrap();
        let id = region
            .create_cluster(&create_request("foo"))
            .await
            .unwrap()
            .body
            .unwrap()
            .id;
        let accepted = region
            .create_private_link(
                id,
                &CreatePrivateLinkRequest {
                    connection_name: "k".to_string(),
                    target: "svc".to_string(),
                },
            )
            .await
            .unwrap()
            .body
            .unwrap();
        assert!(accepted.endpoint.is_none());

        let creating = region.get_private_link(id, accepted.id).await.unwrap().body.unwrap();
        assert_eq!(creating.status, PrivateLinkStatus::Creating);
        assert!(creating.endpoint.is_none());

        tokio::time::advance(Duration::from_secs(30)).await;
        let created = region.get_private_link(id, accepted.id).await.unwrap().body.unwrap();
        assert_eq!(created.status, PrivateLinkStatus::Created);
        assert_eq!(created.endpoint.as_deref(), Some("k.privatelink.us-east-1.simulated"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_resolves_on_tokio_clock() {
        let backend = SimulatedBackend::with_options(
            ["us-east-1"],
            SimulationOptions {
                settle_delay: Duration::from_secs(10),
                health_delay: Duration::from_secs(5),
                ..Default::default()
            },
        );
        let region = backend.region("us-east-1").unwrap();
        let id = region
            .create_cluster(&create_request("foo"))
            .await
            .unwrap()
            .body
            .unwrap()
            .id;

        let status = |c: Cluster| (c.status, c.health);
        let observe = || async { region.get_cluster_by_id(id).await.unwrap().body.unwrap() };

        assert_eq!(status(observe().await), (ClusterStatus::Creating, HealthStatus::Unknown));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(status(observe().await), (ClusterStatus::Running, HealthStatus::Unknown));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(observe().await.is_ready());
    }

    #[tokio::test]
    async fn test_delete_is_404_once_gone() {
        let backend = SimulatedBackend::new(["us-east-1"]);
        let region = backend.region("us-east-1").unwrap();
        let id = region
            .create_cluster(&create_request("foo"))
            .await
            .unwrap()
            .body
            .unwrap()
            .id;

        assert_eq!(region.delete_cluster(id).await.unwrap().status, StatusCode::ACCEPTED);
        assert!(region.get_cluster_by_id(id).await.unwrap().is_not_found());
        assert!(region.delete_cluster(id).await.unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_write_lock_on_one_region_does_not_block_another() {
        let backend = SimulatedBackend::new(["us-east-1", "eu-west-1"]);
        let held = backend.region("us-east-1").unwrap().state;
        let _guard = held.write().await;

        let other = backend.region("eu-west-1").unwrap();
        let res = tokio::time::timeout(
            Duration::from_secs(1),
            other.create_cluster(&create_request("bar")),
        )
        .await
        .expect("create in another region must not wait on the held lock")
        .unwrap();
        assert_eq!(res.status, StatusCode::ACCEPTED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_replacements_never_interleave() {
        let backend = SimulatedBackend::new(["us-east-1"]);
        let region = backend.region("us-east-1").unwrap();
        let base = region
            .create_cluster(&create_request("foo"))
            .await
            .unwrap()
            .body
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..50 {
            let backend = backend.clone();
            let mut next = base.clone();
            next.image_tag = format!("v{i}");
            next.engine_config = format!("c{i}");
            tasks.push(tokio::spawn(async move { backend.replace_cluster(next).await }));

            let region = region.clone();
            let id = base.id;
            tasks.push(tokio::spawn(async move {
                let c = region.get_cluster_by_id(id).await?.body.unwrap();
                let tag = c.image_tag.trim_start_matches('v');
                let config = c.engine_config.trim_start_matches('c');
                assert!(
                    c.image_tag == "v1.9.0" || tag == config,
                    "torn write: {} / {}",
                    c.image_tag,
                    c.engine_config
                );
                Ok::<(), CoreError>(())
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let last = backend.clusters("us-east-1").await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(
            last[0].image_tag.trim_start_matches('v'),
            last[0].engine_config.trim_start_matches('c')
        );
    }

    #[tokio::test]
    async fn test_users_lifecycle() {
        let backend = SimulatedBackend::new(["us-east-1"]);
        let region = backend.region("us-east-1").unwrap();
        let id = region
            .create_cluster(&create_request("foo"))
            .await
            .unwrap()
            .body
            .unwrap()
            .id;

        let req = CreateUserRequest {
            tenant_id: id,
            username: "alice".into(),
            password: "pw".into(),
            createdb: true,
            superuser: false,
        };
        assert_eq!(region.create_cluster_user(&req).await.unwrap().status, StatusCode::OK);
        let users = region.list_cluster_users(id).await.unwrap().body.unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].createdb);

        assert_eq!(region.delete_cluster_user(id, "alice").await.unwrap().status, StatusCode::OK);
        assert!(region.delete_cluster_user(id, "alice").await.unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_journal_records_mutations_only() {
        let backend = SimulatedBackend::new(["us-east-1"]);
        let region = backend.region("us-east-1").unwrap();
        let id = region
            .create_cluster(&create_request("foo"))
            .await
            .unwrap()
            .body
            .unwrap()
            .id;
        region.get_cluster_by_id(id).await.unwrap();
        region.update_cluster_version(id, "v2.0.0").await.unwrap();

        let journal = backend.journal();
        assert_eq!(journal.len(), 2);
        assert_eq!(
            journal[1],
            RecordedCall::UpdateVersion {
                region: "us-east-1".into(),
                id,
                version: "v2.0.0".into(),
            }
        );
        assert_eq!(journal[1].region(), "us-east-1");
    }

    #[tokio::test]
    async fn test_private_link_paging_uses_page_index() {
        let backend = SimulatedBackend::new(["us-east-1"]);
        let region = backend.region("us-east-1").unwrap();
        let id = region
            .create_cluster(&create_request("foo"))
            .await
            .unwrap()
            .body
            .unwrap()
            .id;
        for i in 0..3 {
            let req = CreatePrivateLinkRequest {
                connection_name: format!("conn-{i}"),
                target: "svc".into(),
            };
            region.create_private_link(id, &req).await.unwrap();
        }

        let page = backend.list_private_links(1, 2).await.unwrap().body.unwrap();
        assert_eq!(page.size, 3);
        assert_eq!(page.private_links.len(), 1);
        assert_eq!(page.private_links[0].connection_name, "conn-2");
    }
}
