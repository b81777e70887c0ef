//! Cluster, user and private-link orchestration
//!
//! [`CloudClient`] is the entry point. It holds the account service, the
//! region routing table, the polling policies and an optional progress sink,
//! and exposes the await-flows:
//!
//! - cluster create / delete / targeted updates ([`cluster`])
//! - private link create / delete / lookup ([`private_link`])
//! - cluster users ([`user`])
//! - full reconciliation of a declared cluster ([`crate::reconcile`])
//!
//! Clusters are addressed by their global `ns_id`; each flow resolves the
//! owning region through the account service before talking to it.

pub mod cluster;
pub mod private_link;
pub mod user;

use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use tracing::info;
use uuid::Uuid;

use crate::api::http::HttpAccountClient;
use crate::api::{AccountService, RegionConnector, RegionService};
use crate::component::{ComponentSpec, available_component_types, resolve_component_type};
use crate::config::{Config, PollingConfig};
use crate::error::{CoreError, Result};
use crate::model::{AvailableComponentType, Cluster, ClusterInfo, ComponentResource, Tier, TierId};
use crate::progress::Progress;
use crate::region::RegionRouter;
use crate::simulated::SimulatedBackend;

/// Orchestrator over the account service and the regional services
#[derive(Clone)]
pub struct CloudClient {
    account: Arc<dyn AccountService>,
    router: RegionRouter,
    polling: PollingConfig,
    progress: Progress,
}

impl CloudClient {
    /// Build a client from an account service, discovering regions through it
    pub async fn connect(
        account: Arc<dyn AccountService>,
        connector: &dyn RegionConnector,
        polling: PollingConfig,
    ) -> Result<Self> {
        let router = RegionRouter::discover(account.as_ref(), connector).await?;
        Ok(Self::with_router(account, router, polling))
    }

    /// Build a client from an already populated routing table
    pub fn with_router(
        account: Arc<dyn AccountService>,
        router: RegionRouter,
        polling: PollingConfig,
    ) -> Self {
        Self {
            account,
            router,
            polling,
            progress: Progress::none(),
        }
    }

    /// Client over an in-memory backend
    pub async fn simulated(backend: SimulatedBackend, polling: PollingConfig) -> Result<Self> {
        let connector = backend.clone();
        Self::connect(Arc::new(backend), &connector, polling).await
    }

    /// Client for a loaded [`Config`]
    ///
    /// With `mock` set this builds a fresh simulated backend over
    /// `mock_regions`. Otherwise it connects to the live endpoint and checks
    /// the credentials before discovering regions.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        if config.mock {
            info!(regions = ?config.mock_regions, "using simulated backend");
            return Self::simulated(
                SimulatedBackend::new(config.mock_regions.iter().cloned()),
                config.polling,
            )
            .await;
        }

        let endpoint = config.endpoint();
        info!(endpoint, "connecting to control plane");
        let account = HttpAccountClient::new(endpoint, &config.api_key, &config.api_secret)?;
        let connector = account.connector();
        let account: Arc<dyn AccountService> = Arc::new(account);
        check_ping(account.as_ref()).await?;
        Self::connect(account, &connector, config.polling).await
    }

    /// Attach a progress sink to every await-flow of this client
    #[must_use]
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn router(&self) -> &RegionRouter {
        &self.router
    }

    pub fn polling(&self) -> &PollingConfig {
        &self.polling
    }

    pub(crate) fn progress(&self) -> &Progress {
        &self.progress
    }

    pub(crate) fn account(&self) -> &dyn AccountService {
        self.account.as_ref()
    }

    /// Report the outcome of an await-flow to the progress sink
    pub(crate) fn finish<T>(&self, operation: &str, resource: &str, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                info!(operation, resource, "completed");
                self.progress.completed(operation, resource);
            }
            Err(e) => {
                tracing::warn!(operation, resource, error = %e, "failed");
                self.progress.failed(operation, e);
            }
        }
        result
    }

    /// Check the endpoint and the credentials
    pub async fn ping(&self) -> Result<()> {
        check_ping(self.account.as_ref()).await
    }

    /// Regional service for `region`
    pub fn region(&self, region: &str) -> Result<Arc<dyn RegionService>> {
        self.router.get(region)
    }

    /// Locate the region and region-scoped id of a cluster
    pub async fn cluster_info(&self, ns_id: Uuid) -> Result<ClusterInfo> {
        let res = self.account.get_cluster_info(ns_id).await?;
        if res.is_not_found() {
            return Err(CoreError::ClusterNotFound(ns_id.to_string()));
        }
        res.expect_body("get cluster info", StatusCode::OK)
    }

    /// Cluster info plus the regional service that owns it
    pub(crate) async fn locate(&self, ns_id: Uuid) -> Result<(ClusterInfo, Arc<dyn RegionService>)> {
        let info = self.cluster_info(ns_id).await?;
        let region = self.router.get(&info.region)?;
        Ok((info, region))
    }

    pub async fn get_cluster(&self, ns_id: Uuid) -> Result<Cluster> {
        let (info, region) = self.locate(ns_id).await?;
        fetch_cluster(region.as_ref(), info.id).await
    }

    pub async fn get_cluster_by_name(&self, region: &str, name: &str) -> Result<Cluster> {
        let res = self.router.get(region)?.get_cluster_by_name(name).await?;
        if res.is_not_found() {
            return Err(CoreError::ClusterNotFound(format!("{region}/{name}")));
        }
        res.expect_body("get cluster by name", StatusCode::OK)
    }

    /// Whether a cluster named `name` exists in `region`
    pub async fn cluster_name_exists(&self, region: &str, name: &str) -> Result<bool> {
        match self.get_cluster_by_name(region, name).await {
            Ok(_) => Ok(true),
            Err(CoreError::ClusterNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Reference data of every tier available in `region`
    pub async fn get_tiers(&self, region: &str) -> Result<Vec<Tier>> {
        self.router
            .get(region)?
            .get_tiers()
            .await?
            .expect_body("get tiers", StatusCode::OK)
    }

    /// Component types `component` may use in `tier`
    pub async fn get_available_component_types(
        &self,
        region: &str,
        tier: TierId,
        component: &str,
    ) -> Result<Vec<AvailableComponentType>> {
        let tiers = self.get_tiers(region).await?;
        Ok(available_component_types(&tiers, tier, component)?.to_vec())
    }

    /// Resolve a (cpu, memory, replica) request to a component type of
    /// `tier` in `region`
    pub async fn resolve_component(
        &self,
        region: &str,
        tier: TierId,
        component: &str,
        spec: &ComponentSpec,
    ) -> Result<ComponentResource> {
        let available = self
            .get_available_component_types(region, tier, component)
            .await?;
        Ok(resolve_component_type(component, tier, &available, spec)?)
    }
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClient")
            .field("router", &self.router)
            .field("polling", &self.polling)
            .finish()
    }
}

async fn check_ping(account: &dyn AccountService) -> Result<()> {
    let res = account.ping().await?;
    if res.is(StatusCode::FORBIDDEN) {
        return Err(CoreError::InvalidCredential);
    }
    res.expect_status("ping", &[StatusCode::OK])?;
    Ok(())
}

/// Fetch a cluster by id; 404 is [`CoreError::ClusterNotFound`]
pub(crate) async fn fetch_cluster(region: &dyn RegionService, id: u64) -> Result<Cluster> {
    let res = region.get_cluster_by_id(id).await?;
    if res.is_not_found() {
        return Err(CoreError::ClusterNotFound(id.to_string()));
    }
    res.expect_body("get cluster", StatusCode::OK)
}

/// Last value seen by a poll condition, kept for timeout diagnostics
pub(crate) struct Observation<T>(Mutex<Option<T>>);

impl<T: Clone> Observation<T> {
    pub(crate) fn new() -> Self {
        Self(Mutex::new(None))
    }

    pub(crate) fn set(&self, value: T) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    pub(crate) fn get(&self) -> Option<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

const BASE32_CHARS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Lower-case base32 form of a UUID, always 26 characters starting with a
/// letter
pub fn ns_id_base32(ns_id: Uuid) -> String {
    // Two leading bits `10` make 130 bits in total.
    let mut buffer: u32 = 2;
    let mut buffer_len = 2;
    let mut out = String::with_capacity(26);

    for byte in ns_id.as_bytes() {
        buffer = ((buffer << 8) | u32::from(*byte)) & 0xffff;
        buffer_len += 8;
        while buffer_len >= 5 {
            let shift = buffer_len - 5;
            out.push(BASE32_CHARS[((buffer >> shift) & 0x1f) as usize] as char);
            buffer_len -= 5;
        }
    }
    out
}

/// Connection identifier of a cluster: base64 of `rwc-<base32(ns_id)>-<name>`
pub fn encoded_cluster_id(ns_id: Uuid, name: &str) -> String {
    STANDARD.encode(format!("rwc-{}-{name}", ns_id_base32(ns_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::COMPONENT_COMPUTE;

    #[test]
    fn test_base32_of_nil_uuid() {
        let encoded = ns_id_base32(Uuid::nil());
        assert_eq!(encoded.len(), 26);
        assert_eq!(encoded, format!("g{}", "0".repeat(25)));
    }

    #[test]
    fn test_base32_starts_with_letter() {
        for _ in 0..16 {
            let encoded = ns_id_base32(Uuid::new_v4());
            assert_eq!(encoded.len(), 26);
            assert!(encoded.chars().next().unwrap().is_ascii_alphabetic());
        }
    }

    #[test]
    fn test_encoded_cluster_id() {
        let id = encoded_cluster_id(Uuid::nil(), "foo");
        let decoded = String::from_utf8(STANDARD.decode(id).unwrap()).unwrap();
        assert_eq!(decoded, format!("rwc-g{}-foo", "0".repeat(25)));
    }

    #[tokio::test]
    async fn test_ping_maps_forbidden_to_invalid_credential() {
        let backend = SimulatedBackend::new(["us-east-1"]);
        let client = CloudClient::simulated(backend.clone(), PollingConfig::default())
            .await
            .unwrap();
        client.ping().await.unwrap();

        backend.set_credentials_valid(false);
        let err = client.ping().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredential);
    }

    #[tokio::test]
    async fn test_unknown_cluster() {
        let client = CloudClient::simulated(SimulatedBackend::new(["us-east-1"]), PollingConfig::default())
            .await
            .unwrap();
        let err = client.get_cluster(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!client.cluster_name_exists("us-east-1", "foo").await.unwrap());
        assert_eq!(
            client.cluster_name_exists("nowhere", "foo").await.unwrap_err().kind(),
            ErrorKind::RegionNotFound
        );
    }

    #[tokio::test]
    async fn test_resolve_component_against_region_tiers() {
        let client = CloudClient::simulated(SimulatedBackend::new(["us-east-1"]), PollingConfig::default())
            .await
            .unwrap();
        let resolved = client
            .resolve_component(
                "us-east-1",
                TierId::Standard,
                COMPONENT_COMPUTE,
                &ComponentSpec::new(2, 8, 1),
            )
            .await
            .unwrap();
        assert_eq!(resolved.component_type_id, "p-2c8g");

        let err = client
            .resolve_component(
                "us-east-1",
                TierId::Standard,
                COMPONENT_COMPUTE,
                &ComponentSpec::new(2, 8, 4),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ComponentResolution);
    }

    #[tokio::test]
    async fn test_from_config_mock() {
        let config = Config {
            mock: true,
            mock_regions: vec!["us-east-1".into()],
            ..Default::default()
        };
        let client = CloudClient::from_config(&config).await.unwrap();
        assert_eq!(client.router().regions(), vec!["us-east-1"]);
    }

    #[tokio::test]
    async fn test_from_config_requires_credentials() {
        let err = CloudClient::from_config(&Config::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
