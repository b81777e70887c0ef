//! Cluster await-flows
//!
//! Each flow issues one mutation, expects it to be accepted (202) and then
//! polls the cluster until it reaches its terminal state: Running and Healthy
//! for create and update, absent for delete.

use std::future::Future;
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::{CloudClient, Observation, fetch_cluster};
use crate::api::{ApiResponse, RegionService};
use crate::error::{CoreError, Observed, Result};
use crate::model::{Cluster, ClusterStatus, CreateClusterRequest, UpdateResourcesRequest};
use crate::wait::{PollingParams, poll};

/// State a cluster wait loop is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Running,
    Ready,
}

impl Target {
    fn reached(self, cluster: &Cluster) -> bool {
        match self {
            Target::Running => cluster.status == ClusterStatus::Running,
            Target::Ready => cluster.is_ready(),
        }
    }

    fn describe(self, id: u64) -> String {
        match self {
            Target::Running => format!("cluster {id} to be running"),
            Target::Ready => format!("cluster {id} to be running and healthy"),
        }
    }
}

impl CloudClient {
    /// Create a cluster in `region` and wait until it is Running and Healthy
    ///
    /// Returns the cluster as read back after it became ready.
    ///
    /// # Errors
    ///
    /// - [`CoreError::RegionNotFound`] if `region` is not in the routing table
    /// - [`CoreError::UnexpectedStatus`] if the create call is not accepted
    /// - [`CoreError::ResourceFailed`] if the cluster enters Failed
    /// - [`CoreError::WaitTimeout`] or [`CoreError::Cancelled`] from the wait
    pub async fn create_cluster_and_wait(
        &self,
        region: &str,
        req: &CreateClusterRequest,
        cancel: &CancellationToken,
    ) -> Result<Cluster> {
        let operation = "create cluster";
        let service = self.router.get(region)?;
        info!(region, name = %req.tenant_name, tier = %req.tier, "creating cluster");

        let accepted = service
            .create_cluster(req)
            .await?
            .expect_body(operation, StatusCode::ACCEPTED)?;
        debug!(id = accepted.id, ns_id = %accepted.ns_id, "cluster creation accepted");
        self.progress.started(operation, &req.tenant_name);

        let params = self.polling.cluster_creation;
        let result = async {
            self.wait_cluster(service.as_ref(), accepted.id, &params, cancel, operation, Target::Running)
                .await?;
            self.wait_cluster(service.as_ref(), accepted.id, &params, cancel, operation, Target::Ready)
                .await?;
            fetch_cluster(service.as_ref(), accepted.id).await
        }
        .await;
        self.finish(operation, &req.tenant_name, result)
    }

    /// Delete a cluster by its global id and wait until it is gone
    ///
    /// Deleting a cluster that does not exist succeeds.
    pub async fn delete_cluster_and_wait(
        &self,
        ns_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (info, _) = match self.locate(ns_id).await {
            Ok(found) => found,
            Err(CoreError::ClusterNotFound(_)) => {
                info!(%ns_id, "cluster already absent");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.delete_cluster_in_region_and_wait(&info.region, info.id, cancel)
            .await
    }

    /// Delete a cluster by its region-scoped id and wait until it is gone
    pub async fn delete_cluster_in_region_and_wait(
        &self,
        region: &str,
        id: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let operation = "delete cluster";
        let service = self.router.get(region)?;
        info!(region, id, "deleting cluster");

        let res = service.delete_cluster(id).await?;
        if res.is_not_found() {
            info!(region, id, "cluster already absent");
            return Ok(());
        }
        res.expect_status(operation, &[StatusCode::ACCEPTED])?;
        let resource = format!("{region}/{id}");
        self.progress.started(operation, &resource);

        let observed = Observation::new();
        let result = {
            let service = service.as_ref();
            let observed = &observed;
            let progress = &self.progress;
            let start = Instant::now();
            poll(&self.polling.cluster_deletion, cancel, || async move {
                let res = service.get_cluster_by_id(id).await?;
                if res.is_not_found() {
                    return Ok(true);
                }
                let cluster = res.expect_body("get cluster", StatusCode::OK)?;
                progress.polling(operation, cluster.status, start.elapsed());
                observed.set(Observed::Cluster {
                    status: cluster.status,
                    health: cluster.health,
                });
                Ok(false)
            })
            .await
            .map_err(|e| e.with_wait_context(format!("cluster {id} to be deleted"), observed.get()))
        };
        self.finish(operation, &resource, result)
    }

    /// Upgrade the engine version and wait until the cluster is ready again
    pub async fn update_cluster_version_and_wait(
        &self,
        ns_id: Uuid,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<Cluster> {
        self.mutate_and_wait(ns_id, "update cluster version", cancel, |service, id| async move {
            service.update_cluster_version(id, version).await
        })
        .await
    }

    /// Replace the engine configuration and wait until the cluster is ready again
    pub async fn update_engine_config_and_wait(
        &self,
        ns_id: Uuid,
        config: &str,
        cancel: &CancellationToken,
    ) -> Result<Cluster> {
        self.mutate_and_wait(ns_id, "update engine config", cancel, |service, id| async move {
            service.update_engine_config(id, config).await
        })
        .await
    }

    /// Replace the metadata store configuration and wait until the cluster is
    /// ready again
    pub async fn update_metastore_config_and_wait(
        &self,
        ns_id: Uuid,
        config: &str,
        cancel: &CancellationToken,
    ) -> Result<Cluster> {
        self.mutate_and_wait(ns_id, "update meta store config", cancel, |service, id| async move {
            service.update_metastore_config(id, config).await
        })
        .await
    }

    /// Change the mutable component shapes and wait until the cluster is
    /// ready again
    pub async fn update_cluster_resources_and_wait(
        &self,
        ns_id: Uuid,
        req: &UpdateResourcesRequest,
        cancel: &CancellationToken,
    ) -> Result<Cluster> {
        self.mutate_and_wait(ns_id, "update cluster resources", cancel, |service, id| async move {
            service.update_cluster_resources(id, req).await
        })
        .await
    }

    async fn mutate_and_wait<F, Fut>(
        &self,
        ns_id: Uuid,
        operation: &str,
        cancel: &CancellationToken,
        issue: F,
    ) -> Result<Cluster>
    where
        F: FnOnce(Arc<dyn RegionService>, u64) -> Fut,
        Fut: Future<Output = Result<ApiResponse<()>>>,
    {
        let (info, service) = self.locate(ns_id).await?;
        info!(%ns_id, region = %info.region, id = info.id, operation, "updating cluster");

        issue(Arc::clone(&service), info.id)
            .await?
            .expect_status(operation, &[StatusCode::ACCEPTED])?;
        self.progress.started(operation, &info.name);

        let result = async {
            self.wait_cluster(
                service.as_ref(),
                info.id,
                &self.polling.cluster_update,
                cancel,
                operation,
                Target::Ready,
            )
            .await?;
            fetch_cluster(service.as_ref(), info.id).await
        }
        .await;
        self.finish(operation, &info.name, result)
    }

    async fn wait_cluster(
        &self,
        service: &dyn RegionService,
        id: u64,
        params: &PollingParams,
        cancel: &CancellationToken,
        operation: &str,
        target: Target,
    ) -> Result<()> {
        let observed = Observation::new();
        let result = {
            let observed = &observed;
            let progress = &self.progress;
            let start = Instant::now();
            poll(params, cancel, || async move {
                let cluster = fetch_cluster(service, id).await?;
                if cluster.status == ClusterStatus::Failed {
                    return Err(CoreError::ResourceFailed(format!(
                        "cluster {} ({id}) entered status {}",
                        cluster.name, cluster.status
                    )));
                }
                progress.polling(operation, cluster.status, start.elapsed());
                observed.set(Observed::Cluster {
                    status: cluster.status,
                    health: cluster.health,
                });
                Ok(target.reached(&cluster))
            })
            .await
        };
        result.map_err(|e| e.with_wait_context(target.describe(id), observed.get()))
    }
}
