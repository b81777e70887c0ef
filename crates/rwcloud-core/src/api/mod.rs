//! Service traits for the control plane
//!
//! The orchestrator only ever sees the control plane through
//! [`AccountService`] (global operations) and [`RegionService`] (operations
//! served by one regional endpoint). Each call returns an [`ApiResponse`]: the
//! HTTP-like status code plus the typed body when there is one. The state
//! machines decide what a status means; the services never interpret it.
//!
//! Two implementations exist: [`http`] talks to the live API with reqwest,
//! and [`crate::simulated`] keeps everything in memory.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::model::{
    ClusterInfo, Cluster, ClusterUser, CreateClusterRequest, CreatePrivateLinkRequest,
    CreateUserRequest, PrivateLink, PrivateLinkPage, RegionInfo, Tier, UpdateResourcesRequest,
    UpdateUserPasswordRequest,
};

/// Status code plus optional typed body of one control-plane call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: StatusCode,
    pub body: Option<T>,
    /// Raw error text returned with non-success statuses
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn new(status: StatusCode, body: T) -> Self {
        Self {
            status,
            body: Some(body),
            message: String::new(),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: None,
            message: String::new(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is(&self, status: StatusCode) -> bool {
        self.status == status
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    /// Fail with [`CoreError::UnexpectedStatus`] unless the status is one of
    /// `expected`
    pub fn expect_status(self, operation: &str, expected: &[StatusCode]) -> Result<Self> {
        if expected.contains(&self.status) {
            Ok(self)
        } else {
            Err(self.unexpected(operation, expected))
        }
    }

    /// Check the status and take the body, which must be present
    pub fn expect_body(self, operation: &str, expected: StatusCode) -> Result<T> {
        let status = self.status;
        let res = self.expect_status(operation, &[expected])?;
        res.body.ok_or_else(|| CoreError::UnexpectedStatus {
            operation: operation.to_string(),
            expected: vec![expected],
            actual: status,
            message: "response body is empty".to_string(),
        })
    }

    pub(crate) fn unexpected(&self, operation: &str, expected: &[StatusCode]) -> CoreError {
        CoreError::UnexpectedStatus {
            operation: operation.to_string(),
            expected: expected.to_vec(),
            actual: self.status,
            message: self.message.clone(),
        }
    }
}

/// Account-level operations, served by the global endpoint
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Check the endpoint and validate the API key: 200, or 403 for a bad key
    async fn ping(&self) -> Result<ApiResponse<()>>;

    /// Region directory: name and endpoint of every regional service
    async fn list_regions(&self) -> Result<ApiResponse<Vec<RegionInfo>>>;

    /// Locate a cluster by its global identifier
    async fn get_cluster_info(&self, ns_id: Uuid) -> Result<ApiResponse<ClusterInfo>>;

    /// One page of the account's private links
    async fn list_private_links(&self, offset: u64, limit: u64)
    -> Result<ApiResponse<PrivateLinkPage>>;
}

/// Operations served by one regional endpoint; clusters are addressed by
/// their region-scoped numeric id
#[async_trait]
pub trait RegionService: Send + Sync {
    async fn get_cluster_by_id(&self, id: u64) -> Result<ApiResponse<Cluster>>;

    async fn get_cluster_by_name(&self, name: &str) -> Result<ApiResponse<Cluster>>;

    /// 202 with the accepted cluster, including its assigned identifiers
    async fn create_cluster(&self, req: &CreateClusterRequest) -> Result<ApiResponse<Cluster>>;

    async fn delete_cluster(&self, id: u64) -> Result<ApiResponse<()>>;

    async fn update_cluster_version(&self, id: u64, version: &str) -> Result<ApiResponse<()>>;

    async fn update_engine_config(&self, id: u64, config: &str) -> Result<ApiResponse<()>>;

    async fn update_metastore_config(&self, id: u64, config: &str) -> Result<ApiResponse<()>>;

    async fn update_cluster_resources(
        &self,
        id: u64,
        req: &UpdateResourcesRequest,
    ) -> Result<ApiResponse<()>>;

    async fn get_tiers(&self) -> Result<ApiResponse<Vec<Tier>>>;

    async fn list_cluster_users(&self, id: u64) -> Result<ApiResponse<Vec<ClusterUser>>>;

    async fn create_cluster_user(&self, req: &CreateUserRequest)
    -> Result<ApiResponse<ClusterUser>>;

    async fn update_cluster_user_password(
        &self,
        req: &UpdateUserPasswordRequest,
    ) -> Result<ApiResponse<()>>;

    async fn delete_cluster_user(&self, id: u64, username: &str) -> Result<ApiResponse<()>>;

    async fn get_private_link(&self, id: u64, link_id: Uuid) -> Result<ApiResponse<PrivateLink>>;

    /// 202 with the accepted link, including its assigned id
    async fn create_private_link(
        &self,
        id: u64,
        req: &CreatePrivateLinkRequest,
    ) -> Result<ApiResponse<PrivateLink>>;

    async fn delete_private_link(&self, id: u64, link_id: Uuid) -> Result<ApiResponse<()>>;
}

/// Builds the regional client for one entry of the region directory
pub trait RegionConnector: Send + Sync {
    fn connect(&self, region: &RegionInfo) -> Result<Arc<dyn RegionService>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_expect_status_passes_matching() {
        let res = ApiResponse::new(StatusCode::ACCEPTED, 5u32);
        let body = res.expect_body("create cluster", StatusCode::ACCEPTED).unwrap();
        assert_eq!(body, 5);
    }

    #[test]
    fn test_expect_status_reports_actual() {
        let res = ApiResponse::<()>::empty(StatusCode::CONFLICT).with_message("exists");
        let err = res
            .expect_status("create cluster", &[StatusCode::ACCEPTED])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedStatus);
        assert!(err.to_string().contains("exists"));
    }

    #[test]
    fn test_missing_body_is_unexpected() {
        let res = ApiResponse::<u32>::empty(StatusCode::OK);
        let err = res.expect_body("list regions", StatusCode::OK).unwrap_err();
        assert!(err.to_string().contains("response body is empty"));
    }
}
