//! Cluster database users
//!
//! User calls take effect synchronously; nothing here polls.

use reqwest::StatusCode;
use tracing::info;
use uuid::Uuid;

use super::CloudClient;
use crate::error::{CoreError, Result};
use crate::model::{ClusterUser, CreateUserRequest, UpdateUserPasswordRequest};

impl CloudClient {
    pub async fn list_cluster_users(&self, ns_id: Uuid) -> Result<Vec<ClusterUser>> {
        let (info, service) = self.locate(ns_id).await?;
        let res = service.list_cluster_users(info.id).await?;
        if res.is_not_found() {
            return Err(CoreError::ClusterNotFound(ns_id.to_string()));
        }
        res.expect_body("list cluster users", StatusCode::OK)
    }

    pub async fn get_cluster_user(&self, ns_id: Uuid, username: &str) -> Result<ClusterUser> {
        self.list_cluster_users(ns_id)
            .await?
            .into_iter()
            .find(|u| u.username == username)
            .ok_or_else(|| CoreError::ClusterUserNotFound(format!("{ns_id}/{username}")))
    }

    pub async fn create_cluster_user(
        &self,
        ns_id: Uuid,
        username: &str,
        password: &str,
        createdb: bool,
        superuser: bool,
    ) -> Result<ClusterUser> {
        let (info, service) = self.locate(ns_id).await?;
        info!(%ns_id, username, createdb, superuser, "creating cluster user");
        let res = service
            .create_cluster_user(&CreateUserRequest {
                tenant_id: info.id,
                username: username.to_string(),
                password: password.to_string(),
                createdb,
                superuser,
            })
            .await?;
        if res.is_not_found() {
            return Err(CoreError::ClusterNotFound(ns_id.to_string()));
        }
        res.expect_body("create cluster user", StatusCode::OK)
    }

    /// Set a new password; the user must exist
    pub async fn update_cluster_user_password(
        &self,
        ns_id: Uuid,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let (info, service) = self.locate(ns_id).await?;
        info!(%ns_id, username, "updating cluster user password");
        let res = service
            .update_cluster_user_password(&UpdateUserPasswordRequest {
                tenant_id: info.id,
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;
        if res.is_not_found() {
            return Err(CoreError::ClusterUserNotFound(format!("{ns_id}/{username}")));
        }
        res.expect_status("update cluster user password", &[StatusCode::OK])?;
        Ok(())
    }

    /// Drop a user; a user that does not exist counts as deleted
    pub async fn delete_cluster_user(&self, ns_id: Uuid, username: &str) -> Result<()> {
        let (info, service) = self.locate(ns_id).await?;
        info!(%ns_id, username, "deleting cluster user");
        service
            .delete_cluster_user(info.id, username)
            .await?
            .expect_status(
                "delete cluster user",
                &[StatusCode::OK, StatusCode::NOT_FOUND],
            )?;
        Ok(())
    }
}
