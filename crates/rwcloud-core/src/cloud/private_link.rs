//! Private link await-flows and account-wide lookup

use reqwest::StatusCode;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::{CloudClient, Observation, fetch_cluster};
use crate::error::{CoreError, Observed, Result};
use crate::model::{
    AccountPrivateLink, CreatePrivateLinkRequest, PrivateLink, PrivateLinkInfo, PrivateLinkStatus,
};
use crate::wait::poll;

/// Page size used when scanning the account's private links
const PAGE_LIMIT: u64 = 10;

impl CloudClient {
    /// Find a private link anywhere in the account by its id
    ///
    /// Scans the account listing page by page, then reads the link from the
    /// region that owns it.
    pub async fn get_private_link(&self, link_id: Uuid) -> Result<PrivateLinkInfo> {
        let entry = self
            .find_account_private_link(link_id)
            .await?
            .ok_or_else(|| CoreError::PrivateLinkNotFound(link_id.to_string()))?;
        debug!(%link_id, region = %entry.region, cluster = entry.tenant_id, "private link located");

        let service = self.router.get(&entry.region)?;
        let cluster = fetch_cluster(service.as_ref(), entry.tenant_id).await?;
        let res = service.get_private_link(entry.tenant_id, link_id).await?;
        if res.is_not_found() {
            return Err(CoreError::PrivateLinkNotFound(link_id.to_string()));
        }
        Ok(PrivateLinkInfo {
            cluster_ns_id: cluster.ns_id,
            private_link: res.expect_body("get private link", StatusCode::OK)?,
        })
    }

    async fn find_account_private_link(&self, link_id: Uuid) -> Result<Option<AccountPrivateLink>> {
        let mut offset = 0;
        loop {
            let page = self
                .account()
                .list_private_links(offset, PAGE_LIMIT)
                .await?
                .expect_body("list private links", StatusCode::OK)?;
            if let Some(found) = page.private_links.into_iter().find(|l| l.id == link_id) {
                return Ok(Some(found));
            }
            if page.limit == 0 || page.limit.saturating_mul(page.offset + 1) >= page.size {
                return Ok(None);
            }
            offset = page.offset + 1;
        }
    }

    /// Create a private link on a cluster and wait until it is Created
    ///
    /// A newly created link may not be readable right away; "not found"
    /// while waiting is treated as not ready yet. On timeout the last
    /// observed link is attached to the error.
    pub async fn create_private_link_and_wait(
        &self,
        ns_id: Uuid,
        req: &CreatePrivateLinkRequest,
        cancel: &CancellationToken,
    ) -> Result<PrivateLink> {
        let operation = "create private link";
        if req.connection_name.is_empty() {
            return Err(CoreError::Validation("connection name is required".to_string()));
        }
        if req.target.is_empty() {
            return Err(CoreError::Validation("private link target is required".to_string()));
        }

        let (info, service) = self.locate(ns_id).await?;
        info!(%ns_id, connection = %req.connection_name, "creating private link");
        let accepted = service
            .create_private_link(info.id, req)
            .await?
            .expect_body(operation, StatusCode::ACCEPTED)?;
        let link_id = accepted.id;
        self.progress.started(operation, link_id);

        let observed = Observation::new();
        let result = {
            let service = service.as_ref();
            let observed = &observed;
            let progress = &self.progress;
            let cluster_id = info.id;
            let start = Instant::now();
            poll(&self.polling.private_link_creation, cancel, || async move {
                let res = service.get_private_link(cluster_id, link_id).await?;
                if res.is_not_found() {
                    debug!(%link_id, "private link not visible yet");
                    return Ok(false);
                }
                let link = res.expect_body("get private link", StatusCode::OK)?;
                progress.polling(operation, link.status, start.elapsed());
                observed.set(link.clone());
                match link.status {
                    PrivateLinkStatus::Created => Ok(true),
                    PrivateLinkStatus::Error => Err(CoreError::ResourceFailed(format!(
                        "private link {link_id} entered status {}",
                        link.status
                    ))),
                    _ => Ok(false),
                }
            })
            .await
            .map_err(|e| {
                e.with_wait_context(
                    format!("private link {link_id} to be created"),
                    observed.get().map(|l| Observed::PrivateLink(Box::new(l))),
                )
            })
            .and_then(|()| {
                observed
                    .get()
                    .ok_or_else(|| CoreError::PrivateLinkNotFound(link_id.to_string()))
            })
        };
        self.finish(operation, &link_id.to_string(), result)
    }

    /// Delete a private link and wait until it is gone
    ///
    /// A missing cluster or link counts as already deleted.
    pub async fn delete_private_link_and_wait(
        &self,
        ns_id: Uuid,
        link_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let operation = "delete private link";
        let (info, service) = match self.locate(ns_id).await {
            Ok(found) => found,
            Err(CoreError::ClusterNotFound(_)) => {
                info!(%ns_id, %link_id, "cluster absent, private link already gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        info!(%ns_id, %link_id, "deleting private link");
        let res = service.delete_private_link(info.id, link_id).await?;
        if res.is_not_found() {
            info!(%link_id, "private link already absent");
            return Ok(());
        }
        res.expect_status(operation, &[StatusCode::ACCEPTED])?;
        self.progress.started(operation, link_id);

        let observed = Observation::new();
        let result = {
            let service = service.as_ref();
            let observed = &observed;
            let progress = &self.progress;
            let cluster_id = info.id;
            let start = Instant::now();
            poll(&self.polling.private_link_deletion, cancel, || async move {
                let res = service.get_private_link(cluster_id, link_id).await?;
                if res.is_not_found() {
                    return Ok(true);
                }
                let link = res.expect_body("get private link", StatusCode::OK)?;
                progress.polling(operation, link.status, start.elapsed());
                observed.set(link);
                Ok(false)
            })
            .await
            .map_err(|e| {
                e.with_wait_context(
                    format!("private link {link_id} to be deleted"),
                    observed.get().map(|l| Observed::PrivateLink(Box::new(l))),
                )
            })
        };
        self.finish(operation, &link_id.to_string(), result)
    }
}
