//! Live control-plane backend over HTTP
//!
//! Every request carries `X-API-KEY: <key>:<secret>`. Responses are never
//! interpreted here beyond decoding: a 2xx answer is decoded into the typed
//! body, anything else keeps the raw text as the message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::{AccountService, ApiResponse, RegionConnector, RegionService};
use crate::error::{CoreError, Result};
use crate::model::{
    Cluster, ClusterInfo, ClusterUser, CreateClusterRequest, CreatePrivateLinkRequest,
    CreateUserRequest, PrivateLink, PrivateLinkPage, RegionInfo, Tier, TierList,
    UpdateResourcesRequest, UpdateUserPasswordRequest, UserList,
};

const API_KEY_HEADER: &str = "X-API-KEY";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared request plumbing for one base URL
#[derive(Debug, Clone)]
struct Endpoint {
    client: Client,
    base_url: String,
}

impl Endpoint {
    fn new(client: Client, base_url: &str) -> Result<Self> {
        Url::parse(base_url).map_err(|e| {
            CoreError::Validation(format!("invalid endpoint {base_url}: {e}"))
        })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| CoreError::Validation(format!("invalid request path {path}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn request(&self, method: Method, path: &str, query: &[(&str, &str)]) -> Result<RequestBuilder> {
        Ok(self.client.request(method, self.url(path, query)?))
    }

    async fn dispatch(&self, operation: &str, req: RequestBuilder) -> Result<Response> {
        let res = req.send().await.map_err(|source| CoreError::Transport {
            operation: operation.to_string(),
            source,
        })?;
        debug!(operation, status = %res.status(), "control plane responded");
        Ok(res)
    }

    /// Send and decode a 2xx body into `T`
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        req: RequestBuilder,
    ) -> Result<ApiResponse<T>> {
        let res = self.dispatch(operation, req).await?;
        let status = res.status();
        if status.is_success() {
            let body = res.json::<T>().await.map_err(|source| CoreError::Transport {
                operation: operation.to_string(),
                source,
            })?;
            Ok(ApiResponse::new(status, body))
        } else {
            Ok(ApiResponse::empty(status).with_message(res.text().await.unwrap_or_default()))
        }
    }

    /// Send and discard any body
    async fn send_empty(&self, operation: &str, req: RequestBuilder) -> Result<ApiResponse<()>> {
        let res = self.dispatch(operation, req).await?;
        let status = res.status();
        let message = if status.is_success() {
            String::new()
        } else {
            res.text().await.unwrap_or_default()
        };
        Ok(ApiResponse::empty(status).with_message(message))
    }
}

fn build_client(api_key: &str, api_secret: &str) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let mut value = HeaderValue::from_str(&format!("{api_key}:{api_secret}"))
        .map_err(|_| CoreError::Validation("API key contains invalid characters".to_string()))?;
    value.set_sensitive(true);
    headers.insert(API_KEY_HEADER, value);

    Client::builder()
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|source| CoreError::Transport {
            operation: "build HTTP client".to_string(),
            source,
        })
}

/// Account service client for the global endpoint
#[derive(Debug, Clone)]
pub struct HttpAccountClient {
    endpoint: Endpoint,
}

impl HttpAccountClient {
    pub fn new(base_url: &str, api_key: &str, api_secret: &str) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(build_client(api_key, api_secret)?, base_url)?,
        })
    }

    /// Connector producing regional clients that share this client's
    /// connection pool and credentials
    pub fn connector(&self) -> HttpConnector {
        HttpConnector {
            client: self.endpoint.client.clone(),
        }
    }
}

#[async_trait]
impl AccountService for HttpAccountClient {
    async fn ping(&self) -> Result<ApiResponse<()>> {
        let req = self.endpoint.request(Method::GET, "/auth/ping", &[])?;
        self.endpoint.send_empty("ping", req).await
    }

    async fn list_regions(&self) -> Result<ApiResponse<Vec<RegionInfo>>> {
        let req = self.endpoint.request(Method::GET, "/regions", &[])?;
        self.endpoint.send("list regions", req).await
    }

    async fn get_cluster_info(&self, ns_id: Uuid) -> Result<ApiResponse<ClusterInfo>> {
        let req = self
            .endpoint
            .request(Method::GET, &format!("/tenant/{ns_id}"), &[])?;
        self.endpoint.send("get cluster info", req).await
    }

    async fn list_private_links(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<ApiResponse<PrivateLinkPage>> {
        let (offset, limit) = (offset.to_string(), limit.to_string());
        let req = self.endpoint.request(
            Method::GET,
            "/privatelinks",
            &[("offset", offset.as_str()), ("limit", limit.as_str())],
        )?;
        self.endpoint.send("list private links", req).await
    }
}

/// Builds [`HttpRegionClient`]s from region directory entries
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl RegionConnector for HttpConnector {
    fn connect(&self, region: &RegionInfo) -> Result<Arc<dyn RegionService>> {
        Ok(Arc::new(HttpRegionClient {
            region: region.region_name.clone(),
            endpoint: Endpoint::new(self.client.clone(), &region.url)?,
        }))
    }
}

/// Regional service client
#[derive(Debug, Clone)]
pub struct HttpRegionClient {
    region: String,
    endpoint: Endpoint,
}

impl HttpRegionClient {
    pub fn new(region: &str, base_url: &str, api_key: &str, api_secret: &str) -> Result<Self> {
        Ok(Self {
            region: region.to_string(),
            endpoint: Endpoint::new(build_client(api_key, api_secret)?, base_url)?,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl RegionService for HttpRegionClient {
    async fn get_cluster_by_id(&self, id: u64) -> Result<ApiResponse<Cluster>> {
        let id = id.to_string();
        let req = self
            .endpoint
            .request(Method::GET, "/tenant", &[("tenantId", id.as_str())])?;
        self.endpoint.send("get cluster", req).await
    }

    async fn get_cluster_by_name(&self, name: &str) -> Result<ApiResponse<Cluster>> {
        let req = self
            .endpoint
            .request(Method::GET, "/tenant", &[("tenantName", name)])?;
        self.endpoint.send("get cluster by name", req).await
    }

    async fn create_cluster(&self, req: &CreateClusterRequest) -> Result<ApiResponse<Cluster>> {
        let builder = self.endpoint.request(Method::POST, "/tenants", &[])?.json(req);
        self.endpoint.send("create cluster", builder).await
    }

    async fn delete_cluster(&self, id: u64) -> Result<ApiResponse<()>> {
        let id = id.to_string();
        let req = self
            .endpoint
            .request(Method::DELETE, "/tenant", &[("tenantId", id.as_str())])?;
        self.endpoint.send_empty("delete cluster", req).await
    }

    async fn update_cluster_version(&self, id: u64, version: &str) -> Result<ApiResponse<()>> {
        let req = self
            .endpoint
            .request(Method::POST, &format!("/tenant/{id}/update-version"), &[])?
            .json(&json!({ "version": version }));
        self.endpoint.send_empty("update cluster version", req).await
    }

    async fn update_engine_config(&self, id: u64, config: &str) -> Result<ApiResponse<()>> {
        let req = self
            .endpoint
            .request(Method::PUT, &format!("/tenant/{id}/config/risingwave"), &[])?
            .header(CONTENT_TYPE, "text/plain")
            .body(config.to_string());
        self.endpoint.send_empty("update engine config", req).await
    }

    async fn update_metastore_config(&self, id: u64, config: &str) -> Result<ApiResponse<()>> {
        let req = self
            .endpoint
            .request(Method::PUT, &format!("/tenant/{id}/config/etcd"), &[])?
            .header(CONTENT_TYPE, "text/plain")
            .body(config.to_string());
        self.endpoint.send_empty("update meta store config", req).await
    }

    async fn update_cluster_resources(
        &self,
        id: u64,
        req: &UpdateResourcesRequest,
    ) -> Result<ApiResponse<()>> {
        let builder = self
            .endpoint
            .request(Method::POST, &format!("/tenant/{id}/resource"), &[])?
            .json(req);
        self.endpoint.send_empty("update cluster resources", builder).await
    }

    async fn get_tiers(&self) -> Result<ApiResponse<Vec<Tier>>> {
        let req = self.endpoint.request(Method::GET, "/tiers", &[])?;
        let res: ApiResponse<TierList> = self.endpoint.send("get tiers", req).await?;
        Ok(ApiResponse {
            status: res.status,
            body: res.body.map(|list| list.tiers),
            message: res.message,
        })
    }

    async fn list_cluster_users(&self, id: u64) -> Result<ApiResponse<Vec<ClusterUser>>> {
        let id = id.to_string();
        let req = self
            .endpoint
            .request(Method::GET, "/tenant/dbusers", &[("tenantId", id.as_str())])?;
        let res: ApiResponse<UserList> = self.endpoint.send("list cluster users", req).await?;
        Ok(ApiResponse {
            status: res.status,
            body: res.body.map(|list| list.dbusers.unwrap_or_default()),
            message: res.message,
        })
    }

    async fn create_cluster_user(
        &self,
        req: &CreateUserRequest,
    ) -> Result<ApiResponse<ClusterUser>> {
        let builder = self
            .endpoint
            .request(Method::POST, "/tenant/dbusers", &[])?
            .json(req);
        self.endpoint.send("create cluster user", builder).await
    }

    async fn update_cluster_user_password(
        &self,
        req: &UpdateUserPasswordRequest,
    ) -> Result<ApiResponse<()>> {
        let builder = self
            .endpoint
            .request(Method::PUT, "/tenant/dbusers", &[])?
            .json(req);
        self.endpoint
            .send_empty("update cluster user password", builder)
            .await
    }

    async fn delete_cluster_user(&self, id: u64, username: &str) -> Result<ApiResponse<()>> {
        let id = id.to_string();
        let req = self.endpoint.request(
            Method::DELETE,
            "/tenant/dbusers",
            &[("tenantId", id.as_str()), ("username", username)],
        )?;
        self.endpoint.send_empty("delete cluster user", req).await
    }

    async fn get_private_link(&self, id: u64, link_id: Uuid) -> Result<ApiResponse<PrivateLink>> {
        let req = self.endpoint.request(
            Method::GET,
            &format!("/tenant/{id}/privatelink/{link_id}"),
            &[],
        )?;
        self.endpoint.send("get private link", req).await
    }

    async fn create_private_link(
        &self,
        id: u64,
        req: &CreatePrivateLinkRequest,
    ) -> Result<ApiResponse<PrivateLink>> {
        let builder = self
            .endpoint
            .request(Method::POST, &format!("/tenant/{id}/privatelinks"), &[])?
            .json(req);
        self.endpoint.send("create private link", builder).await
    }

    async fn delete_private_link(&self, id: u64, link_id: Uuid) -> Result<ApiResponse<()>> {
        let req = self.endpoint.request(
            Method::DELETE,
            &format!("/tenant/{id}/privatelink/{link_id}"),
            &[],
        )?;
        self.endpoint.send_empty("delete private link", req).await
    }
}
