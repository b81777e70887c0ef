//! Region name to regional service routing
//!
//! The routing table is built once from the account's region directory and
//! is read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info};

use crate::api::{AccountService, RegionConnector, RegionService};
use crate::error::{CoreError, Result};

#[derive(Clone, Default)]
pub struct RegionRouter {
    services: HashMap<String, Arc<dyn RegionService>>,
}

impl RegionRouter {
    /// List the account's regions and connect to each of them
    ///
    /// Fails if the directory cannot be listed or is empty.
    pub async fn discover(
        account: &dyn AccountService,
        connector: &dyn RegionConnector,
    ) -> Result<Self> {
        let regions = account
            .list_regions()
            .await?
            .expect_body("list regions", StatusCode::OK)?;
        if regions.is_empty() {
            return Err(CoreError::Validation(
                "the account has no available regions".to_string(),
            ));
        }

        let mut services = HashMap::with_capacity(regions.len());
        for region in &regions {
            debug!(region = %region.region_name, url = %region.url, "connecting region");
            services.insert(region.region_name.clone(), connector.connect(region)?);
        }
        info!(regions = services.len(), "region routing table built");
        Ok(Self { services })
    }

    /// Build a router from already connected services
    pub fn from_services<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn RegionService>)>,
        S: Into<String>,
    {
        Self {
            services: services.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Regional service for `region`
    pub fn get(&self, region: &str) -> Result<Arc<dyn RegionService>> {
        self.services
            .get(region)
            .cloned()
            .ok_or_else(|| CoreError::RegionNotFound(region.to_string()))
    }

    /// Known region names, sorted
    pub fn regions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for RegionRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionRouter")
            .field("regions", &self.regions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::simulated::SimulatedBackend;

    #[tokio::test]
    async fn test_discover_from_directory() {
        let backend = SimulatedBackend::new(["us-east-1", "eu-west-1"]);
        let router = RegionRouter::discover(&backend, &backend).await.unwrap();

        assert_eq!(router.regions(), vec!["eu-west-1", "us-east-1"]);
        assert!(router.get("us-east-1").is_ok());
    }

    #[tokio::test]
    async fn test_unknown_region() {
        let backend = SimulatedBackend::new(["us-east-1"]);
        let router = RegionRouter::discover(&backend, &backend).await.unwrap();

        let err = router.get("ap-south-1").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::RegionNotFound);
        assert_eq!(err.to_string(), "region ap-south-1 is not found");
    }

    #[tokio::test]
    async fn test_empty_directory_is_an_error() {
        let backend = SimulatedBackend::new(Vec::<String>::new());
        let err = RegionRouter::discover(&backend, &backend).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
