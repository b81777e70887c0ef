//! Polling policies for the await-flows
//!
//! Each flow waits under its own interval and timeout. Values are given in
//! seconds in the `[polling]` table:
//!
//! ```toml
//! [polling.cluster_creation]
//! interval = 3
//! timeout = 900
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wait::PollingParams;

/// Interval and timeout per await-flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_cluster_creation")]
    pub cluster_creation: PollingParams,

    #[serde(default = "default_cluster_deletion")]
    pub cluster_deletion: PollingParams,

    /// Version, config and resource-shape updates
    #[serde(default = "default_cluster_update")]
    pub cluster_update: PollingParams,

    #[serde(default = "default_private_link_creation")]
    pub private_link_creation: PollingParams,

    #[serde(default = "default_private_link_deletion")]
    pub private_link_deletion: PollingParams,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            cluster_creation: default_cluster_creation(),
            cluster_deletion: default_cluster_deletion(),
            cluster_update: default_cluster_update(),
            private_link_creation: default_private_link_creation(),
            private_link_deletion: default_private_link_deletion(),
        }
    }
}

impl PollingConfig {
    /// Same params for every flow, mostly useful in tests
    pub fn uniform(params: PollingParams) -> Self {
        Self {
            cluster_creation: params,
            cluster_deletion: params,
            cluster_update: params,
            private_link_creation: params,
            private_link_deletion: params,
        }
    }
}

const CLUSTER_TIMEOUT: Duration = Duration::from_secs(15 * 60);
const PRIVATE_LINK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const INTERVAL: Duration = Duration::from_secs(3);

// Default value functions for serde
fn default_cluster_creation() -> PollingParams {
    PollingParams::new(INTERVAL, CLUSTER_TIMEOUT)
}

fn default_cluster_deletion() -> PollingParams {
    PollingParams::new(INTERVAL, CLUSTER_TIMEOUT)
}

fn default_cluster_update() -> PollingParams {
    default_cluster_creation()
}

fn default_private_link_creation() -> PollingParams {
    PollingParams::new(INTERVAL, PRIVATE_LINK_TIMEOUT)
}

fn default_private_link_deletion() -> PollingParams {
    PollingParams::new(INTERVAL, PRIVATE_LINK_TIMEOUT)
}
