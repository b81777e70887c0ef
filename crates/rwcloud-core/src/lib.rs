//! # rwcloud-core
//!
//! Await-style orchestration for the RisingWave Cloud control plane.
//!
//! The control plane accepts mutations asynchronously: a create, delete or
//! update call returns 202 and the resource converges later. This crate turns
//! each of those into a single call that issues the mutation and waits, with
//! a bounded and cancellable poll, until the resource reaches its terminal
//! state.
//!
//! ## Layout
//!
//! - [`api`]: service traits for the account and regional endpoints, plus the
//!   HTTP implementation
//! - [`simulated`]: in-memory implementation of the same traits, with
//!   configurable convergence delays
//! - [`cloud`]: [`CloudClient`] and the cluster, user and private-link flows
//! - [`reconcile`]: diffing a declared cluster against the observed one
//! - [`wait`]: the polling loop every flow is built on
//! - [`config`]: credentials, endpoint and polling policies
//!
//! ## Example
//!
//! ```rust,no_run
//! use rwcloud_core::{CloudClient, PollingConfig, SimulatedBackend};
//! use rwcloud_core::model::CreateClusterRequest;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(req: CreateClusterRequest) -> rwcloud_core::Result<()> {
//! let backend = SimulatedBackend::new(["us-east-1"]);
//! let client = CloudClient::simulated(backend, PollingConfig::default()).await?;
//!
//! let cluster = client
//!     .create_cluster_and_wait("us-east-1", &req, &CancellationToken::new())
//!     .await?;
//! println!("{} is {}", cluster.name, cluster.status);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cloud;
pub mod component;
pub mod config;
pub mod error;
pub mod model;
pub mod progress;
pub mod reconcile;
pub mod region;
pub mod simulated;
pub mod wait;

pub use cloud::{CloudClient, encoded_cluster_id};
pub use component::{ComponentSpec, resolve_component_type};
pub use config::{Config, ConfigError, PollingConfig};
pub use error::{CoreError, ErrorKind, ImmutableField, ImmutableFieldError, Observed, Result};
pub use progress::{Progress, ProgressCallback, ProgressEvent};
pub use reconcile::{MutationIntent, UpdateOutcome, check_immutable, plan_update};
pub use region::RegionRouter;
pub use simulated::{RecordedCall, SimulatedBackend, SimulationOptions};
pub use wait::{PollingParams, poll};
