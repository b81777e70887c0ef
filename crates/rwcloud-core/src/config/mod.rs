//! Configuration for rwcloud-core
//!
// The loader lives in `config::config`, matching the type it loads.

#![allow(clippy::module_inception)]
//!
//! Credentials, endpoint and polling policies come from a TOML file at the
//! platform config location, with `${VAR}` expansion and `RWC_*` environment
//! overrides applied on top.

pub mod config;
pub mod error;
pub mod polling;

pub use config::{Config, DEFAULT_ENDPOINT};
pub use error::{ConfigError, Result};
pub use polling::PollingConfig;
