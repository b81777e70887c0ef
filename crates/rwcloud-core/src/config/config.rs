//! Configuration loading for the cloud client
//!
//! Handles configuration loading from the config file and environment
//! variables. Values set in the file win; `RWC_API_KEY`, `RWC_API_SECRET`
//! and `RWC_ENDPOINT` fill in whatever the file leaves empty, and a
//! non-empty `RWC_MOCK` switches to the simulated backend.

#[cfg(target_os = "macos")]
use directories::BaseDirs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{ConfigError, Result};
use super::polling::PollingConfig;

/// Endpoint used when neither the file nor `RWC_ENDPOINT` provides one
pub const DEFAULT_ENDPOINT: &str = "https://canary-useast2-acc.risingwave.cloud/api/v1";

pub const ENV_API_KEY: &str = "RWC_API_KEY";
pub const ENV_API_SECRET: &str = "RWC_API_SECRET";
pub const ENV_ENDPOINT: &str = "RWC_ENDPOINT";
pub const ENV_MOCK: &str = "RWC_MOCK";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Account service endpoint; regional endpoints are discovered from it
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Use the in-memory simulated backend instead of the live API
    #[serde(default)]
    pub mock: bool,
    /// Regions served by the simulated backend
    #[serde(default = "default_mock_regions")]
    pub mock_regions: Vec<String>,
    #[serde(default)]
    pub polling: PollingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            mock: false,
            mock_regions: default_mock_regions(),
            polling: PollingConfig::default(),
        }
    }
}

fn default_mock_regions() -> Vec<String> {
    ["us-east-1", "us-west-2", "eu-west-1", "ap-southeast-1"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from the standard location, then apply the
    /// environment
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::load_from_path(&config_path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// A missing file is not an error and yields the default configuration.
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::LoadError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        Self::parse(&content)
    }

    /// Parse TOML content after expanding environment variables
    pub fn parse(content: &str) -> Result<Self> {
        let expanded_content = Self::expand_env_vars(content);
        let config: Config = toml::from_str(&expanded_content)?;
        Ok(config)
    }

    /// Fill empty fields from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Fill empty fields from `lookup`
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if self.api_key.is_empty()
            && let Some(v) = lookup(ENV_API_KEY)
        {
            self.api_key = v;
        }
        if self.api_secret.is_empty()
            && let Some(v) = lookup(ENV_API_SECRET)
        {
            self.api_secret = v;
        }
        if self.endpoint.is_empty()
            && let Some(v) = lookup(ENV_ENDPOINT)
        {
            self.endpoint = v;
        }
        if lookup(ENV_MOCK).is_some() {
            self.mock = true;
        }
    }

    /// The configured endpoint, or [`DEFAULT_ENDPOINT`]
    pub fn endpoint(&self) -> &str {
        if self.endpoint.is_empty() {
            DEFAULT_ENDPOINT
        } else {
            &self.endpoint
        }
    }

    /// Check that the live backend can be reached with this configuration
    ///
    /// Credentials are not needed for the simulated backend.
    pub fn validate(&self) -> Result<()> {
        if self.mock {
            return Ok(());
        }
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingCredential {
                field: "API key",
                env: ENV_API_KEY,
            });
        }
        if self.api_secret.is_empty() {
            return Err(ConfigError::MissingCredential {
                field: "API secret",
                env: ENV_API_SECRET,
            });
        }
        url::Url::parse(self.endpoint()).map_err(|e| ConfigError::InvalidValue {
            name: "endpoint".to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get the path to the configuration file
    ///
    /// On macOS, `~/.config/rwcloud/config.toml` is used when it (or its
    /// directory) exists, falling back to the platform location.
    ///
    /// On Linux: ~/.config/rwcloud/config.toml
    /// On Windows: %APPDATA%\risingwave\rwcloud\config.toml
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(base_dirs) = BaseDirs::new() {
                let linux_style_path = base_dirs
                    .home_dir()
                    .join(".config")
                    .join("rwcloud")
                    .join("config.toml");

                if linux_style_path
                    .parent()
                    .map(|p| p.exists())
                    .unwrap_or(false)
                {
                    return Ok(linux_style_path);
                }
            }
        }

        let proj_dirs = ProjectDirs::from("cloud", "risingwave", "rwcloud")
            .ok_or(ConfigError::ConfigDirError)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Expand environment variables in configuration content
    ///
    /// Supports ${VAR} and ${VAR:-default}. Unset variables without a
    /// default are left as-is.
    ///
    /// ```toml
    /// api_key = "${RWC_API_KEY}"
    /// endpoint = "${RWC_ENDPOINT:-https://canary-useast2-acc.risingwave.cloud/api/v1}"
    /// ```
    fn expand_env_vars(content: &str) -> String {
        let expanded =
            shellexpand::env_with_context_no_errors(content, |var| std::env::var(var).ok());
        expanded.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
endpoint = "http://localhost:8080/api/v1"
api_key = "key"
api_secret = "secret"

[polling.cluster_creation]
interval = 5
timeout = 600
"#,
        )
        .unwrap();

        assert_eq!(config.endpoint(), "http://localhost:8080/api/v1");
        assert_eq!(config.api_key, "key");
        assert!(!config.mock);
        assert_eq!(config.mock_regions.len(), 4);
        assert_eq!(config.polling.cluster_creation.timeout, Duration::from_secs(600));
        assert_eq!(
            config.polling.private_link_creation,
            PollingConfig::default().private_link_creation
        );
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(Config::default().endpoint(), DEFAULT_ENDPOINT);
    }

    #[test]
    #[serial_test::serial]
    fn test_env_var_expansion() {
        unsafe {
            std::env::set_var("RWC_TEST_KEY", "expanded-key");
        }

        let config = Config::parse(
            r#"
api_key = "${RWC_TEST_KEY}"
api_secret = "static-secret"
endpoint = "${RWC_TEST_MISSING:-https://example.invalid/api/v1}"
"#,
        )
        .unwrap();

        assert_eq!(config.api_key, "expanded-key");
        assert_eq!(config.api_secret, "static-secret");
        assert_eq!(config.endpoint, "https://example.invalid/api/v1");

        unsafe {
            std::env::remove_var("RWC_TEST_KEY");
        }
    }

    #[test]
    fn test_env_fills_only_empty_fields() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "env-key"),
            (ENV_API_SECRET, "env-secret"),
            (ENV_ENDPOINT, ""),
            (ENV_MOCK, "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config {
            api_key: "file-key".to_string(),
            ..Default::default()
        };
        config.apply_env_with(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.api_key, "file-key");
        assert_eq!(config.api_secret, "env-secret");
        assert_eq!(config.endpoint, "");
        assert!(config.mock);
    }

    #[test]
    fn test_validate_requires_credentials_unless_mock() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential { env: ENV_API_KEY, .. }
        ));

        let mock = Config {
            mock: true,
            ..Default::default()
        };
        assert!(mock.validate().is_ok());

        let bad_endpoint = Config {
            api_key: "k".into(),
            api_secret: "s".into(),
            endpoint: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            bad_endpoint.validate().unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }
}
