//! Service configuration.
//!
//! Loaded from a YAML file with environment variable interpolation.
//! Besides the server and metrics settings, the config carries
//! per-connector defaults (secret ids, destination tables, timezone)
//! that fill in request fields the caller leaves out; request fields
//! always win.

mod vars;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyBindAddressSnafu, EnvInterpolationSnafu, ReadFileSnafu, YamlParseSnafu,
};

/// Main configuration structure for the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Metrics configuration (optional, enabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Per-connector default parameters, keyed by platform name
    /// (`dv360`, `google_ads`, `tiktok`, `linkedin`).
    #[serde(default)]
    pub connectors: HashMap<String, HashMap<String, Value>>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind (default: "0.0.0.0:8080").
    #[serde(default = "default_bind_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let result = vars::interpolate(&content);
        if !result.is_ok() {
            let message = result.errors.join("\n");
            return EnvInterpolationSnafu { message }.fail();
        }

        let config: Config = serde_yaml::from_str(&result.text).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.server.address.is_empty(), EmptyBindAddressSnafu);
        Ok(())
    }

    /// Default value for a connector parameter, rendered as a string.
    pub fn connector_default(&self, platform: &str, key: &str) -> Option<String> {
        let value = self.connectors.get(platform)?.get(key)?;
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}
