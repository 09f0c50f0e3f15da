//! Configuration management for por-link.
//!
//! Handles loading configuration from TOML files and environment variables,
//! with support for named chain nodes and connection timeouts.

use crate::error::{PorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

/// Node endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "wss://polkadev.publicvm.com:9443";

/// Environment variable consulted for the node endpoint.
pub const ENDPOINT_ENV_VAR: &str = "POR_NODE_URL";

/// Main configuration structure for por-link.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Connection timeouts.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Named chain nodes.
    #[serde(default)]
    pub nodes: HashMap<String, NodeConfig>,
}

/// Connection timeout configuration (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Maximum time to establish the transport connection.
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,

    /// Maximum time to wait for the node readiness signal.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    /// Maximum time for a single RPC request on an open connection.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_open_timeout_secs() -> u64 {
    10
}

fn default_ready_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            open_timeout_secs: default_open_timeout_secs(),
            ready_timeout_secs: default_ready_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// A named chain node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// WebSocket URL of the node (e.g., `wss://node.example:9443`).
    pub url: String,

    /// Free-form description shown in status output.
    #[serde(default)]
    pub description: Option<String>,
}

/// Runtime settings for a connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Endpoint used when `connect` is called without one.
    pub default_endpoint: String,
    /// Bound on transport open.
    pub open_timeout: Duration,
    /// Bound on the readiness wait.
    pub ready_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl ConnectionSettings {
    /// Creates settings for the given default endpoint with default timeouts.
    pub fn new(default_endpoint: impl Into<String>) -> Self {
        Self {
            default_endpoint: default_endpoint.into(),
            open_timeout: Duration::from_secs(default_open_timeout_secs()),
            ready_timeout: Duration::from_secs(default_ready_timeout_secs()),
        }
    }

    /// Sets the transport open timeout.
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Sets the readiness timeout.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }
}

/// A validated node endpoint.
///
/// Only `ws` and `wss` URLs with a host are accepted. The original string is
/// kept so it round-trips unchanged in logs and status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    raw: String,
    url: Url,
}

impl Endpoint {
    /// Parses and validates an endpoint string.
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim();
        let url = Url::parse(raw)
            .map_err(|e| PorError::config(format!("Invalid endpoint '{raw}': {e}")))?;

        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(PorError::config(format!(
                "Invalid scheme '{}'. Expected 'ws' or 'wss'",
                url.scheme()
            )));
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(PorError::config(format!(
                "Endpoint '{raw}' has no host"
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            url,
        })
    }

    /// Returns the endpoint as given by the caller.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns true for `wss` endpoints.
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }

    /// Returns a display-safe string (no credentials) for UI purposes.
    pub fn display_string(&self) -> String {
        let host = self.url.host_str().unwrap_or("unknown");
        match self.url.port_or_known_default() {
            Some(port) => format!("{}://{host}:{port}", self.url.scheme()),
            None => format!("{}://{host}", self.url.scheme()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("por-link")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the default configuration.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| PorError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            PorError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named node, or the default node if name is None.
    pub fn get_node(&self, name: Option<&str>) -> Option<&NodeConfig> {
        let key = name.unwrap_or("default");
        self.nodes.get(key)
    }

    /// Resolves the endpoint to connect to.
    ///
    /// Precedence:
    /// 1. Endpoint given on the command line
    /// 2. Named node from the config file
    /// 3. `default` node from the config file
    /// 4. `POR_NODE_URL` environment variable
    /// 5. Built-in default endpoint
    pub fn resolve_endpoint(&self, cli_endpoint: Option<&str>, node: Option<&str>) -> Result<String> {
        self.resolve_endpoint_with_env(cli_endpoint, node, std::env::var(ENDPOINT_ENV_VAR).ok())
    }

    fn resolve_endpoint_with_env(
        &self,
        cli_endpoint: Option<&str>,
        node: Option<&str>,
        env_endpoint: Option<String>,
    ) -> Result<String> {
        if let Some(endpoint) = cli_endpoint {
            return Ok(endpoint.to_string());
        }

        if let Some(name) = node {
            return self
                .get_node(Some(name))
                .map(|n| n.url.clone())
                .ok_or_else(|| {
                    PorError::config(format!("Node '{name}' not found in config file"))
                });
        }

        if let Some(default) = self.get_node(None) {
            return Ok(default.url.clone());
        }

        Ok(env_endpoint
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()))
    }

    /// Builds manager settings for the given default endpoint.
    pub fn connection_settings(&self, default_endpoint: impl Into<String>) -> ConnectionSettings {
        ConnectionSettings::new(default_endpoint)
            .with_open_timeout(Duration::from_secs(self.connection.open_timeout_secs))
            .with_ready_timeout(Duration::from_secs(self.connection.ready_timeout_secs))
    }

    /// Returns the per-request timeout for transports.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.request_timeout_secs)
    }
}
