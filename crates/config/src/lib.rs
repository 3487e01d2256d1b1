//! Configuration schema and loader for okv nodes.
//!
//! A node needs exactly three things: a listen address, a data directory
//! and the full peer list (including itself). Configuration comes from a
//! YAML file, with environment variables overriding individual fields:
//! `OKV_LISTEN`, `OKV_DATA_DIR`, `OKV_PEERS` (comma-separated),
//! `OKV_ADVERTISE`, `OKV_METRICS_PORT`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default config file consulted when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's listen address.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Directory for the storage engine.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// All cluster endpoints, including this node. Empty means a
    /// single-node cluster of just this node.
    #[serde(default)]
    pub peers: Vec<String>,

    /// This node's endpoint as it appears in `peers`. Derived from
    /// `listen` when absent.
    #[serde(default)]
    pub advertise: Option<String>,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            data_dir: default_data_dir(),
            peers: Vec::new(),
            advertise: None,
            metrics_port: None,
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// The endpoint this node is known by in the cluster.
    pub fn advertise_endpoint(&self) -> String {
        self.advertise
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen))
    }

    /// The full peer list; a missing `peers` section means a cluster of one.
    pub fn peer_endpoints(&self) -> Vec<String> {
        if self.peers.is_empty() {
            vec![self.advertise_endpoint()]
        } else {
            self.peers.clone()
        }
    }

    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let advertise = self.advertise_endpoint();
        if !self.peers.is_empty() && !self.peers.contains(&advertise) {
            return Err(ConfigError::Invalid(format!(
                "advertise endpoint {advertise:?} is not in peers"
            )));
        }
        Ok(())
    }

    /// Apply `OKV_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(listen) = std::env::var("OKV_LISTEN") {
            self.listen = listen
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("bad OKV_LISTEN: {listen:?}")))?;
        }
        if let Ok(data_dir) = std::env::var("OKV_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(peers) = std::env::var("OKV_PEERS") {
            self.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(advertise) = std::env::var("OKV_ADVERTISE") {
            self.advertise = Some(advertise);
        }
        if let Ok(port) = std::env::var("OKV_METRICS_PORT") {
            self.metrics_port = Some(port.parse().map_err(|_| {
                ConfigError::Invalid(format!("bad OKV_METRICS_PORT: {port:?}"))
            })?);
        }
        Ok(())
    }
}

/// Load a node's configuration.
///
/// With an explicit `path` the file must exist. Without one, the default
/// `config.yaml` is used when present, otherwise built-in defaults.
/// Environment overrides are applied either way, then validation runs.
pub fn load(path: Option<&Path>) -> Result<NodeConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                parse_file(default)?
            } else {
                NodeConfig::default()
            }
        }
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<NodeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Load a `NodeConfig` from a YAML string (no environment overrides).
pub fn load_from_str(yaml: &str) -> Result<NodeConfig, ConfigError> {
    let config: NodeConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
