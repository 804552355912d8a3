use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Evaluation tick interval in seconds.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Per-object action cooldown window in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Directory of JSON policy documents applied at startup.
    #[serde(default = "default_policy_dir")]
    pub policy_dir: String,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Base URL of the storage cluster management API.
    #[serde(default = "default_cluster_api_url")]
    pub api_url: String,
    #[serde(default = "default_cluster_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_url: default_cluster_api_url(),
            connect_timeout_secs: default_cluster_connect_timeout_secs(),
        }
    }
}

/// One configured metrics provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// Registered provider type (e.g. `"prometheus"`).
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_tick_secs() -> u64 {
    30
}

fn default_cooldown_secs() -> u64 {
    240
}

fn default_policy_dir() -> String {
    "policies".to_string()
}

fn default_cluster_api_url() -> String {
    "http://localhost:9001".to_string()
}

fn default_cluster_connect_timeout_secs() -> u64 {
    10
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
