// SPDX-License-Identifier: MIT

//! Configuration for the manager
//!
//! The working root holding the server directories is explicit configuration,
//! never the process working directory. Feed endpoints are overridable so
//! tests can point them at a local server.

use crate::error::{ManagerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_runtime() -> String {
    "java".to_string()
}

fn default_project() -> String {
    "paper".to_string()
}

fn default_release_feed_url() -> String {
    "https://fill.papermc.io/v3".to_string()
}

fn default_registry_url() -> String {
    "https://api.modrinth.com/v2".to_string()
}

fn default_plugin_host_url() -> String {
    "https://download.geysermc.org/v2".to_string()
}

fn default_tunnel_plugin_url() -> String {
    "https://github.com/playit-cloud/playit-minecraft-plugin/releases/latest/download/playit-minecraft-plugin.jar"
        .to_string()
}

fn default_user_agent() -> String {
    "quarry/0.1.0 (github.com/quarry-sh/quarry)".to_string()
}

fn default_stop_timeout() -> u64 {
    30
}

fn default_minimum_mb() -> u32 {
    1024
}

fn default_maximum_mb() -> u32 {
    2048
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Working root holding one directory per server
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Server runtime binary, resolved via PATH if not absolute
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Project id on the release feed
    #[serde(default = "default_project")]
    pub project: String,

    /// Release feed base URL
    #[serde(default = "default_release_feed_url")]
    pub release_feed_url: String,

    /// Secondary package registry base URL
    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    /// Download host for the protocol-bridge plugins
    #[serde(default = "default_plugin_host_url")]
    pub plugin_host_url: String,

    /// Direct download URL of the tunneling plugin
    #[serde(default = "default_tunnel_plugin_url")]
    pub tunnel_plugin_url: String,

    /// User agent sent on every feed and download request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// How long to wait for a graceful shutdown before killing (seconds)
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Initial minimum heap for created servers (MB)
    #[serde(default = "default_minimum_mb")]
    pub default_minimum_mb: u32,

    /// Initial maximum heap for created servers (MB)
    #[serde(default = "default_maximum_mb")]
    pub default_maximum_mb: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            runtime: default_runtime(),
            project: default_project(),
            release_feed_url: default_release_feed_url(),
            registry_url: default_registry_url(),
            plugin_host_url: default_plugin_host_url(),
            tunnel_plugin_url: default_tunnel_plugin_url(),
            user_agent: default_user_agent(),
            stop_timeout_secs: default_stop_timeout(),
            default_minimum_mb: default_minimum_mb(),
            default_maximum_mb: default_maximum_mb(),
        }
    }
}

impl ManagerConfig {
    /// Load the config file, creating it with defaults when absent
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| ManagerError::Config(format!("failed to parse config: {e}")))
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Atomic write
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }
}
