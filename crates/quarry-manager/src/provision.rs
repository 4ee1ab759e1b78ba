// SPDX-License-Identifier: MIT

//! Plugin provisioning
//!
//! Installs the auxiliary plugins this tool manages: the tunneling client
//! and the protocol-bridge set. Only plugins placed here are ever touched;
//! manually installed plugins are out of bounds.

use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result};
use crate::fetch::Fetcher;
use crate::metadata::MetadataStore;
use crate::release::ReleaseResolver;
use std::fs;
use std::path::PathBuf;

pub const PLUGINS_DIR: &str = "plugins";

/// Registry id of the protocol-translation plugin in the bridge set
const BRIDGE_REGISTRY_PLUGIN: &str = "viaversion";

#[derive(Debug)]
pub struct PluginProvisioner {
    config: ManagerConfig,
    fetcher: Fetcher,
    resolver: ReleaseResolver,
    store: MetadataStore,
}

impl PluginProvisioner {
    pub fn new(config: &ManagerConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            fetcher: Fetcher::new(&config.user_agent)?,
            resolver: ReleaseResolver::new(config)?,
            store: MetadataStore::new(&config.root),
        })
    }

    /// Download `url` and atomically place it under the server's plugin
    /// directory as `<plugin>.jar`.
    pub async fn install_plugin(
        &self,
        instance: &str,
        plugin: &str,
        url: &str,
    ) -> Result<PathBuf> {
        let plugins_dir = self.config.root.join(instance).join(PLUGINS_DIR);
        fs::create_dir_all(&plugins_dir)?;

        let final_path = plugins_dir.join(format!("{plugin}.jar"));
        let temp_path = plugins_dir.join(format!("{plugin}.jar.part"));

        self.fetcher.download(url, &temp_path).await?;
        Fetcher::install_atomically(&temp_path, &final_path)?;

        tracing::info!("installed plugin {plugin} for {instance}");
        Ok(final_path)
    }

    /// Install the tunneling plugin (no metadata change; used on update)
    pub async fn install_tunnel(&self, instance: &str) -> Result<()> {
        self.install_plugin(instance, "playit", &self.config.tunnel_plugin_url)
            .await?;
        Ok(())
    }

    /// Flip the tunnel feature on and install its plugin
    pub async fn enable_tunnel(&self, instance: &str) -> Result<()> {
        let mut record = self.store.load(instance)?;
        record.playit = true;
        self.store.save(instance, &record)?;

        self.install_tunnel(instance).await
    }

    /// Install the three bridge plugins as a unit. A failing member does not
    /// stop the others; any failure surfaces as an aggregate error naming
    /// what was installed and what was not.
    pub async fn install_bridge(&self, instance: &str) -> Result<()> {
        let geyser_url = format!(
            "{}/projects/geyser/versions/latest/builds/latest/downloads/spigot",
            self.config.plugin_host_url.trim_end_matches('/')
        );
        let floodgate_url = format!(
            "{}/projects/floodgate/versions/latest/builds/latest/downloads/spigot",
            self.config.plugin_host_url.trim_end_matches('/')
        );

        let mut installed = Vec::new();
        let mut failed = Vec::new();

        for (plugin, url) in [("geyser", geyser_url), ("floodgate", floodgate_url)] {
            match self.install_plugin(instance, plugin, &url).await {
                Ok(_) => installed.push(plugin.to_string()),
                Err(e) => {
                    tracing::error!("bridge plugin {plugin} failed for {instance}: {e}");
                    failed.push(format!("{plugin}: {e}"));
                }
            }
        }

        match self.resolver.resolve_latest_asset(BRIDGE_REGISTRY_PLUGIN).await {
            Ok(url) => match self
                .install_plugin(instance, BRIDGE_REGISTRY_PLUGIN, &url)
                .await
            {
                Ok(_) => installed.push(BRIDGE_REGISTRY_PLUGIN.to_string()),
                Err(e) => {
                    tracing::error!(
                        "bridge plugin {BRIDGE_REGISTRY_PLUGIN} failed for {instance}: {e}"
                    );
                    failed.push(format!("{BRIDGE_REGISTRY_PLUGIN}: {e}"));
                }
            },
            Err(e) => {
                tracing::error!(
                    "resolving {BRIDGE_REGISTRY_PLUGIN} failed for {instance}: {e}"
                );
                failed.push(format!("{BRIDGE_REGISTRY_PLUGIN}: {e}"));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ManagerError::PartialProvision { installed, failed })
        }
    }

    /// Flip the bridge feature on and install its plugin set
    pub async fn enable_bridge(&self, instance: &str) -> Result<()> {
        let mut record = self.store.load(instance)?;
        record.bedrock = true;
        self.store.save(instance, &record)?;

        self.install_bridge(instance).await
    }
}
