// SPDX-License-Identifier: MIT

//! Update orchestration
//!
//! The full update workflow: stop, resolve, compare, back up everything,
//! download, install atomically, re-provision managed plugins, and persist
//! the new version last, so the stored version only ever trails a finished
//! install. A failure before the install leaves binary and metadata
//! untouched; a plugin failure after the install is surfaced but never rolls
//! the binary back.

use crate::backup;
use crate::config::ManagerConfig;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::metadata::{MetadataRecord, MetadataStore};
use crate::provision::PluginProvisioner;
use crate::release::ReleaseResolver;
use crate::supervisor::ProcessSupervisor;
use std::fs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Resolved version equals the stored one; nothing was touched
    UpToDate { version: String },
    /// Binary installed and version persisted. Plugin steps that failed
    /// after the install are carried as warnings, not as failure.
    Updated {
        from: String,
        to: String,
        warnings: Vec<String>,
    },
}

pub struct UpdatePipeline<'a> {
    config: ManagerConfig,
    supervisor: &'a ProcessSupervisor,
    resolver: ReleaseResolver,
    fetcher: Fetcher,
    store: MetadataStore,
    provisioner: PluginProvisioner,
}

impl std::fmt::Debug for UpdatePipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatePipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> UpdatePipeline<'a> {
    pub fn new(config: &ManagerConfig, supervisor: &'a ProcessSupervisor) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            supervisor,
            resolver: ReleaseResolver::new(config)?,
            fetcher: Fetcher::new(&config.user_agent)?,
            store: MetadataStore::new(&config.root),
            provisioner: PluginProvisioner::new(config)?,
        })
    }

    /// Update one server to the latest stable build of the configured project
    pub async fn update(&self, instance: &str) -> Result<UpdateOutcome> {
        // Idempotent if the server is already stopped
        self.supervisor.stop(instance)?;

        let latest = self.resolver.resolve_channel(&self.config.project).await?;
        let record = self.store.load(instance)?;

        if record.version == latest {
            tracing::info!("server {instance} already on version {latest}");
            return Ok(UpdateOutcome::UpToDate { version: latest });
        }

        tracing::info!(
            "updating {instance} from {} to {latest}",
            record.version
        );
        tracing::warn!(
            "manually installed plugins are not covered by updates; update those yourself"
        );

        let artifact = self
            .resolver
            .resolve_stable_build(&self.config.project, &latest)
            .await?;

        let backup_dir = backup::backup_all(&self.config.root)?;
        tracing::info!("server directories backed up to {}", backup_dir.display());

        let dir = self.config.root.join(instance);
        let jar = dir.join(format!("{instance}.jar"));
        let temp = dir.join(format!("{instance}.jar.part"));

        self.fetcher.download(&artifact.download_url, &temp).await?;
        Fetcher::install_atomically(&temp, &jar)?;
        tracing::info!("installed {} over {}", artifact.version, jar.display());

        let mut warnings = Vec::new();

        if record.playit {
            if let Err(e) = self.provisioner.install_tunnel(instance).await {
                tracing::error!("tunnel plugin reinstall failed for {instance}: {e}");
                warnings.push(format!("tunnel plugin: {e}"));
            }
        }

        if record.bedrock {
            if let Err(e) = self.provisioner.install_bridge(instance).await {
                tracing::error!("bridge provisioning failed for {instance}: {e}");
                warnings.push(format!("bridge plugins: {e}"));
            }
        }

        // Reload before the version bump so concurrent operator edits to
        // memory bounds or flags are not clobbered (last writer wins).
        let mut record = self.store.load(instance)?;
        let previous = std::mem::replace(&mut record.version, latest.clone());
        self.store.save(instance, &record)?;

        tracing::info!("server {instance} updated to {latest}");
        Ok(UpdateOutcome::Updated {
            from: previous,
            to: latest,
            warnings,
        })
    }

    /// Create a new server on the latest stable build: directory, license
    /// acceptance, initial metadata, downloaded binary.
    pub async fn create(&self, instance: &str) -> Result<String> {
        let latest = self.resolver.resolve_channel(&self.config.project).await?;
        let artifact = self
            .resolver
            .resolve_stable_build(&self.config.project, &latest)
            .await?;

        let dir = self.config.root.join(instance);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("eula.txt"), "eula=true")?;

        let record = MetadataRecord::initial(
            &latest,
            self.config.default_minimum_mb,
            self.config.default_maximum_mb,
        );
        self.store.save(instance, &record)?;

        let jar = dir.join(format!("{instance}.jar"));
        let temp = dir.join(format!("{instance}.jar.part"));
        self.fetcher.download(&artifact.download_url, &temp).await?;
        Fetcher::install_atomically(&temp, &jar)?;

        tracing::info!("created server {instance} on version {latest}");
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManagerError;
    use mockito::Server;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(server: &mockito::ServerGuard, root: &std::path::Path) -> ManagerConfig {
        ManagerConfig {
            root: root.to_path_buf(),
            release_feed_url: server.url(),
            registry_url: server.url(),
            plugin_host_url: server.url(),
            tunnel_plugin_url: format!("{}/tunnel/playit.jar", server.url()),
            ..ManagerConfig::default()
        }
    }

    fn seed_instance(root: &std::path::Path, name: &str, version: &str) {
        let store = MetadataStore::new(root);
        store
            .save(name, &MetadataRecord::initial(version, 1024, 2048))
            .unwrap();
        fs::write(root.join(name).join(format!("{name}.jar")), b"OLDJAR").unwrap();
    }

    async fn mock_versions_feed(server: &mut mockito::ServerGuard, latest: &str) {
        server
            .mock("GET", "/projects/paper")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"versions": {"1.20": ["1.20.1"], "1.21": [latest]}}).to_string(),
            )
            .create_async()
            .await;
    }

    async fn mock_stable_build(server: &mut mockito::ServerGuard, version: &str) {
        let url = format!("{}/dl/paper.jar", server.url());
        server
            .mock(
                "GET",
                format!("/projects/paper/versions/{version}/builds").as_str(),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"channel": "ALPHA", "downloads": {}},
                    {"channel": "STABLE", "downloads": {"server:default": {"url": url}}}
                ])
                .to_string(),
            )
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_update_full_scenario() {
        let mut server = Server::new_async().await;
        mock_versions_feed(&mut server, "1.21.0").await;
        mock_stable_build(&mut server, "1.21.0").await;
        server
            .mock("GET", "/dl/paper.jar")
            .with_status(200)
            .with_body(b"NEWJAR".as_slice())
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        seed_instance(root.path(), "survival", "1.20.1");

        let config = test_config(&server, root.path());
        let supervisor = ProcessSupervisor::new(&config);
        let pipeline = UpdatePipeline::new(&config, &supervisor).unwrap();

        let outcome = pipeline.update("survival").await.unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::Updated {
                from: "1.20.1".to_string(),
                to: "1.21.0".to_string(),
                warnings: vec![],
            }
        );

        // New binary installed, no temp left behind
        assert_eq!(
            fs::read(root.path().join("survival/survival.jar")).unwrap(),
            b"NEWJAR"
        );
        assert!(!root.path().join("survival/survival.jar.part").exists());

        // Version persisted as the trailing indicator of success
        let record = MetadataStore::new(root.path()).load("survival").unwrap();
        assert_eq!(record.version, "1.21.0");

        // Backup set holds the pre-update binary
        let backups = root.path().join(backup::BACKUPS_DIR);
        let set = fs::read_dir(&backups).unwrap().next().unwrap().unwrap();
        assert_eq!(
            fs::read(set.path().join("survival/survival.jar")).unwrap(),
            b"OLDJAR"
        );
    }

    #[tokio::test]
    async fn test_update_equal_version_is_noop() {
        let mut server = Server::new_async().await;
        mock_versions_feed(&mut server, "1.21.0").await;

        let root = TempDir::new().unwrap();
        seed_instance(root.path(), "survival", "1.21.0");

        let config = test_config(&server, root.path());
        let supervisor = ProcessSupervisor::new(&config);
        let pipeline = UpdatePipeline::new(&config, &supervisor).unwrap();

        let outcome = pipeline.update("survival").await.unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::UpToDate {
                version: "1.21.0".to_string()
            }
        );

        // No backup, no download, no metadata write
        assert!(!root.path().join(backup::BACKUPS_DIR).exists());
        assert_eq!(
            fs::read(root.path().join("survival/survival.jar")).unwrap(),
            b"OLDJAR"
        );
    }

    #[tokio::test]
    async fn test_update_download_failure_changes_nothing() {
        let mut server = Server::new_async().await;
        mock_versions_feed(&mut server, "1.21.0").await;
        mock_stable_build(&mut server, "1.21.0").await;
        server
            .mock("GET", "/dl/paper.jar")
            .with_status(404)
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        seed_instance(root.path(), "survival", "1.20.1");

        let config = test_config(&server, root.path());
        let supervisor = ProcessSupervisor::new(&config);
        let pipeline = UpdatePipeline::new(&config, &supervisor).unwrap();

        let result = pipeline.update("survival").await;
        assert!(matches!(result, Err(ManagerError::Download(_))));

        // Old binary and stored version byte-for-byte unchanged
        assert_eq!(
            fs::read(root.path().join("survival/survival.jar")).unwrap(),
            b"OLDJAR"
        );
        assert!(!root.path().join("survival/survival.jar.part").exists());
        let record = MetadataStore::new(root.path()).load("survival").unwrap();
        assert_eq!(record.version, "1.20.1");
    }

    #[tokio::test]
    async fn test_update_no_stable_build_aborts_before_backup() {
        let mut server = Server::new_async().await;
        mock_versions_feed(&mut server, "1.21.0").await;
        server
            .mock("GET", "/projects/paper/versions/1.21.0/builds")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([{"channel": "ALPHA", "downloads": {}}]).to_string())
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        seed_instance(root.path(), "survival", "1.20.1");

        let config = test_config(&server, root.path());
        let supervisor = ProcessSupervisor::new(&config);
        let pipeline = UpdatePipeline::new(&config, &supervisor).unwrap();

        let result = pipeline.update("survival").await;
        assert!(matches!(result, Err(ManagerError::NoStableBuild(_))));
        assert!(!root.path().join(backup::BACKUPS_DIR).exists());
    }

    #[tokio::test]
    async fn test_update_plugin_failure_is_a_warning_not_a_rollback() {
        let mut server = Server::new_async().await;
        mock_versions_feed(&mut server, "1.21.0").await;
        mock_stable_build(&mut server, "1.21.0").await;
        server
            .mock("GET", "/dl/paper.jar")
            .with_status(200)
            .with_body(b"NEWJAR".as_slice())
            .create_async()
            .await;
        // Tunnel plugin host is down
        server
            .mock("GET", "/tunnel/playit.jar")
            .with_status(502)
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        let store = MetadataStore::new(root.path());
        let mut record = MetadataRecord::initial("1.20.1", 1024, 2048);
        record.playit = true;
        store.save("survival", &record).unwrap();
        fs::write(root.path().join("survival/survival.jar"), b"OLDJAR").unwrap();

        let config = test_config(&server, root.path());
        let supervisor = ProcessSupervisor::new(&config);
        let pipeline = UpdatePipeline::new(&config, &supervisor).unwrap();

        let outcome = pipeline.update("survival").await.unwrap();
        match outcome {
            UpdateOutcome::Updated { to, warnings, .. } => {
                assert_eq!(to, "1.21.0");
                assert_eq!(warnings.len(), 1);
                assert!(warnings[0].starts_with("tunnel plugin:"));
            }
            other => panic!("expected Updated, got {other:?}"),
        }

        // Binary update stands and the new version is persisted
        assert_eq!(
            fs::read(root.path().join("survival/survival.jar")).unwrap(),
            b"NEWJAR"
        );
        assert_eq!(store.load("survival").unwrap().version, "1.21.0");
    }

    #[tokio::test]
    async fn test_create_instance() {
        let mut server = Server::new_async().await;
        mock_versions_feed(&mut server, "1.21.0").await;
        mock_stable_build(&mut server, "1.21.0").await;
        server
            .mock("GET", "/dl/paper.jar")
            .with_status(200)
            .with_body(b"FRESHJAR".as_slice())
            .create_async()
            .await;

        let root = TempDir::new().unwrap();
        let config = test_config(&server, root.path());
        let supervisor = ProcessSupervisor::new(&config);
        let pipeline = UpdatePipeline::new(&config, &supervisor).unwrap();

        let version = pipeline.create("survival").await.unwrap();
        assert_eq!(version, "1.21.0");

        let dir = root.path().join("survival");
        assert_eq!(fs::read(dir.join("eula.txt")).unwrap(), b"eula=true");
        assert_eq!(fs::read(dir.join("survival.jar")).unwrap(), b"FRESHJAR");

        let record = MetadataStore::new(root.path()).load("survival").unwrap();
        assert_eq!(record.version, "1.21.0");
        assert_eq!(record.minimum, 1024);
        assert_eq!(record.maximum, 2048);
        assert!(!record.playit);
        assert!(!record.bedrock);
    }
}
