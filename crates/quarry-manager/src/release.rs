// SPDX-License-Identifier: MIT

//! Release feed resolution
//!
//! Two upstreams: the project release feed (versions per project, builds per
//! version) and a secondary package registry used for one of the bridge
//! plugins. Feed order of the builds list defines recency; the first entry
//! carrying the stability tag wins.

use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result};
use crate::version;
use serde::Deserialize;
use std::collections::HashMap;

/// Channel marker of stable builds in the builds feed
const STABLE_CHANNEL: &str = "STABLE";

/// Download slot holding the server binary within a build entry
const SERVER_DOWNLOAD: &str = "server:default";

/// Resolver output: a concrete downloadable artifact. Only the version is
/// ever persisted, and only after a successful install.
#[derive(Debug, Clone)]
pub struct ReleaseArtifact {
    pub version: String,
    pub download_url: String,
}

#[derive(Debug, Deserialize)]
struct ProjectFeed {
    versions: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct BuildEntry {
    channel: String,
    #[serde(default)]
    downloads: HashMap<String, BuildDownload>,
}

#[derive(Debug, Deserialize)]
struct BuildDownload {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RegistryVersion {
    #[serde(default)]
    files: Vec<RegistryFile>,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    url: String,
}

#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    client: reqwest::Client,
    feed_url: String,
    registry_url: String,
}

impl ReleaseResolver {
    pub fn new(config: &ManagerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ManagerError::Resolution(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            feed_url: config.release_feed_url.trim_end_matches('/').to_string(),
            registry_url: config.registry_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a project to its numerically greatest published version
    pub async fn resolve_channel(&self, project: &str) -> Result<String> {
        let url = format!("{}/projects/{project}", self.feed_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ManagerError::Resolution(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ManagerError::Resolution(format!(
                "versions feed for {project} returned {}",
                response.status()
            )));
        }

        let feed: ProjectFeed = response.json().await.map_err(|e| {
            ManagerError::Resolution(format!("malformed versions feed for {project}: {e}"))
        })?;

        let all_versions = feed
            .versions
            .values()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>();

        version::latest(all_versions)?.ok_or_else(|| {
            ManagerError::Resolution(format!("versions feed for {project} listed no versions"))
        })
    }

    /// Resolve a specific version to its most recent stable build artifact
    pub async fn resolve_stable_build(
        &self,
        project: &str,
        version_id: &str,
    ) -> Result<ReleaseArtifact> {
        let url = format!("{}/projects/{project}/versions/{version_id}/builds", self.feed_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ManagerError::Resolution(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ManagerError::Resolution(format!(
                "builds feed for {project} {version_id} returned {}",
                response.status()
            )));
        }

        let builds: Vec<BuildEntry> = response.json().await.map_err(|e| {
            ManagerError::Resolution(format!("malformed builds feed for {version_id}: {e}"))
        })?;

        // Feed order defines recency; take the first stable entry.
        let mut build = builds
            .into_iter()
            .find(|build| build.channel == STABLE_CHANNEL)
            .ok_or_else(|| ManagerError::NoStableBuild(version_id.to_string()))?;

        let download = build.downloads.remove(SERVER_DOWNLOAD).ok_or_else(|| {
            ManagerError::Resolution(format!(
                "stable build for {version_id} has no {SERVER_DOWNLOAD} download"
            ))
        })?;

        Ok(ReleaseArtifact {
            version: version_id.to_string(),
            download_url: download.url,
        })
    }

    /// Resolve a package registry project to its first listed file URL
    pub async fn resolve_latest_asset(&self, project_id: &str) -> Result<String> {
        let url = format!("{}/project/{project_id}/version", self.registry_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ManagerError::Resolution(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ManagerError::Resolution(format!(
                "registry lookup for {project_id} returned {}",
                response.status()
            )));
        }

        let versions: Vec<RegistryVersion> = response.json().await.map_err(|e| {
            ManagerError::Resolution(format!("malformed registry listing for {project_id}: {e}"))
        })?;

        versions
            .into_iter()
            .next()
            .and_then(|latest| latest.files.into_iter().next())
            .map(|file| file.url)
            .ok_or_else(|| ManagerError::NoAssetFound(project_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;

    fn resolver_for(server: &mockito::ServerGuard) -> ReleaseResolver {
        let config = ManagerConfig {
            release_feed_url: server.url(),
            registry_url: server.url(),
            ..ManagerConfig::default()
        };
        ReleaseResolver::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_channel_picks_numerically_greatest() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/paper")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "versions": {
                        "9": ["9.9", "9.8"],
                        "10": ["10.0"],
                        "1.20": ["1.20.1"]
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let latest = resolver_for(&server).resolve_channel("paper").await.unwrap();
        assert_eq!(latest, "10.0");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolve_channel_empty_feed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/paper")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"versions": {}}).to_string())
            .create_async()
            .await;

        let result = resolver_for(&server).resolve_channel("paper").await;
        assert!(matches!(result, Err(ManagerError::Resolution(_))));
    }

    #[tokio::test]
    async fn test_resolve_channel_unreachable_feed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/paper")
            .with_status(503)
            .create_async()
            .await;

        let result = resolver_for(&server).resolve_channel("paper").await;
        assert!(matches!(result, Err(ManagerError::Resolution(_))));
    }

    #[tokio::test]
    async fn test_resolve_stable_build_first_in_feed_order() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/paper/versions/1.21.0/builds")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"channel": "ALPHA", "downloads": {"server:default": {"url": "https://example.invalid/alpha.jar"}}},
                    {"channel": "STABLE", "downloads": {"server:default": {"url": "https://example.invalid/first-stable.jar"}}},
                    {"channel": "STABLE", "downloads": {"server:default": {"url": "https://example.invalid/older-stable.jar"}}}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let artifact = resolver_for(&server)
            .resolve_stable_build("paper", "1.21.0")
            .await
            .unwrap();
        assert_eq!(artifact.version, "1.21.0");
        assert_eq!(artifact.download_url, "https://example.invalid/first-stable.jar");
    }

    #[tokio::test]
    async fn test_resolve_stable_build_none_available() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/paper/versions/1.21.0/builds")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([{"channel": "ALPHA", "downloads": {}}]).to_string())
            .create_async()
            .await;

        let result = resolver_for(&server).resolve_stable_build("paper", "1.21.0").await;
        assert!(matches!(result, Err(ManagerError::NoStableBuild(v)) if v == "1.21.0"));
    }

    #[tokio::test]
    async fn test_resolve_latest_asset() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/project/viaversion/version")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"files": [{"url": "https://example.invalid/via-5.jar"}, {"url": "https://example.invalid/via-5-sources.jar"}]},
                    {"files": [{"url": "https://example.invalid/via-4.jar"}]}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let url = resolver_for(&server)
            .resolve_latest_asset("viaversion")
            .await
            .unwrap();
        assert_eq!(url, "https://example.invalid/via-5.jar");
    }

    #[tokio::test]
    async fn test_resolve_latest_asset_empty_listing() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/project/viaversion/version")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([]).to_string())
            .create_async()
            .await;

        let result = resolver_for(&server).resolve_latest_asset("viaversion").await;
        assert!(matches!(result, Err(ManagerError::NoAssetFound(p)) if p == "viaversion"));
    }

    #[tokio::test]
    async fn test_resolve_latest_asset_version_without_files() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/project/viaversion/version")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([{"files": []}]).to_string())
            .create_async()
            .await;

        let result = resolver_for(&server).resolve_latest_asset("viaversion").await;
        assert!(matches!(result, Err(ManagerError::NoAssetFound(_))));
    }
}
