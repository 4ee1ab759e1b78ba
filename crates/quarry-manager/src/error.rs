// SPDX-License-Identifier: MIT

//! Error types for the manager crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("launch failed: {0}")]
    Launch(String),

    #[error("server {0} is not running")]
    NotRunning(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("version parse error: {0}")]
    VersionParse(String),

    #[error("release resolution failed: {0}")]
    Resolution(String),

    #[error("no stable build published for version {0}")]
    NoStableBuild(String),

    #[error("no downloadable asset for {0}")]
    NoAssetFound(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("install failed: {0}")]
    Install(String),

    #[error("no server directories under {0}")]
    NoServersFound(String),

    #[error("plugin provisioning incomplete: installed {installed:?}, failed {failed:?}")]
    PartialProvision {
        installed: Vec<String>,
        failed: Vec<String>,
    },
}

pub type Result<T> = std::result::Result<T, ManagerError>;
