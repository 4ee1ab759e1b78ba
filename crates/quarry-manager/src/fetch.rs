// SPDX-License-Identifier: MIT

//! Streaming downloads and atomic installs
//!
//! A download streams the body chunk by chunk into a freshly created temp
//! file; any failure removes the partial file. Installation is
//! replace-by-move: the final path is only ever touched by a completed move,
//! and a failed move leaves the temp file in place for diagnosis.

use crate::error::{ManagerError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ManagerError::Download(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Stream `url` into `temp_path`. All-or-nothing: on any error the
    /// partial temp file is removed before the error is returned.
    pub async fn download(&self, url: &str, temp_path: &Path) -> Result<()> {
        tracing::info!("downloading {url}");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ManagerError::Download(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ManagerError::Download(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        let mut file = fs::File::create(temp_path).map_err(|e| {
            ManagerError::Download(format!("creating {} failed: {e}", temp_path.display()))
        })?;

        let streamed: Result<u64> = async {
            let mut written = 0u64;
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| ManagerError::Download(format!("reading body of {url} failed: {e}")))?
            {
                file.write_all(&chunk).map_err(|e| {
                    ManagerError::Download(format!("writing {} failed: {e}", temp_path.display()))
                })?;
                written += chunk.len() as u64;
            }
            file.flush().map_err(|e| {
                ManagerError::Download(format!("flushing {} failed: {e}", temp_path.display()))
            })?;
            Ok(written)
        }
        .await;

        drop(file);

        match streamed {
            Ok(written) => {
                tracing::debug!("downloaded {written} bytes to {}", temp_path.display());
                Ok(())
            }
            Err(e) => {
                if temp_path.exists() {
                    match fs::remove_file(temp_path) {
                        Ok(()) => {
                            tracing::debug!("removed partial download {}", temp_path.display());
                        }
                        Err(remove_err) => tracing::warn!(
                            "could not remove partial download {}: {remove_err}",
                            temp_path.display()
                        ),
                    }
                }
                Err(e)
            }
        }
    }

    /// Move `temp_path` onto `final_path`, replacing whatever is there, then
    /// remove the temp file if it survived the move. A failed move leaves the
    /// temp file present and the final path untouched.
    pub fn install_atomically(temp_path: &Path, final_path: &Path) -> Result<()> {
        if let Err(rename_err) = fs::rename(temp_path, final_path) {
            // Rename cannot cross filesystems; fall back to copy + remove.
            fs::copy(temp_path, final_path).map_err(|copy_err| {
                ManagerError::Install(format!(
                    "moving {} to {} failed (rename: {rename_err}, copy: {copy_err})",
                    temp_path.display(),
                    final_path.display()
                ))
            })?;
        }

        if temp_path.exists() {
            fs::remove_file(temp_path).map_err(|e| {
                ManagerError::Install(format!(
                    "removing leftover temp file {} failed: {e}",
                    temp_path.display()
                ))
            })?;
        }

        tracing::debug!("installed {}", final_path.display());
        Ok(())
    }
}
