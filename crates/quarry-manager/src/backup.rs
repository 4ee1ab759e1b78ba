// SPDX-License-Identifier: MIT

//! Pre-update backups
//!
//! A blanket safety net: every server directory under the working root is
//! copied into a fresh timestamped directory under the reserved backup
//! directory before any update touches the filesystem. Backups are never
//! pruned here; retention is the operator's call.

use crate::error::{ManagerError, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

pub const BACKUPS_DIR: &str = "backups";

/// Copy every server directory under `root` into a new backup set and
/// return its path. Finding no server directories at all means the root is
/// not what the tool expects and is an error.
pub fn backup_all(root: &Path) -> Result<PathBuf> {
    let mut servers = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if name == BACKUPS_DIR || name.starts_with('.') {
            continue;
        }
        servers.push(name);
    }

    if servers.is_empty() {
        return Err(ManagerError::NoServersFound(root.display().to_string()));
    }

    let timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let backup_dir = root.join(BACKUPS_DIR).join(timestamp);
    fs::create_dir_all(&backup_dir)?;

    for server in &servers {
        copy_dir(&root.join(server), &backup_dir.join(server))?;
        tracing::info!("backed up {server}");
    }

    tracing::info!("backup set written to {}", backup_dir.display());
    Ok(backup_dir)
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }

    Ok(())
}
