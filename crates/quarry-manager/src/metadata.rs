// SPDX-License-Identifier: MIT

//! Per-server metadata records
//!
//! Each server directory carries one flat JSON record with the installed
//! version, memory bounds and feature flags. The memory bounds are
//! string-encoded megabyte counts on disk; readers also accept the plain
//! numeric form. Keys added after initial creation must load with defaults
//! rather than be treated as corruption.

use crate::error::{ManagerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "instance.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Opaque upstream version identifier of the installed binary
    pub version: String,

    /// Minimum heap size in MB
    #[serde(with = "mb_string")]
    pub minimum: u32,

    /// Maximum heap size in MB
    #[serde(with = "mb_string")]
    pub maximum: u32,

    /// Tunneling plugin enabled
    #[serde(default)]
    pub playit: bool,

    /// Protocol-bridge plugin set enabled
    #[serde(default)]
    pub bedrock: bool,
}

impl MetadataRecord {
    /// Record for a freshly created server: resolved version, given memory
    /// bounds, both feature flags off.
    pub fn initial(version: &str, minimum: u32, maximum: u32) -> Self {
        Self {
            version: version.to_string(),
            minimum,
            maximum,
            playit: false,
            bedrock: false,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.minimum == 0 || self.maximum == 0 {
            return Err(ManagerError::Metadata(
                "memory bounds must be positive".into(),
            ));
        }
        if self.maximum < self.minimum {
            return Err(ManagerError::Metadata(format!(
                "maximum heap {}M below minimum {}M",
                self.maximum, self.minimum
            )));
        }
        Ok(())
    }
}

/// Megabyte counts stored as strings ("2048"), tolerating the numeric form
mod mb_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MbField {
        Text(String),
        Number(u32),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        match MbField::deserialize(deserializer)? {
            MbField::Number(value) => Ok(value),
            MbField::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid memory bound {text:?}"))),
        }
    }
}

/// Durable store for per-server metadata records, rooted at the working root
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn path_for(&self, instance: &str) -> PathBuf {
        self.root.join(instance).join(METADATA_FILE)
    }

    pub fn exists(&self, instance: &str) -> bool {
        self.path_for(instance).exists()
    }

    pub fn load(&self, instance: &str) -> Result<MetadataRecord> {
        let path = self.path_for(instance);
        if !path.exists() {
            return Err(ManagerError::Metadata(format!(
                "no metadata record for server {instance}"
            )));
        }

        let content = fs::read_to_string(&path)?;
        let record: MetadataRecord = serde_json::from_str(&content)?;
        record.validate()?;
        Ok(record)
    }

    pub fn save(&self, instance: &str, record: &MetadataRecord) -> Result<()> {
        record.validate()?;

        let path = self.path_for(instance);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Atomic write
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &path)?;

        Ok(())
    }

    /// Directories under the root that hold a metadata record, sorted by name
    pub fn list_instances(&self) -> Result<Vec<String>> {
        let mut instances = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if !entry.path().join(METADATA_FILE).exists() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                instances.push(name.to_string());
            }
        }

        instances.sort();
        Ok(instances)
    }
}
