// SPDX-License-Identifier: MIT

//! Quarry - supervision and provisioning for local game servers
//!
//! The core owns the lifecycle of one or more long-lived server processes
//! (start, stop, console relay, operator commands) and the update pipeline
//! that keeps their binaries and managed plugins current against the remote
//! release feeds. Presentation is someone else's job: callers start servers,
//! subscribe to console lines, and render them however they like.

pub mod backup;
pub mod config;
pub mod error;
pub mod fetch;
pub mod metadata;
pub mod pipeline;
pub mod provision;
pub mod release;
pub mod supervisor;
pub mod version;

pub use config::ManagerConfig;
pub use error::{ManagerError, Result};
pub use fetch::Fetcher;
pub use metadata::{MetadataRecord, MetadataStore};
pub use pipeline::{UpdateOutcome, UpdatePipeline};
pub use provision::PluginProvisioner;
pub use release::{ReleaseArtifact, ReleaseResolver};
pub use supervisor::{ConsoleLine, ProcessSupervisor};
