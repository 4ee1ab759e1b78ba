// SPDX-License-Identifier: MIT

//! Version parsing and ordering
//!
//! Upstream version identifiers are dot-separated integer components of any
//! length. Ordering is over the parsed integer tuple, not the string, so
//! "10.0" sorts above "9.9".

use crate::error::{ManagerError, Result};
use std::cmp::Ordering;

/// Parse a version string into its integer components (e.g. "1.21.4" -> [1, 21, 4])
pub fn parse_components(version: &str) -> Result<Vec<u64>> {
    let version = version.trim();
    if version.is_empty() {
        return Err(ManagerError::VersionParse("empty version string".into()));
    }

    version
        .split('.')
        .map(|part| {
            part.parse::<u64>().map_err(|_| {
                ManagerError::VersionParse(format!(
                    "invalid component {part:?} in version {version:?}"
                ))
            })
        })
        .collect()
}

/// Compare two version strings numerically component by component
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(parse_components(a)?.cmp(&parse_components(b)?))
}

/// Pick the numerically greatest version out of an iterator of version strings
pub fn latest<'a>(versions: impl IntoIterator<Item = &'a str>) -> Result<Option<String>> {
    let mut best: Option<(Vec<u64>, &str)> = None;

    for version in versions {
        let key = parse_components(version)?;
        if best.as_ref().is_none_or(|(current, _)| key > *current) {
            best = Some((key, version));
        }
    }

    Ok(best.map(|(_, version)| version.to_string()))
}
