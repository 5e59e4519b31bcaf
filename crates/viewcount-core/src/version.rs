//! Plugin version tags recorded in the settings record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ViewCountError;

/// A `MAJOR.MINOR.PATCH` version tag, ordered numerically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PluginVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for PluginVersion {
    type Err = ViewCountError;

    /// Parse a version tag. Missing components read as 0 and pre-release or
    /// build suffixes are ignored (`2.4.1-beta.2` is `2.4.1`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ViewCountError::Version(s.to_string());

        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let trimmed = trimmed
            .find(['-', '+'])
            .map_or(trimmed, |end| &trimmed[..end]);
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut parts = [0u32; 3];
        for (i, component) in trimmed.split('.').enumerate() {
            if i >= parts.len() {
                return Err(invalid());
            }
            parts[i] = component.parse().map_err(|_| invalid())?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}
