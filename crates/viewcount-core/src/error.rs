//! Error types for viewcount.

use thiserror::Error;

/// Top-level result type for viewcount operations.
pub type Result<T> = std::result::Result<T, ViewCountError>;

/// Top-level error type for viewcount.
#[derive(Debug, Error)]
pub enum ViewCountError {
    #[error("corrupt counter store: {0}")]
    CorruptStore(String),

    #[error("frontmatter error: {0}")]
    Frontmatter(String),

    #[error("metadata error for '{path}': {message}")]
    Metadata { path: String, message: String },

    #[error("unknown {kind} '{value}'")]
    UnknownValue { kind: &'static str, value: String },

    #[error("invalid plugin version '{0}'")]
    Version(String),

    #[error("migration to {target} failed: {message}")]
    Migration { target: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ViewCountError {
    /// Build a [`ViewCountError::Metadata`] for the given item path.
    pub fn metadata(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_human_readable_messages() {
        let err = ViewCountError::CorruptStore("expected value at line 1".to_string());
        assert!(err.to_string().contains("corrupt counter store"));

        let err = ViewCountError::Migration {
            target: "2.0.0".to_string(),
            message: "disk full".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2.0.0"));
        assert!(msg.contains("disk full"));

        let err = ViewCountError::metadata("notes/a.md", "not a mapping");
        assert!(err.to_string().contains("notes/a.md"));
    }
}
