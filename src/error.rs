//! Error types for the synthesis pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Failure raised inside a horizon operation.
///
/// These never escape an operation boundary; the controller records them
/// in the error log and reports the operation as failed.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {what}: {source}")]
    Encode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to persist {namespace}/{key}")]
    Persist { namespace: String, key: String },

    #[error("Invalid key '{0}': must be non-empty and contain no path separators")]
    InvalidKey(String),
}

impl SynthesisError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SynthesisError>;

/// Rejects keys that would escape their namespace directory.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\', '\0']) {
        return Err(SynthesisError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("task-42").is_ok());
        assert!(validate_key("session_abc_final").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a\\b").is_err());
    }

    #[test]
    fn test_error_display() {
        let err = SynthesisError::Persist {
            namespace: "synthesis".to_string(),
            key: "phase_20260101_000000".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to persist synthesis/phase_20260101_000000"
        );
    }
}
