//! Local error log for failed horizon operations.

use crate::store::append_line;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only `[timestamp] message` log under `logs/`.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    /// Create a log rooted at the session directory.
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join("logs").join("synthesis_errors.log"),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line. A failure here is only traced.
    pub fn record(&self, message: &str) {
        let line = format!("[{}] {}", Utc::now().to_rfc3339(), message.replace('\n', " "));
        if let Err(e) = append_line(&self.path, &line) {
            warn!("Could not write error log {}: {}", self.path.display(), e);
        }
    }
}
