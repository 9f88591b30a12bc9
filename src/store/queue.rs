//! Persistence queue towards the external memory store.
//!
//! In primary mode every save is appended to `store_queue.jsonl`; a
//! separate process drains that log into the store and mirrors loaded
//! documents into `store_cache/`. In fallback mode documents are written
//! straight to `store_fallback/<namespace>/<key>.json`.

use super::{append_line, read_json, read_json_dir, write_json_atomic};
use crate::error::{validate_key, Result, SynthesisError};
use crate::models::{Namespace, QueueEntry};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

const QUEUE_FILE: &str = "store_queue.jsonl";

/// Where saves go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Append to the local queue for the external store.
    Queued,
    /// Write documents locally, last write wins.
    Fallback,
}

/// Non-blocking hand-off to the external store.
#[derive(Debug)]
pub struct PersistenceQueue {
    mode: StoreMode,
    queue_path: PathBuf,
    cache_dir: PathBuf,
    fallback_dir: PathBuf,
    degraded: AtomicBool,
}

impl PersistenceQueue {
    /// Create a queue rooted at the session directory.
    pub fn new(root: &Path, mode: StoreMode) -> Self {
        Self {
            mode,
            queue_path: root.join(QUEUE_FILE),
            cache_dir: root.join("store_cache"),
            fallback_dir: root.join("store_fallback"),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Path of the append log drained by the external store.
    #[cfg(test)]
    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    /// Record a save request. Never fails; returns whether it was recorded.
    pub fn enqueue<T: Serialize + ?Sized>(&self, namespace: Namespace, key: &str, data: &T) -> bool {
        match self.try_enqueue(namespace, key, data) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to persist {}/{}: {}", namespace, key, e);
                false
            }
        }
    }

    fn try_enqueue<T: Serialize + ?Sized>(
        &self,
        namespace: Namespace,
        key: &str,
        data: &T,
    ) -> Result<()> {
        validate_key(key)?;

        match self.mode {
            StoreMode::Fallback => self.write_fallback(namespace, key, data),
            StoreMode::Queued => match self.append(namespace, key, data) {
                Ok(()) => Ok(()),
                Err(e) => {
                    if !self.degraded.swap(true, Ordering::Relaxed) {
                        warn!("Store queue unavailable, writing locally instead: {}", e);
                    }
                    self.write_fallback(namespace, key, data)
                }
            },
        }
    }

    fn append<T: Serialize + ?Sized>(&self, namespace: Namespace, key: &str, data: &T) -> Result<()> {
        let encode = |e: serde_json::Error| SynthesisError::Encode {
            what: format!("{}/{}", namespace, key),
            source: e,
        };

        let entry = QueueEntry {
            timestamp: Utc::now(),
            namespace,
            key: key.to_string(),
            data: serde_json::to_value(data).map_err(encode)?,
        };
        let line = serde_json::to_string(&entry).map_err(encode)?;

        append_line(&self.queue_path, &line)?;
        debug!("Queued {}/{}", namespace, key);
        Ok(())
    }

    fn write_fallback<T: Serialize + ?Sized>(
        &self,
        namespace: Namespace,
        key: &str,
        data: &T,
    ) -> Result<()> {
        let path = self.document_path(&self.fallback_dir, namespace, key);
        write_json_atomic(&path, data)
    }

    fn document_path(&self, base: &Path, namespace: Namespace, key: &str) -> PathBuf {
        base.join(namespace.as_str()).join(format!("{}.json", key))
    }

    /// Read a document without waiting on the external store.
    ///
    /// In queued mode only the local read-through cache is consulted, so
    /// `None` means "not available yet" rather than "does not exist".
    pub fn load(&self, namespace: Namespace, key: &str) -> Option<Value> {
        if validate_key(key).is_err() {
            return None;
        }

        let base = match self.mode {
            StoreMode::Queued => &self.cache_dir,
            StoreMode::Fallback => &self.fallback_dir,
        };

        match read_json(&self.document_path(base, namespace, key)) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to load {}/{}: {}", namespace, key, e);
                None
            }
        }
    }

    /// Every locally available document of a namespace.
    pub fn cached(&self, namespace: Namespace) -> Vec<Value> {
        let base = match self.mode {
            StoreMode::Queued => &self.cache_dir,
            StoreMode::Fallback => &self.fallback_dir,
        };

        read_json_dir(&base.join(namespace.as_str()))
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }
}
