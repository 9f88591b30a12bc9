//! Local storage shared by concurrent horizon runs.
//!
//! Everything lives under one session directory. Documents are written
//! whole (temp file then rename) and logs are appended one full line per
//! write, so independent processes can touch the same directory without
//! locks.

pub mod cache;
pub mod pending;
pub mod queue;

pub use cache::ContextCache;
pub use pending::PendingStore;
pub use queue::{PersistenceQueue, StoreMode};

use crate::error::{Result, SynthesisError};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use walkdir::WalkDir;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Name unique to this process and call, for temp and claim files.
pub(crate) fn unique_suffix() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}.{}.{}", std::process::id(), nanos, seq)
}

/// Create `dir` and its parents.
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| SynthesisError::io(dir, e))
}

/// Write `value` as pretty JSON, replacing any previous document at `path`.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content =
        serde_json::to_string_pretty(value).map_err(|e| SynthesisError::json(path, e))?;
    write_atomic(path, &content)
}

/// Replace the file at `path` with `content`.
///
/// Readers see either the old or the new document, never a partial one.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, unique_suffix()));

    fs::write(&tmp, content).map_err(|e| SynthesisError::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(SynthesisError::io(path, e));
    }

    debug!("Wrote {}", path.display());
    Ok(())
}

/// Append one line to `path` with a single write on an append-mode handle.
pub(crate) fn append_line(path: &Path, line: &str) -> Result<()> {
    append_lines(path, &[line])
}

/// Append several lines to `path` in one write, so they land together or
/// not at all.
pub(crate) fn append_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let mut block = String::new();
    for line in lines {
        block.push_str(line.as_ref());
        block.push('\n');
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SynthesisError::io(path, e))?;
    file.write_all(block.as_bytes())
        .map_err(|e| SynthesisError::io(path, e))
}

/// Read one JSON document. `Ok(None)` when the file does not exist.
pub(crate) fn read_json(path: &Path) -> Result<Option<Value>> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SynthesisError::io(path, e)),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| SynthesisError::json(path, e))
}

/// `*.json` files directly inside `dir`, sorted by name.
pub(crate) fn json_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                debug!("Cannot read entry in {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();

    files.sort();
    files
}

/// Every readable JSON document in `dir`. Unparsable documents are skipped.
pub(crate) fn read_json_dir(dir: &Path) -> Vec<(PathBuf, Value)> {
    json_files(dir)
        .into_iter()
        .filter_map(|path| match read_json(&path) {
            Ok(Some(value)) => Some((path, value)),
            Ok(None) => None,
            Err(e) => {
                warn!("Skipping unreadable record: {}", e);
                None
            }
        })
        .collect()
}
