//! Pending and archive areas for not-yet-consolidated findings.
//!
//! Layout under the session directory:
//!
//! - `agents/raw_<task_id>.txt` raw task output (written by the task runner)
//! - `findings/<task_id>.json` one file per pending finding
//! - `findings/pending_synthesis.jsonl` batch log counted by incremental runs
//! - `archived_phases/<task_id>.json` findings consumed by a phase synthesis
//! - `findings/pending_synthesis.jsonl.<pid>.<nanos>.<seq>.claim` a batch log
//!   held by an incremental run

use super::{
    append_line, append_lines, ensure_dir, json_files, read_json, unique_suffix,
    write_json_atomic,
};
use crate::error::{validate_key, Result, SynthesisError};
use crate::models::{Contribution, Finding};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const PENDING_LOG: &str = "pending_synthesis.jsonl";

/// How long a claim may be held before another run treats it as abandoned.
const DEFAULT_CLAIM_GRACE_SECS: i64 = 10;

/// Directory-backed pending store. Owned by the horizon controller.
#[derive(Debug, Clone)]
pub struct PendingStore {
    agents_dir: PathBuf,
    findings_dir: PathBuf,
    archive_dir: PathBuf,
    claim_grace: Duration,
}

impl PendingStore {
    /// Create a store rooted at the session directory.
    pub fn new(root: &Path) -> Self {
        Self {
            agents_dir: root.join("agents"),
            findings_dir: root.join("findings"),
            archive_dir: root.join("archived_phases"),
            claim_grace: Duration::seconds(DEFAULT_CLAIM_GRACE_SECS),
        }
    }

    /// Age after which an unfinished claim is returned to the batch log.
    ///
    /// Must exceed the longest time a live run can hold a claim.
    pub fn with_claim_grace(mut self, grace: Duration) -> Self {
        self.claim_grace = grace;
        self
    }

    /// Path of the raw output captured for a task.
    pub fn raw_path(&self, task_id: &str) -> PathBuf {
        self.agents_dir.join(format!("raw_{}.txt", task_id))
    }

    /// Path of the batch log.
    pub fn pending_log(&self) -> PathBuf {
        self.findings_dir.join(PENDING_LOG)
    }

    /// Directory holding archived findings.
    #[cfg(test)]
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Raw output of a task. `Ok(None)` when nothing was captured.
    pub fn raw_output(&self, task_id: &str) -> Result<Option<String>> {
        validate_key(task_id)?;
        let path = self.raw_path(task_id);

        match fs::read(&path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SynthesisError::io(path, e)),
        }
    }

    /// Store a finding as a pending file and record it in the batch log.
    pub fn put(&self, finding: &Finding) -> Result<PathBuf> {
        validate_key(&finding.task_id)?;

        let path = self.findings_dir.join(format!("{}.json", finding.task_id));
        write_json_atomic(&path, finding)?;

        let line = serde_json::to_string(finding).map_err(|e| SynthesisError::Encode {
            what: format!("finding {}", finding.task_id),
            source: e,
        })?;
        append_line(&self.pending_log(), &line)?;

        Ok(path)
    }

    /// Number of valid entries currently in the batch log.
    #[cfg(test)]
    pub fn pending_count(&self) -> Result<usize> {
        let path = self.pending_log();
        match fs::read_to_string(&path) {
            Ok(content) => Ok(parse_log(&content).len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(SynthesisError::io(path, e)),
        }
    }

    #[cfg(test)]
    pub fn claim(&self) -> Result<Option<Claim>> {
        self.claim_at(Utc::now())
    }

    /// Take exclusive ownership of the current batch log.
    ///
    /// The log is renamed aside, so a concurrent claim either gets this
    /// batch or finds no log at all. `Ok(None)` when there is no log.
    ///
    /// Claims older than the grace period at `now` belong to a run that
    /// died; their entries are put back into the log first so this claim
    /// picks them up.
    pub fn claim_at(&self, now: DateTime<Utc>) -> Result<Option<Claim>> {
        let recovered = self.recover_stale_claims(now);
        if recovered > 0 {
            debug!("Recovered {} abandoned claims", recovered);
        }

        let log = self.pending_log();
        let claimed = self.claim_path();

        match fs::rename(&log, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SynthesisError::io(log, e)),
        }

        let content = match fs::read_to_string(&claimed) {
            Ok(c) => c,
            Err(e) => {
                // Put the batch back rather than strand it.
                let _ = fs::rename(&claimed, &log);
                return Err(SynthesisError::io(claimed, e));
            }
        };

        let entries = parse_log(&content);
        debug!("Claimed {} pending entries", entries.len());

        Ok(Some(Claim {
            path: claimed,
            log,
            read_len: content.len(),
            entries,
        }))
    }

    fn claim_path(&self) -> PathBuf {
        self.findings_dir
            .join(format!("{}.{}.claim", PENDING_LOG, unique_suffix()))
    }

    /// Return the entries of abandoned claims to the batch log.
    /// Returns how many claim files were taken over.
    fn recover_stale_claims(&self, now: DateTime<Utc>) -> usize {
        if !self.findings_dir.is_dir() {
            return 0;
        }

        let stale: Vec<PathBuf> = WalkDir::new(&self.findings_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                claim_started(&entry.file_name().to_string_lossy())
                    .is_some_and(|started| now.signed_duration_since(started) > self.claim_grace)
            })
            .map(|entry| entry.into_path())
            .collect();

        let mut recovered = 0;
        for path in stale {
            match self.adopt(&path) {
                Ok(true) => recovered += 1,
                Ok(false) => {}
                Err(e) => warn!("Could not recover abandoned claim: {}", e),
            }
        }
        recovered
    }

    /// Take over an abandoned claim under a fresh name, then hand its lines
    /// back to the batch log. `Ok(false)` when another run got there first.
    ///
    /// If this run dies midway, the fresh name ages out and is recovered again.
    fn adopt(&self, stale: &Path) -> Result<bool> {
        let taken = self.claim_path();
        match fs::rename(stale, &taken) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(SynthesisError::io(stale, e)),
        }

        let content = fs::read_to_string(&taken).map_err(|e| SynthesisError::io(&taken, e))?;
        let lines = valid_lines(&content);
        append_lines(&self.pending_log(), &lines)?;
        fs::remove_file(&taken).map_err(|e| SynthesisError::io(&taken, e))?;

        warn!("Returned {} entries from an abandoned claim to the batch log", lines.len());
        Ok(true)
    }

    /// Every pending finding file. Unreadable files are skipped.
    pub fn findings(&self) -> Vec<(PathBuf, Finding)> {
        json_files(&self.findings_dir)
            .into_iter()
            .filter_map(|path| {
                let value = match read_json(&path) {
                    Ok(Some(v)) => v,
                    Ok(None) => return None,
                    Err(e) => {
                        warn!("Skipping unreadable finding: {}", e);
                        return None;
                    }
                };
                match serde_json::from_value::<Finding>(value) {
                    Ok(finding) => Some((path, finding)),
                    Err(e) => {
                        warn!("Skipping malformed finding {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Move consumed finding files into the archive. Returns how many moved.
    pub fn archive(&self, paths: &[PathBuf]) -> Result<usize> {
        ensure_dir(&self.archive_dir)?;

        let mut moved = 0;
        for path in paths {
            let Some(name) = path.file_name() else {
                continue;
            };
            match fs::rename(path, self.archive_dir.join(name)) {
                Ok(()) => moved += 1,
                // Already consumed by a concurrent phase run.
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(SynthesisError::io(path, e)),
            }
        }

        Ok(moved)
    }
}

/// A batch log taken out of circulation by [`PendingStore::claim`].
#[derive(Debug)]
pub struct Claim {
    path: PathBuf,
    log: PathBuf,
    /// Bytes of the claim file covered by `entries`.
    read_len: usize,
    entries: Vec<(String, Contribution)>,
}

impl Claim {
    /// Number of valid entries in the claimed batch.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The claimed entries, in append order.
    pub fn contributions(&self) -> Vec<Contribution> {
        self.entries.iter().map(|(_, c)| c.clone()).collect()
    }

    /// Drop the claimed batch for good.
    ///
    /// A writer that opened the log just before the claim renamed it may
    /// still land its line in the claim file; such late lines go back to
    /// the live log.
    pub fn consume(self) -> Result<()> {
        let content = self.read()?;
        let late = content
            .get(self.read_len..)
            .map(valid_lines)
            .unwrap_or_default();
        if !late.is_empty() {
            debug!("Returning {} late entries to the batch log", late.len());
            append_lines(&self.log, &late)?;
        }
        self.remove()
    }

    /// Return the entries to the live log, e.g. when the batch is too small.
    ///
    /// All lines go back in one write, so a failure leaves them either in
    /// the log or in the claim file, never both.
    pub fn release(self) -> Result<()> {
        let content = self.read()?;
        append_lines(&self.log, &valid_lines(&content))?;
        self.remove()
    }

    fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|e| SynthesisError::io(&self.path, e))
    }

    fn remove(&self) -> Result<()> {
        fs::remove_file(&self.path).map_err(|e| SynthesisError::io(&self.path, e))
    }
}

/// When a claim file was taken, read from its name.
fn claim_started(file_name: &str) -> Option<DateTime<Utc>> {
    let suffix = file_name
        .strip_prefix(PENDING_LOG)?
        .strip_prefix('.')?
        .strip_suffix(".claim")?;
    let nanos: i64 = suffix.split('.').nth(1)?.parse().ok()?;
    Some(Utc.timestamp_nanos(nanos))
}

fn valid_lines(content: &str) -> Vec<String> {
    parse_log(content).into_iter().map(|(line, _)| line).collect()
}

/// Valid log lines with their parsed view. Blank or malformed lines are dropped.
fn parse_log(content: &str) -> Vec<(String, Contribution)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let value = serde_json::from_str(line).ok()?;
            let contribution = Contribution::from_value(value).ok()?;
            Some((line.to_string(), contribution))
        })
        .collect()
}
