//! The four synthesis horizons.
//!
//! Each public operation is a single shot: it reads what is on disk,
//! produces at most one synthesis and returns an [`Outcome`]. Failures are
//! written to the error log and reported as [`Outcome::Failed`]; nothing is
//! propagated to the caller.
//!
//! Concurrent incremental runs are serialised by claiming the pending log
//! with a rename. Phase and final runs are not: invoking a horizon twice on
//! the same inputs counts them twice, so callers fire each boundary once.

use super::error_log::ErrorLog;
use crate::analysis::{
    distinct_task_ids, generate_recommendations, generate_summary_text, Aggregator,
};
use crate::config::Config;
use crate::error::{validate_key, Result, SynthesisError};
use crate::extract::Extractor;
use crate::models::{
    Contribution, FinalSynthesis, IncrementalSynthesis, Namespace, PhaseSynthesis, SynthesisKind,
};
use crate::report::{write_report, ReportFormat};
use crate::store::{ContextCache, PendingStore, PersistenceQueue, StoreMode};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Why an operation produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No raw output was captured for the task.
    NoRawOutput,
    /// The raw output carried no pattern, issue or solution.
    NoSignal,
    /// The pending log is below the batch threshold.
    BelowThreshold { pending: usize, threshold: usize },
    /// No finding is pending.
    NoPendingFindings,
    /// Neither cached syntheses nor pending findings exist.
    NothingToSynthesize,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoRawOutput => write!(f, "no raw output captured"),
            SkipReason::NoSignal => write!(f, "no findings in output"),
            SkipReason::BelowThreshold { pending, threshold } => {
                write!(f, "{} pending, threshold is {}", pending, threshold)
            }
            SkipReason::NoPendingFindings => write!(f, "no pending findings"),
            SkipReason::NothingToSynthesize => write!(f, "nothing to synthesize"),
        }
    }
}

/// Result of one horizon operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A document was persisted under `namespace/key` from `inputs` items.
    Produced {
        namespace: Namespace,
        key: String,
        inputs: usize,
    },
    Skipped(SkipReason),
    /// The operation failed; the message was written to the error log.
    Failed(String),
}

impl Outcome {
    #[cfg(test)]
    pub fn is_produced(&self) -> bool {
        matches!(self, Outcome::Produced { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Produced {
                namespace,
                key,
                inputs,
            } => write!(f, "saved {}/{} from {} items", namespace, key, inputs),
            Outcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            Outcome::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

/// Orchestrates the immediate, incremental, phase and final horizons.
pub struct HorizonController {
    pending: PendingStore,
    queue: PersistenceQueue,
    extractor: Extractor,
    aggregator: Aggregator,
    batch_threshold: usize,
    context: ContextCache<Value>,
    errors: ErrorLog,
}

impl HorizonController {
    /// Build a controller from configuration.
    pub fn new(config: &Config) -> Self {
        let root = config.general.temp_dir.as_path();
        let mode = if config.store.enabled {
            StoreMode::Queued
        } else {
            StoreMode::Fallback
        };
        let ttl = Duration::seconds(config.store.context_ttl_seconds as i64);
        // A claim outliving two operation timeouts belongs to a dead run.
        let timeout_ms = config.general.operation_timeout_ms.min(u64::MAX / 4) as i64;
        let claim_grace = Duration::milliseconds(timeout_ms * 2);

        Self {
            pending: PendingStore::new(root).with_claim_grace(claim_grace),
            queue: PersistenceQueue::new(root, mode),
            extractor: Extractor::from(&config.extractor),
            aggregator: Aggregator::from(&config.synthesis),
            batch_threshold: config.synthesis.batch_threshold,
            context: ContextCache::new(ttl),
            errors: ErrorLog::new(root),
        }
    }

    /// Replace the extractor, e.g. to plug in another classifier.
    #[cfg(test)]
    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    #[cfg(test)]
    pub fn error_log(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn queue(&self) -> &PersistenceQueue {
        &self.queue
    }

    #[cfg(test)]
    pub fn pending(&self) -> &PendingStore {
        &self.pending
    }

    /// Extract a finding from a finished task and queue it.
    pub fn synthesize_immediate(&self, task_id: &str) -> Outcome {
        self.guard(&format!("Immediate synthesis failed for {}", task_id), || {
            self.immediate(task_id)
        })
    }

    /// Aggregate the pending log once it holds enough entries.
    pub fn synthesize_incremental(&self, agent_id: Option<&str>) -> Outcome {
        self.guard("Incremental synthesis failed", || {
            self.incremental(agent_id, Utc::now())
        })
    }

    /// Aggregate every pending finding at a phase boundary.
    pub fn synthesize_phase(&self, consolidate: bool) -> Outcome {
        self.guard("Phase synthesis failed", || self.phase(consolidate, Utc::now()))
    }

    /// Aggregate the whole session and optionally write the result to a file.
    pub fn synthesize_final(
        &self,
        session_id: &str,
        output: Option<&Path>,
        format: ReportFormat,
    ) -> Outcome {
        self.guard("Final synthesis failed", || {
            self.finalize(session_id, output, format, Utc::now())
        })
    }

    /// Stored patterns for `key`, served from the context cache while fresh.
    pub fn recall_patterns(&mut self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        if let Some(value) = self.context.get(key, now) {
            debug!("Context cache hit for {}", key);
            return Some(value);
        }

        let value = self.queue.load(Namespace::Patterns, key)?;
        self.context.evict_stale(now);
        self.context.insert(key, value.clone(), now);
        Some(value)
    }

    /// Record a failure that happened outside an operation, e.g. a timeout.
    pub fn record_failure(&self, message: &str) {
        error!("{}", message);
        self.errors.record(message);
    }

    fn guard(&self, context: &str, op: impl FnOnce() -> Result<Outcome>) -> Outcome {
        match op() {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = format!("{}: {}", context, e);
                self.record_failure(&message);
                Outcome::Failed(message)
            }
        }
    }

    fn persist<T: Serialize + ?Sized>(&self, namespace: Namespace, key: &str, data: &T) -> Result<()> {
        if self.queue.enqueue(namespace, key, data) {
            Ok(())
        } else {
            Err(SynthesisError::Persist {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })
        }
    }

    fn immediate(&self, task_id: &str) -> Result<Outcome> {
        let Some(raw) = self.pending.raw_output(task_id)? else {
            debug!("No raw output for task {}", task_id);
            return Ok(Outcome::Skipped(SkipReason::NoRawOutput));
        };

        let Some(finding) = self.extractor.extract(&raw, task_id) else {
            debug!("No findings in output of task {}", task_id);
            return Ok(Outcome::Skipped(SkipReason::NoSignal));
        };

        self.pending.put(&finding)?;
        self.persist(Namespace::Findings, task_id, &finding)?;

        info!(
            "Immediate synthesis for task {} ({} patterns, {} issues, {} solutions)",
            task_id,
            finding.patterns.len(),
            finding.issues.len(),
            finding.solutions.len()
        );

        Ok(Outcome::Produced {
            namespace: Namespace::Findings,
            key: task_id.to_string(),
            inputs: 1,
        })
    }

    fn incremental(&self, agent_id: Option<&str>, now: DateTime<Utc>) -> Result<Outcome> {
        let Some(claim) = self.pending.claim_at(now)? else {
            return Ok(Outcome::Skipped(SkipReason::BelowThreshold {
                pending: 0,
                threshold: self.batch_threshold,
            }));
        };

        if claim.is_empty() {
            claim.consume()?;
            return Ok(Outcome::Skipped(SkipReason::NothingToSynthesize));
        }

        if claim.len() < self.batch_threshold {
            let pending = claim.len();
            claim.release()?;
            debug!("{} pending items, waiting for {}", pending, self.batch_threshold);
            return Ok(Outcome::Skipped(SkipReason::BelowThreshold {
                pending,
                threshold: self.batch_threshold,
            }));
        }

        let items = claim.contributions();
        let aggregate = self.aggregator.aggregate(&items);
        let synthesis = IncrementalSynthesis {
            kind: SynthesisKind::Incremental,
            timestamp: now,
            item_count: items.len(),
            agent_id: agent_id.map(str::to_string),
            patterns: aggregate.patterns,
            issues: aggregate.issues,
            solutions: aggregate.solutions,
        };

        let key = batch_key("incremental", now);
        if let Err(e) = self.persist(Namespace::Synthesis, &key, &synthesis) {
            // Keep the batch for the next run.
            if let Err(release_err) = claim.release() {
                warn!("Could not return claimed batch: {}", release_err);
            }
            return Err(e);
        }
        claim.consume()?;

        info!("Incremental synthesis completed ({} items)", items.len());
        Ok(Outcome::Produced {
            namespace: Namespace::Synthesis,
            key,
            inputs: items.len(),
        })
    }

    fn phase(&self, consolidate: bool, now: DateTime<Utc>) -> Result<Outcome> {
        let findings = self.pending.findings();
        if findings.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::NoPendingFindings));
        }

        let items: Vec<Contribution> = findings.iter().map(|(_, f)| Contribution::from(f)).collect();
        let aggregate = self.aggregator.aggregate(&items);
        let synthesis = PhaseSynthesis {
            kind: SynthesisKind::Phase,
            timestamp: now,
            finding_count: findings.len(),
            task_ids: findings.iter().map(|(_, f)| f.task_id.clone()).collect(),
            patterns: aggregate.patterns,
            issues: aggregate.issues,
            solutions: aggregate.solutions,
            confidence: aggregate.confidence,
        };

        let key = batch_key("phase", now);
        self.persist(Namespace::Synthesis, &key, &synthesis)?;

        if consolidate {
            let paths: Vec<PathBuf> = findings.into_iter().map(|(path, _)| path).collect();
            let moved = self.pending.archive(&paths)?;
            debug!("Archived {} findings", moved);
        }

        info!("Phase synthesis completed ({} findings)", synthesis.finding_count);
        Ok(Outcome::Produced {
            namespace: Namespace::Synthesis,
            key,
            inputs: synthesis.finding_count,
        })
    }

    fn finalize(
        &self,
        session_id: &str,
        output: Option<&Path>,
        format: ReportFormat,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        validate_key(session_id)?;

        let mut items: Vec<Contribution> = Vec::new();
        for value in self.queue.cached(Namespace::Synthesis) {
            match Contribution::from_value(value) {
                Ok(contribution) => items.push(contribution),
                Err(e) => warn!("Skipping malformed cached synthesis: {}", e),
            }
        }
        items.extend(
            self.pending
                .findings()
                .iter()
                .map(|(_, f)| Contribution::from(f)),
        );

        if items.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::NothingToSynthesize));
        }

        let aggregate = self.aggregator.aggregate(&items);
        let recommendations =
            generate_recommendations(&aggregate.patterns, &aggregate.issues, &aggregate.solutions);
        let synthesis = FinalSynthesis {
            kind: SynthesisKind::Final,
            session_id: session_id.to_string(),
            timestamp: now,
            total_items: items.len(),
            task_ids: distinct_task_ids(&items),
            patterns: aggregate.patterns,
            issues: aggregate.issues,
            solutions: aggregate.solutions,
            recommendations,
            confidence: aggregate.confidence,
            summary: generate_summary_text(&items),
        };

        let key = format!("session_{}_final", session_id);
        self.persist(Namespace::Synthesis, &key, &synthesis)?;
        self.persist(Namespace::Recommendations, session_id, &synthesis.recommendations)?;
        self.persist(
            Namespace::Patterns,
            &format!("session_{}", session_id),
            &synthesis.patterns,
        )?;

        if let Some(path) = output {
            write_report(&synthesis, path, format)?;
            info!("Final synthesis written to {}", path.display());
        }

        info!(
            "Final synthesis for session {}: {} items, {} recommendations, {} patterns",
            session_id,
            synthesis.total_items,
            synthesis.recommendations.len(),
            synthesis.patterns.len()
        );

        Ok(Outcome::Produced {
            namespace: Namespace::Synthesis,
            key,
            inputs: synthesis.total_items,
        })
    }
}

/// `<prefix>_<YYYYMMDD_HHMMSS>`.
fn batch_key(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", prefix, now.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FinalSynthesis, Finding, QueueEntry, Tier};
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = "Found pattern: retry loop\nError: timeout\nFixed: added backoff";

    fn controller(root: &Path, store_enabled: bool) -> HorizonController {
        let mut config = Config::default();
        config.general.temp_dir = root.to_path_buf();
        config.store.enabled = store_enabled;
        HorizonController::new(&config)
    }

    fn capture(root: &Path, task_id: &str, raw: &str) {
        let agents = root.join("agents");
        fs::create_dir_all(&agents).unwrap();
        fs::write(agents.join(format!("raw_{}.txt", task_id)), raw).unwrap();
    }

    fn fallback_doc(root: &Path, namespace: &str, key: &str) -> Value {
        let path = root
            .join("store_fallback")
            .join(namespace)
            .join(format!("{}.json", key));
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn produced_key(outcome: &Outcome) -> String {
        match outcome {
            Outcome::Produced { key, .. } => key.clone(),
            other => panic!("expected a produced outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_immediate_writes_finding_and_queues_it() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon = controller(root, true);
        capture(root, "t1", SAMPLE);

        let outcome = horizon.synthesize_immediate("t1");
        assert_eq!(
            outcome,
            Outcome::Produced {
                namespace: Namespace::Findings,
                key: "t1".to_string(),
                inputs: 1,
            }
        );

        let stored: Finding =
            serde_json::from_str(&fs::read_to_string(root.join("findings/t1.json")).unwrap())
                .unwrap();
        assert_eq!(stored.patterns.len(), 1);
        assert_eq!(stored.issues.len(), 1);
        assert_eq!(stored.solutions.len(), 1);
        assert_eq!(horizon.pending().pending_count().unwrap(), 1);

        let queued: Vec<QueueEntry> = fs::read_to_string(horizon.queue().queue_path())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].namespace, Namespace::Findings);
        assert_eq!(queued[0].key, "t1");
    }

    #[test]
    fn test_immediate_without_signal_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon = controller(root, true);

        assert_eq!(
            horizon.synthesize_immediate("missing"),
            Outcome::Skipped(SkipReason::NoRawOutput)
        );

        capture(root, "empty", "");
        assert_eq!(
            horizon.synthesize_immediate("empty"),
            Outcome::Skipped(SkipReason::NoSignal)
        );

        assert!(!root.join("findings").join("empty.json").exists());
        assert!(!horizon.queue().queue_path().exists());
        assert_eq!(horizon.pending().pending_count().unwrap(), 0);
    }

    #[test]
    fn test_incremental_fires_at_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon = controller(root, false);

        for id in ["t1", "t2"] {
            capture(root, id, SAMPLE);
            horizon.synthesize_immediate(id);
        }
        assert_eq!(
            horizon.synthesize_incremental(Some("agent-7")),
            Outcome::Skipped(SkipReason::BelowThreshold {
                pending: 2,
                threshold: 3
            })
        );
        assert_eq!(horizon.pending().pending_count().unwrap(), 2);

        capture(root, "t3", SAMPLE);
        horizon.synthesize_immediate("t3");

        let outcome = horizon.synthesize_incremental(Some("agent-7"));
        let key = produced_key(&outcome);
        assert!(key.starts_with("incremental_"));
        assert_eq!(key.len(), "incremental_20260101_120000".len());

        let doc = fallback_doc(root, "synthesis", &key);
        assert_eq!(doc["type"], "incremental");
        assert_eq!(doc["item_count"], 3);
        assert_eq!(doc["agent_id"], "agent-7");
        assert_eq!(doc["patterns"].as_array().unwrap().len(), 1);
        assert_eq!(doc["patterns"][0]["pattern"], "Found pattern: retry loop");
        assert_eq!(doc["patterns"][0]["frequency"], 3);
        assert_eq!(doc["patterns"][0]["confidence"], "high");

        assert_eq!(horizon.pending().pending_count().unwrap(), 0);
        // Finding files stay for the phase horizon.
        assert_eq!(horizon.pending().findings().len(), 3);
    }

    #[test]
    fn test_incremental_consumes_every_pending_entry() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon = controller(root, false);

        for n in 0..5 {
            let id = format!("t{}", n);
            capture(root, &id, SAMPLE);
            horizon.synthesize_immediate(&id);
        }

        let outcome = horizon.synthesize_incremental(None);
        match outcome {
            Outcome::Produced { inputs, .. } => assert_eq!(inputs, 5),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(horizon.pending().pending_count().unwrap(), 0);
        assert!(matches!(
            horizon.synthesize_incremental(None),
            Outcome::Skipped(_)
        ));
    }

    #[test]
    fn test_incremental_recovers_abandoned_batch() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon = controller(root, false);

        for id in ["t1", "t2", "t3"] {
            capture(root, id, SAMPLE);
            horizon.synthesize_immediate(id);
        }

        // A run killed by its timeout after claiming the batch.
        let _abandoned = horizon.pending().claim().unwrap().unwrap();
        assert_eq!(
            horizon.synthesize_incremental(None),
            Outcome::Skipped(SkipReason::BelowThreshold {
                pending: 0,
                threshold: 3
            })
        );

        let later = Utc::now() + Duration::minutes(5);
        match horizon.incremental(None, later).unwrap() {
            Outcome::Produced { inputs, .. } => assert_eq!(inputs, 3),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(horizon.pending().pending_count().unwrap(), 0);
    }

    #[test]
    fn test_phase_rerun_double_counts_in_final() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon = controller(root, false);

        for id in ["t1", "t2", "t3"] {
            capture(root, id, SAMPLE);
            horizon.synthesize_immediate(id);
        }

        let first = Utc::now();
        let second = first + Duration::seconds(1);
        let key_a = produced_key(&horizon.phase(false, first).unwrap());
        let key_b = produced_key(&horizon.phase(false, second).unwrap());
        assert_ne!(key_a, key_b);

        // Both phase docs describe the same three findings.
        for key in [&key_a, &key_b] {
            let doc = fallback_doc(root, "synthesis", key);
            assert_eq!(doc["finding_count"], 3);
            assert_eq!(doc["patterns"][0]["frequency"], 3);
        }

        horizon.synthesize_final("s5", None, ReportFormat::Json);
        let doc: FinalSynthesis =
            serde_json::from_value(fallback_doc(root, "synthesis", "session_s5_final")).unwrap();

        // Two phase docs plus the three findings still pending.
        assert_eq!(doc.total_items, 5);
        assert_eq!(doc.task_ids, vec!["t1", "t2", "t3"]);
        assert_eq!(doc.patterns[0].frequency, 5);
        assert_eq!(doc.issues[0].frequency, 5);
        assert_eq!(doc.solutions[0].occurrences, 5);
    }

    #[test]
    fn test_phase_with_and_without_consolidation() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon = controller(root, false);

        assert_eq!(
            horizon.synthesize_phase(true),
            Outcome::Skipped(SkipReason::NoPendingFindings)
        );

        for id in ["a", "b"] {
            capture(root, id, SAMPLE);
            horizon.synthesize_immediate(id);
        }

        let key = produced_key(&horizon.synthesize_phase(false));
        assert!(key.starts_with("phase_"));
        assert_eq!(horizon.pending().findings().len(), 2);

        let doc = fallback_doc(root, "synthesis", &key);
        assert_eq!(doc["type"], "phase");
        assert_eq!(doc["finding_count"], 2);
        assert_eq!(doc["task_ids"], serde_json::json!(["a", "b"]));
        assert_eq!(doc["patterns"][0]["confidence"], "medium");
        assert!((doc["confidence"].as_f64().unwrap() - 0.7).abs() < 1e-9);

        assert!(horizon.synthesize_phase(true).is_produced());
        assert!(horizon.pending().findings().is_empty());
        assert!(root.join("archived_phases").join("a.json").exists());
        assert!(root.join("archived_phases").join("b.json").exists());
    }

    #[test]
    fn test_final_confidence_without_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon = controller(root, false);

        let outputs = [
            ("t1", "Error: disk full"),
            ("t2", "Error: disk full"),
            ("t3", "Error: disk full"),
            ("t4", "Fixed: rotated logs"),
            ("t5", "Fixed: rotated logs"),
        ];
        for (id, raw) in outputs {
            capture(root, id, raw);
            assert!(horizon.synthesize_immediate(id).is_produced());
        }

        let outcome = horizon.synthesize_final("s1", None, ReportFormat::Json);
        assert_eq!(produced_key(&outcome), "session_s1_final");

        let doc: FinalSynthesis =
            serde_json::from_value(fallback_doc(root, "synthesis", "session_s1_final")).unwrap();
        assert_eq!(doc.total_items, 5);
        assert!((doc.confidence - 0.8).abs() < 1e-9);
        assert!(doc.patterns.is_empty());
        assert_eq!(doc.issues[0].severity, Tier::High);
        assert_eq!(doc.recommendations.len(), 2);
        assert_eq!(doc.recommendations[0].action, "Address recurring issue: Error: disk full");
        assert_eq!(doc.recommendations[1].action, "Implement solution: Fixed: rotated logs");
        assert_eq!(
            doc.summary,
            "Processed 5 findings from 5 tasks. Identified 0 patterns and 2 solutions."
        );

        let recommendations = fallback_doc(root, "recommendations", "s1");
        assert_eq!(recommendations.as_array().unwrap().len(), 2);
        assert!(fallback_doc(root, "patterns", "session_s1").is_array());

        // Final is read-only over pending findings.
        assert_eq!(horizon.pending().findings().len(), 5);
    }

    #[test]
    fn test_final_reads_cached_syntheses() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon = controller(root, false);

        for id in ["a", "b", "c"] {
            capture(root, id, SAMPLE);
            horizon.synthesize_immediate(id);
        }
        assert!(horizon.synthesize_phase(true).is_produced());

        let output = root.join("out").join("final.md");
        let outcome = horizon.synthesize_final("s2", Some(&output), ReportFormat::Markdown);
        match outcome {
            Outcome::Produced { inputs, .. } => assert_eq!(inputs, 1),
            other => panic!("unexpected outcome {:?}", other),
        }

        let markdown = fs::read_to_string(&output).unwrap();
        assert!(markdown.contains("`s2`"));
        // One cached phase synthesis: its pattern no longer recurs, its
        // solution is still listed.
        assert!(markdown.contains("No pattern recurred"));
        assert!(markdown.contains("Fixed: added backoff"));
    }

    #[test]
    fn test_final_with_nothing_is_a_noop() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon = controller(root, true);

        assert_eq!(
            horizon.synthesize_final("s3", None, ReportFormat::Json),
            Outcome::Skipped(SkipReason::NothingToSynthesize)
        );
        assert!(!horizon.queue().queue_path().exists());
    }

    #[test]
    fn test_failures_go_to_error_log() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon = controller(root, true);

        let outcome = horizon.synthesize_final("../escape", None, ReportFormat::Json);
        assert!(matches!(outcome, Outcome::Failed(_)));

        // A file where the findings directory should be breaks the write.
        capture(root, "t1", SAMPLE);
        fs::write(root.join("findings"), "not a directory").unwrap();
        let outcome = horizon.synthesize_immediate("t1");
        assert!(matches!(outcome, Outcome::Failed(_)));

        let log = fs::read_to_string(horizon.error_log().path()).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Final synthesis failed"));
        assert!(lines[1].contains("Immediate synthesis failed for t1"));
    }

    #[test]
    fn test_custom_classifier() {
        use crate::extract::{Bucket, Classifier};

        struct TodoClassifier;

        impl Classifier for TodoClassifier {
            fn classify(&self, line: &str) -> Bucket {
                if line.starts_with("TODO") {
                    Bucket::Issue
                } else {
                    Bucket::None
                }
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let horizon =
            controller(root, false).with_extractor(Extractor::with_classifier(TodoClassifier));

        capture(root, "t1", SAMPLE);
        assert_eq!(
            horizon.synthesize_immediate("t1"),
            Outcome::Skipped(SkipReason::NoSignal)
        );

        capture(root, "t2", "TODO wire retries\nFound pattern: ignored");
        assert!(horizon.synthesize_immediate("t2").is_produced());
        let stored = fallback_doc(root, "findings", "t2");
        assert_eq!(stored["issues"][0]["content"], "TODO wire retries");
        assert!(stored["patterns"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_recall_patterns_uses_fresh_cache() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let mut horizon = controller(root, false);

        for id in ["a", "b", "c"] {
            capture(root, id, SAMPLE);
            horizon.synthesize_immediate(id);
        }
        horizon.synthesize_final("s4", None, ReportFormat::Json);

        let now = Utc::now();
        let recalled = horizon.recall_patterns("session_s4", now).unwrap();
        assert_eq!(recalled[0]["pattern"], "Found pattern: retry loop");

        fs::remove_file(
            root.join("store_fallback")
                .join("patterns")
                .join("session_s4.json"),
        )
        .unwrap();

        assert_eq!(
            horizon.recall_patterns("session_s4", now + Duration::seconds(60)),
            Some(recalled)
        );
        assert_eq!(
            horizon.recall_patterns("session_s4", now + Duration::seconds(601)),
            None
        );
    }
}
