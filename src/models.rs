//! Data models for the findings pipeline.
//!
//! This module contains the structures shared by every horizon: findings
//! extracted from task output, the aggregated groups built from them, the
//! three synthesis documents, and persistence queue records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Tag attached to a single extracted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryTag {
    /// A recognised pattern.
    Detected,
    /// A reported issue.
    Identified,
    /// An applied solution.
    Applied,
}

/// One classified line of task output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "type")]
    pub tag: EntryTag,
    /// Trimmed line, at most 200 characters.
    pub content: String,
}

/// Coarse facts about the raw output a finding was extracted from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insights {
    /// Leading slice of the raw output.
    pub summary: String,
    /// Character count of the raw output.
    pub length: usize,
}

/// Structured contribution of a single worker task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier of the worker invocation that produced the output.
    pub task_id: String,
    /// Extraction instant.
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub patterns: Vec<Entry>,
    #[serde(default)]
    pub issues: Vec<Entry>,
    #[serde(default)]
    pub solutions: Vec<Entry>,
    #[serde(default)]
    pub insights: Insights,
}

impl Finding {
    /// Returns true if the finding carries at least one signal.
    pub fn has_signal(&self) -> bool {
        !(self.patterns.is_empty() && self.issues.is_empty() && self.solutions.is_empty())
    }
}

/// Recurrence tier of an aggregated group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Medium,
    High,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Medium => write!(f, "medium"),
            Tier::High => write!(f, "high"),
        }
    }
}

/// A pattern that recurred across inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternGroup {
    pub pattern: String,
    pub frequency: usize,
    pub confidence: Tier,
}

/// An issue that recurred across inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueGroup {
    pub issue: String,
    pub frequency: usize,
    pub severity: Tier,
}

/// A group of similar solutions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionGroup {
    pub solution: String,
    pub occurrences: usize,
    pub confidence: Tier,
}

/// What a recommendation was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    Pattern,
    Issue,
    Solution,
}

/// Priority of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Medium => write!(f, "Medium"),
            Priority::High => write!(f, "High"),
        }
    }
}

/// An actionable item derived from a final synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub priority: Priority,
    pub action: String,
}

/// Horizon that produced a synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisKind {
    Incremental,
    Phase,
    Final,
}

/// Batch synthesis over the pending log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalSynthesis {
    #[serde(rename = "type")]
    pub kind: SynthesisKind,
    pub timestamp: DateTime<Utc>,
    pub item_count: usize,
    /// Agent whose completion triggered the batch, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub patterns: Vec<PatternGroup>,
    pub issues: Vec<IssueGroup>,
    pub solutions: Vec<SolutionGroup>,
}

/// Synthesis over every finding pending at a phase boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSynthesis {
    #[serde(rename = "type")]
    pub kind: SynthesisKind,
    pub timestamp: DateTime<Utc>,
    pub finding_count: usize,
    pub task_ids: Vec<String>,
    pub patterns: Vec<PatternGroup>,
    pub issues: Vec<IssueGroup>,
    pub solutions: Vec<SolutionGroup>,
    pub confidence: f64,
}

/// Session-wide synthesis with recommendations and a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSynthesis {
    #[serde(rename = "type")]
    pub kind: SynthesisKind,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub total_items: usize,
    pub task_ids: Vec<String>,
    pub patterns: Vec<PatternGroup>,
    pub issues: Vec<IssueGroup>,
    pub solutions: Vec<SolutionGroup>,
    pub recommendations: Vec<Recommendation>,
    pub confidence: f64,
    pub summary: String,
}

/// A content-bearing record as seen by the aggregator.
///
/// Findings expose `content`; syntheses expose their group key under
/// `pattern`, `issue` or `solution`. Both read into the same field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, alias = "pattern", alias = "issue", alias = "solution")]
    pub content: String,
}

impl From<&Entry> for Record {
    fn from(entry: &Entry) -> Self {
        Self {
            content: entry.content.clone(),
        }
    }
}

/// Uniform view over a finding or a lower-horizon synthesis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub patterns: Vec<Record>,
    #[serde(default)]
    pub issues: Vec<Record>,
    #[serde(default)]
    pub solutions: Vec<Record>,
}

impl From<&Finding> for Contribution {
    fn from(finding: &Finding) -> Self {
        Self {
            task_id: Some(finding.task_id.clone()),
            patterns: finding.patterns.iter().map(Record::from).collect(),
            issues: finding.issues.iter().map(Record::from).collect(),
            solutions: finding.solutions.iter().map(Record::from).collect(),
        }
    }
}

impl Contribution {
    /// Reads a stored JSON document, ignoring fields the aggregator does not use.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// Namespace of the external memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Findings,
    Synthesis,
    Recommendations,
    Patterns,
}

impl Namespace {
    /// Directory / wire name of the namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Findings => "findings",
            Namespace::Synthesis => "synthesis",
            Namespace::Recommendations => "recommendations",
            Namespace::Patterns => "patterns",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the persistence queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub timestamp: DateTime<Utc>,
    pub namespace: Namespace,
    pub key: String,
    pub data: Value,
}
