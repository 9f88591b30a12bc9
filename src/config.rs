//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.findsynth.toml` files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".findsynth.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Aggregation settings.
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Extraction settings.
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// External store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Session working directory shared by all horizon runs.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Upper bound for a single horizon operation, in milliseconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            verbose: false,
            operation_timeout_ms: default_operation_timeout(),
        }
    }
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("/tmp/findsynth_session")
}

fn default_operation_timeout() -> u64 {
    5000
}

/// How aggregated entries are keyed for deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Leading characters of the content, compared exactly.
    #[default]
    Prefix,
    /// The whole content, compared exactly.
    FullContent,
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Pending entries needed before an incremental synthesis fires.
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,

    /// Deduplication strategy for patterns, issues and solutions.
    #[serde(default)]
    pub key_strategy: KeyStrategy,

    /// Prefix length for pattern and issue keys.
    #[serde(default = "default_pattern_key_len")]
    pub pattern_key_len: usize,

    /// Prefix length for solution keys.
    #[serde(default = "default_solution_key_len")]
    pub solution_key_len: usize,

    /// Maximum ranked patterns and solutions kept per synthesis.
    #[serde(default = "default_max_ranked")]
    pub max_ranked: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            batch_threshold: default_batch_threshold(),
            key_strategy: KeyStrategy::default(),
            pattern_key_len: default_pattern_key_len(),
            solution_key_len: default_solution_key_len(),
            max_ranked: default_max_ranked(),
        }
    }
}

fn default_batch_threshold() -> usize {
    3
}

fn default_pattern_key_len() -> usize {
    50
}

fn default_solution_key_len() -> usize {
    30
}

fn default_max_ranked() -> usize {
    10
}

/// Finding extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Keywords that mark a line as a pattern.
    #[serde(default = "default_pattern_keywords")]
    pub pattern_keywords: Vec<String>,

    /// Keywords that mark a line as an issue.
    #[serde(default = "default_issue_keywords")]
    pub issue_keywords: Vec<String>,

    /// Keywords that mark a line as a solution.
    #[serde(default = "default_solution_keywords")]
    pub solution_keywords: Vec<String>,

    /// Maximum characters kept per entry.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Maximum characters of raw output kept as the summary insight.
    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            pattern_keywords: default_pattern_keywords(),
            issue_keywords: default_issue_keywords(),
            solution_keywords: default_solution_keywords(),
            max_content_chars: default_max_content_chars(),
            max_summary_chars: default_max_summary_chars(),
        }
    }
}

fn default_pattern_keywords() -> Vec<String> {
    vec!["pattern", "found", "detected", "identified"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_issue_keywords() -> Vec<String> {
    vec!["error", "issue", "problem", "warning"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_solution_keywords() -> Vec<String> {
    vec!["fixed", "resolved", "solution", "implemented"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_content_chars() -> usize {
    200
}

fn default_max_summary_chars() -> usize {
    500
}

/// External memory store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Queue records for the external store. When false, documents are
    /// written synchronously to the local fallback directory.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How long recalled context stays fresh, in seconds.
    #[serde(default = "default_context_ttl")]
    pub context_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            context_ttl_seconds: default_context_ttl(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_context_ttl() -> u64 {
    600
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref temp_dir) = args.temp_dir {
            self.general.temp_dir = temp_dir.clone();
        }

        if let Some(threshold) = args.threshold {
            self.synthesis.batch_threshold = threshold;
        }

        if let Some(timeout) = args.timeout_ms {
            self.general.operation_timeout_ms = timeout;
        }

        if args.no_store {
            self.store.enabled = false;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Reject settings that would make every run a no-op or a timeout.
    ///
    /// Call after [`merge_with_args`](Self::merge_with_args) so file values
    /// get the same checks as command-line ones.
    pub fn validate(&self) -> Result<()> {
        if self.synthesis.batch_threshold == 0 {
            bail!("synthesis.batch_threshold must be at least 1");
        }

        if self.general.operation_timeout_ms == 0 {
            bail!("general.operation_timeout_ms must be at least 1");
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
