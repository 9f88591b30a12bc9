//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::report::ReportFormat;
use clap::Parser;
use std::path::PathBuf;

/// findsynth - multi-horizon synthesis of worker task findings
///
/// Turns raw task output into findings, consolidates them in batches, at
/// phase boundaries and at session end, and queues every result for the
/// external memory store without blocking the caller.
///
/// Examples:
///   findsynth --mode immediate --task-id task-42
///   findsynth --mode incremental --agent-id reviewer
///   findsynth --mode phase --consolidate
///   findsynth --mode final --session-id s1 --output final.json
///   findsynth --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Synthesis horizon to run
    #[arg(long, default_value = "immediate", value_name = "MODE")]
    pub mode: Mode,

    /// Task id for immediate synthesis
    #[arg(long, value_name = "ID")]
    pub task_id: Option<String>,

    /// Agent id recorded on incremental syntheses
    #[arg(long, value_name = "ID")]
    pub agent_id: Option<String>,

    /// Session id for final synthesis
    #[arg(long, value_name = "ID")]
    pub session_id: Option<String>,

    /// Pattern key to recall (recall mode)
    #[arg(long, value_name = "KEY")]
    pub key: Option<String>,

    /// Session working directory
    ///
    /// Holds raw captures, pending findings, the store queue and logs.
    #[arg(long, value_name = "DIR", env = "FINDSYNTH_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Write documents locally instead of queueing them for the external store
    #[arg(long)]
    pub no_store: bool,

    /// Archive pending findings after a phase synthesis
    #[arg(long)]
    pub consolidate: bool,

    /// Also write the final synthesis to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Format of the --output file (json, markdown)
    #[arg(long, default_value = "json", value_name = "FORMAT")]
    pub format: ReportFormat,

    /// Pending entries needed before an incremental synthesis fires
    #[arg(long, value_name = "COUNT")]
    pub threshold: Option<usize>,

    /// Upper bound for the operation in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .findsynth.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .findsynth.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Synthesis horizon selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Mode {
    /// Extract one task's finding (default)
    #[default]
    Immediate,
    /// Aggregate the pending batch once it is large enough
    Incremental,
    /// Aggregate every pending finding at a phase boundary
    Phase,
    /// Aggregate the whole session
    Final,
    /// Print stored patterns for a key
    Recall,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match self.mode {
            Mode::Immediate if self.task_id.is_none() => {
                return Err("Mode 'immediate' requires --task-id".to_string());
            }
            Mode::Final if self.session_id.is_none() => {
                return Err("Mode 'final' requires --session-id".to_string());
            }
            Mode::Recall if self.key.is_none() => {
                return Err("Mode 'recall' requires --key".to_string());
            }
            _ => {}
        }

        if self.threshold == Some(0) {
            return Err("Threshold must be at least 1".to_string());
        }

        if self.timeout_ms == Some(0) {
            return Err("Timeout must be at least 1 millisecond".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
