//! Final synthesis report generation.
//!
//! This module renders a final synthesis either verbatim as JSON or as a
//! Markdown report for people reading the session results.

use crate::error::{Result, SynthesisError};
use crate::models::{FinalSynthesis, IssueGroup, PatternGroup, Recommendation, SolutionGroup, Tier};
use crate::store::write_atomic;
use std::path::Path;

/// Output format for the final synthesis file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    /// JSON document (default)
    #[default]
    Json,
    /// Markdown report
    Markdown,
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(synthesis: &FinalSynthesis) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Session Synthesis Report\n\n");

    output.push_str(&generate_metadata_section(synthesis));
    output.push_str(&generate_summary_section(&synthesis.summary));
    output.push_str(&generate_patterns_section(&synthesis.patterns));
    output.push_str(&generate_issues_section(&synthesis.issues));
    output.push_str(&generate_solutions_section(&synthesis.solutions));
    output.push_str(&generate_recommendations_section(&synthesis.recommendations));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(synthesis: &FinalSynthesis) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Session:** `{}`\n", synthesis.session_id));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        synthesis.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Items Synthesized:** {}\n", synthesis.total_items));
    section.push_str(&format!("- **Tasks:** {}\n", synthesis.task_ids.len()));
    section.push_str(&format!("- **Confidence:** {:.2}\n", synthesis.confidence));
    section.push('\n');

    section
}

/// Generate the summary section.
fn generate_summary_section(summary: &str) -> String {
    if summary.is_empty() {
        return String::new();
    }

    format!("## Summary\n\n{}\n\n", summary)
}

fn tier_badge(tier: Tier) -> &'static str {
    match tier {
        Tier::High => "**HIGH**",
        Tier::Medium => "MEDIUM",
    }
}

/// Markdown table cells cannot contain raw pipes or newlines.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Generate the recurring patterns section.
fn generate_patterns_section(patterns: &[PatternGroup]) -> String {
    let mut section = String::new();

    section.push_str("## Recurring Patterns\n\n");
    if patterns.is_empty() {
        section.push_str("No pattern recurred across the synthesized items.\n\n");
        return section;
    }

    section.push_str("| Pattern | Frequency | Confidence |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for pattern in patterns {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            escape_cell(&pattern.pattern),
            pattern.frequency,
            tier_badge(pattern.confidence)
        ));
    }
    section.push('\n');

    section
}

/// Generate the recurring issues section.
fn generate_issues_section(issues: &[IssueGroup]) -> String {
    let mut section = String::new();

    section.push_str("## Recurring Issues\n\n");
    if issues.is_empty() {
        section.push_str("No issue recurred across the synthesized items.\n\n");
        return section;
    }

    section.push_str("| Issue | Frequency | Severity |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for issue in issues {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            escape_cell(&issue.issue),
            issue.frequency,
            tier_badge(issue.severity)
        ));
    }
    section.push('\n');

    section
}

/// Generate the solutions section.
fn generate_solutions_section(solutions: &[SolutionGroup]) -> String {
    if solutions.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Solutions\n\n");
    section.push_str("| Solution | Occurrences | Confidence |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for solution in solutions {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            escape_cell(&solution.solution),
            solution.occurrences,
            tier_badge(solution.confidence)
        ));
    }
    section.push('\n');

    section
}

/// Generate the recommendations section.
fn generate_recommendations_section(recommendations: &[Recommendation]) -> String {
    if recommendations.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Recommendations\n\n");
    for (i, rec) in recommendations.iter().enumerate() {
        section.push_str(&format!("{}. [{}] {}\n", i + 1, rec.priority, rec.action));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by findsynth*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(synthesis: &FinalSynthesis) -> Result<String> {
    serde_json::to_string_pretty(synthesis).map_err(|e| SynthesisError::Encode {
        what: format!("final synthesis for session {}", synthesis.session_id),
        source: e,
    })
}

/// Write the report to a file as one whole document.
pub fn write_report(synthesis: &FinalSynthesis, path: &Path, format: ReportFormat) -> Result<()> {
    let content = match format {
        ReportFormat::Json => generate_json_report(synthesis)?,
        ReportFormat::Markdown => generate_markdown_report(synthesis),
    };

    write_atomic(path, &content)
}
