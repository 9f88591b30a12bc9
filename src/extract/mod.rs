//! Finding extraction from raw task output.
//!
//! Extraction is heuristic: every line is classified independently and
//! matched lines become entries of the finding.

pub mod classifier;

pub use classifier::{Bucket, Classifier, KeywordClassifier};

use crate::config::ExtractorConfig;
use crate::models::{Entry, EntryTag, Finding, Insights};
use chrono::{DateTime, Utc};

/// Turns raw task output into findings.
pub struct Extractor {
    classifier: Box<dyn Classifier + Send + Sync>,
    max_content_chars: usize,
    max_summary_chars: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::from(&ExtractorConfig::default())
    }
}

impl From<&ExtractorConfig> for Extractor {
    fn from(config: &ExtractorConfig) -> Self {
        Self {
            classifier: Box::new(KeywordClassifier::from(config)),
            max_content_chars: config.max_content_chars,
            max_summary_chars: config.max_summary_chars,
        }
    }
}

impl Extractor {
    /// Create an extractor around a custom classifier with default limits.
    #[cfg(test)]
    pub fn with_classifier(classifier: impl Classifier + Send + Sync + 'static) -> Self {
        let defaults = ExtractorConfig::default();
        Self {
            classifier: Box::new(classifier),
            max_content_chars: defaults.max_content_chars,
            max_summary_chars: defaults.max_summary_chars,
        }
    }

    /// Extract a finding stamped with the current time.
    pub fn extract(&self, raw: &str, task_id: &str) -> Option<Finding> {
        self.extract_at(raw, task_id, Utc::now())
    }

    /// Extract a finding stamped with `timestamp`.
    ///
    /// Returns `None` when no line carries a signal.
    pub fn extract_at(&self, raw: &str, task_id: &str, timestamp: DateTime<Utc>) -> Option<Finding> {
        let mut patterns = Vec::new();
        let mut issues = Vec::new();
        let mut solutions = Vec::new();

        for line in raw.split('\n') {
            let (bucket, tag) = match self.classifier.classify(line) {
                Bucket::Pattern => (&mut patterns, EntryTag::Detected),
                Bucket::Issue => (&mut issues, EntryTag::Identified),
                Bucket::Solution => (&mut solutions, EntryTag::Applied),
                Bucket::None => continue,
            };

            bucket.push(Entry {
                tag,
                content: truncate_chars(line.trim(), self.max_content_chars),
            });
        }

        let finding = Finding {
            task_id: task_id.to_string(),
            timestamp,
            patterns,
            issues,
            solutions,
            insights: Insights {
                summary: truncate_chars(raw, self.max_summary_chars),
                length: raw.chars().count(),
            },
        };

        finding.has_signal().then_some(finding)
    }
}

/// Returns the first `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = "Found pattern: retry loop\nError: timeout\nFixed: added backoff";

    #[test]
    fn test_extract_sample_output() {
        let finding = Extractor::default().extract(SAMPLE, "t1").unwrap();

        assert_eq!(finding.task_id, "t1");
        assert_eq!(finding.patterns.len(), 1);
        assert_eq!(finding.patterns[0].content, "Found pattern: retry loop");
        assert_eq!(finding.patterns[0].tag, EntryTag::Detected);
        assert_eq!(finding.issues.len(), 1);
        assert_eq!(finding.issues[0].content, "Error: timeout");
        assert_eq!(finding.solutions.len(), 1);
        assert_eq!(finding.solutions[0].content, "Fixed: added backoff");
        assert_eq!(finding.insights.length, SAMPLE.len());
        assert_eq!(finding.insights.summary, SAMPLE);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let extractor = Extractor::default();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let a = extractor.extract_at(SAMPLE, "t1", at).unwrap();
        let b = extractor.extract_at(SAMPLE, "t1", at).unwrap();

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_extract_returns_none_without_signal() {
        let extractor = Extractor::default();
        assert!(extractor.extract("", "t1").is_none());
        assert!(extractor.extract("compiled ok\nall tests passed", "t1").is_none());
    }

    #[test]
    fn test_line_filed_once_by_priority() {
        let finding = Extractor::default()
            .extract("Identified warning in config loader", "t2")
            .unwrap();
        assert_eq!(finding.patterns.len(), 1);
        assert!(finding.issues.is_empty());
        assert!(finding.solutions.is_empty());
    }

    #[test]
    fn test_content_and_summary_truncation() {
        let long_line = format!("error {}", "x".repeat(400));
        let finding = Extractor::default().extract(&long_line, "t3").unwrap();

        assert_eq!(finding.issues[0].content.chars().count(), 200);
        assert_eq!(finding.insights.summary.chars().count(), 406);
        assert_eq!(finding.insights.length, 406);

        let very_long = format!("problem {}", "é".repeat(600));
        let finding = Extractor::default().extract(&very_long, "t4").unwrap();
        assert_eq!(finding.insights.summary.chars().count(), 500);
        assert_eq!(finding.insights.length, 608);
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    struct ShoutClassifier;

    impl Classifier for ShoutClassifier {
        fn classify(&self, line: &str) -> Bucket {
            if !line.is_empty() && line == line.to_uppercase() {
                Bucket::Issue
            } else {
                Bucket::None
            }
        }
    }

    #[test]
    fn test_custom_classifier() {
        let extractor = Extractor::with_classifier(ShoutClassifier);
        let finding = extractor.extract("quiet line\nLOUD LINE", "t5").unwrap();
        assert_eq!(finding.issues.len(), 1);
        assert_eq!(finding.issues[0].content, "LOUD LINE");
        assert!(finding.patterns.is_empty());
    }
}
