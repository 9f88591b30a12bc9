//! Line classification for extracted findings.

use crate::config::ExtractorConfig;

/// Bucket a single line of task output falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Pattern,
    Issue,
    Solution,
    None,
}

/// Assigns a line of task output to at most one bucket.
pub trait Classifier {
    fn classify(&self, line: &str) -> Bucket;
}

/// Case-insensitive keyword membership, checked pattern, issue, solution.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    pattern_keywords: Vec<String>,
    issue_keywords: Vec<String>,
    solution_keywords: Vec<String>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::from(&ExtractorConfig::default())
    }
}

impl From<&ExtractorConfig> for KeywordClassifier {
    fn from(config: &ExtractorConfig) -> Self {
        Self::new(
            config.pattern_keywords.clone(),
            config.issue_keywords.clone(),
            config.solution_keywords.clone(),
        )
    }
}

impl KeywordClassifier {
    /// Create a classifier from keyword lists. Keywords are lowercased.
    pub fn new(patterns: Vec<String>, issues: Vec<String>, solutions: Vec<String>) -> Self {
        let lower = |words: Vec<String>| -> Vec<String> {
            words
                .into_iter()
                .map(|w| w.to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };

        Self {
            pattern_keywords: lower(patterns),
            issue_keywords: lower(issues),
            solution_keywords: lower(solutions),
        }
    }

    fn contains_any(line: &str, keywords: &[String]) -> bool {
        keywords.iter().any(|k| line.contains(k.as_str()))
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, line: &str) -> Bucket {
        let lower = line.to_lowercase();

        if Self::contains_any(&lower, &self.pattern_keywords) {
            Bucket::Pattern
        } else if Self::contains_any(&lower, &self.issue_keywords) {
            Bucket::Issue
        } else if Self::contains_any(&lower, &self.solution_keywords) {
            Bucket::Solution
        } else {
            Bucket::None
        }
    }
}
