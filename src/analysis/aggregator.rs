//! Recurrence aggregation and statistics.
//!
//! This module groups the entries of findings (or lower-horizon syntheses)
//! by a deduplication key, ranks the groups by how often they recur, and
//! derives confidence scores, recommendations and summaries from them.

use crate::config::{KeyStrategy, SynthesisConfig};
use crate::models::{
    Contribution, IssueGroup, PatternGroup, Priority, Recommendation, RecommendationKind, Record,
    SolutionGroup, Tier,
};
use std::collections::{HashMap, HashSet};

/// Groups kept per recommendation kind.
const RECOMMENDATIONS_PER_KIND: usize = 3;

/// Result of aggregating a set of contributions.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub patterns: Vec<PatternGroup>,
    pub issues: Vec<IssueGroup>,
    pub solutions: Vec<SolutionGroup>,
    pub confidence: f64,
}

/// Groups and ranks findings.
///
/// The default key is the first 50 characters of an entry (30 for
/// solutions), compared exactly. Entries that share that prefix are merged
/// even if they diverge later; differently phrased duplicates are not.
#[derive(Debug, Clone)]
pub struct Aggregator {
    strategy: KeyStrategy,
    pattern_key_len: usize,
    solution_key_len: usize,
    max_ranked: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::from(&SynthesisConfig::default())
    }
}

impl From<&SynthesisConfig> for Aggregator {
    fn from(config: &SynthesisConfig) -> Self {
        Self {
            strategy: config.key_strategy,
            pattern_key_len: config.pattern_key_len,
            solution_key_len: config.solution_key_len,
            max_ranked: config.max_ranked,
        }
    }
}

impl Aggregator {
    /// Aggregate everything at once.
    pub fn aggregate(&self, items: &[Contribution]) -> Aggregate {
        Aggregate {
            patterns: self.identify_patterns(items),
            issues: self.recurring_issues(items),
            solutions: self.combine_solutions(items),
            confidence: calculate_confidence(items),
        }
    }

    /// Patterns seen more than once, most frequent first.
    pub fn identify_patterns(&self, items: &[Contribution]) -> Vec<PatternGroup> {
        let records = items.iter().flat_map(|i| &i.patterns);
        let mut patterns: Vec<PatternGroup> = self
            .count_by_key(records, self.pattern_key_len)
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(pattern, frequency)| PatternGroup {
                pattern,
                frequency,
                confidence: recurrence_tier(frequency),
            })
            .collect();

        patterns.sort_by_key(|p| std::cmp::Reverse(p.frequency));
        patterns.truncate(self.max_ranked);
        patterns
    }

    /// Issues seen more than once, most frequent first. Not truncated.
    pub fn recurring_issues(&self, items: &[Contribution]) -> Vec<IssueGroup> {
        let records = items.iter().flat_map(|i| &i.issues);
        let mut issues: Vec<IssueGroup> = self
            .count_by_key(records, self.pattern_key_len)
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(issue, frequency)| IssueGroup {
                issue,
                frequency,
                severity: recurrence_tier(frequency),
            })
            .collect();

        issues.sort_by_key(|i| std::cmp::Reverse(i.frequency));
        issues
    }

    /// All solution groups, singletons included, most frequent first.
    pub fn combine_solutions(&self, items: &[Contribution]) -> Vec<SolutionGroup> {
        let records = items.iter().flat_map(|i| &i.solutions);
        let mut solutions: Vec<SolutionGroup> = self
            .count_by_key(records, self.solution_key_len)
            .into_iter()
            .map(|(solution, occurrences)| SolutionGroup {
                solution,
                occurrences,
                confidence: if occurrences > 1 {
                    Tier::High
                } else {
                    Tier::Medium
                },
            })
            .collect();

        solutions.sort_by_key(|s| std::cmp::Reverse(s.occurrences));
        solutions.truncate(self.max_ranked);
        solutions
    }

    /// Deduplication key of a record.
    pub fn key_for(&self, content: &str, prefix_len: usize) -> String {
        match self.strategy {
            KeyStrategy::Prefix => content.chars().take(prefix_len).collect(),
            KeyStrategy::FullContent => content.to_string(),
        }
    }

    /// Count records per key, keeping first-seen order.
    fn count_by_key<'a>(
        &self,
        records: impl Iterator<Item = &'a Record>,
        prefix_len: usize,
    ) -> Vec<(String, usize)> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut counts: Vec<(String, usize)> = Vec::new();

        for record in records {
            let key = self.key_for(&record.content, prefix_len);
            match index.get(&key) {
                Some(&pos) => counts[pos].1 += 1,
                None => {
                    index.insert(key.clone(), counts.len());
                    counts.push((key, 1));
                }
            }
        }

        counts
    }
}

/// `high` above two occurrences, `medium` otherwise.
fn recurrence_tier(count: usize) -> Tier {
    if count > 2 {
        Tier::High
    } else {
        Tier::Medium
    }
}

/// Overall confidence in `[0, 1]`.
///
/// Volume contributes up to 0.5; any patterns add 0.2 and any solutions
/// add 0.3. Issue counts do not contribute.
pub fn calculate_confidence(items: &[Contribution]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }

    let mut score = (items.len() as f64 * 0.1).min(0.5);

    if items.iter().any(|i| !i.patterns.is_empty()) {
        score += 0.2;
    }
    if items.iter().any(|i| !i.solutions.is_empty()) {
        score += 0.3;
    }

    score.clamp(0.0, 1.0)
}

/// Actionable recommendations: patterns, then issues, then solutions.
pub fn generate_recommendations(
    patterns: &[PatternGroup],
    issues: &[IssueGroup],
    solutions: &[SolutionGroup],
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    for pattern in patterns.iter().take(RECOMMENDATIONS_PER_KIND) {
        if pattern.confidence == Tier::High {
            recommendations.push(Recommendation {
                kind: RecommendationKind::Pattern,
                priority: Priority::High,
                action: format!("Apply pattern: {}", pattern.pattern),
            });
        }
    }

    for issue in issues.iter().take(RECOMMENDATIONS_PER_KIND) {
        if issue.severity == Tier::High {
            recommendations.push(Recommendation {
                kind: RecommendationKind::Issue,
                priority: Priority::High,
                action: format!("Address recurring issue: {}", issue.issue),
            });
        }
    }

    for solution in solutions.iter().take(RECOMMENDATIONS_PER_KIND) {
        if solution.confidence == Tier::High {
            recommendations.push(Recommendation {
                kind: RecommendationKind::Solution,
                priority: Priority::Medium,
                action: format!("Implement solution: {}", solution.solution),
            });
        }
    }

    recommendations
}

/// Distinct task ids, in first-seen order.
pub fn distinct_task_ids(items: &[Contribution]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(|i| i.task_id.as_ref())
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// One-paragraph summary over raw (pre-dedup) counts.
pub fn generate_summary_text(items: &[Contribution]) -> String {
    let task_count = distinct_task_ids(items).len();
    let pattern_count: usize = items.iter().map(|i| i.patterns.len()).sum();
    let solution_count: usize = items.iter().map(|i| i.solutions.len()).sum();

    format!(
        "Processed {} findings from {} tasks. Identified {} patterns and {} solutions.",
        items.len(),
        task_count,
        pattern_count,
        solution_count
    )
}
