/// Ordered, short-circuiting junction classification
use super::rules::RuleSet;
use crate::junction::{FilterResult, Intron, Junction, JunctionIndex};
use log::info;
use rayon::prelude::*;

/// Applies a rule set to junctions.
///
/// Rules run in their configured order and the first failure decides the
/// reported reason. Evaluation reads only the junction being judged.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    rules: RuleSet,
}

impl FilterEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Judge one junction.
    pub fn evaluate(&self, junction: &Junction) -> FilterResult {
        self.rules
            .predicates()
            .iter()
            .find(|p| !p.passes(junction))
            .map_or(FilterResult::Pass, |p| FilterResult::Fail(p.id().to_string()))
    }

    /// Tag every junction in the index with its result, in parallel.
    ///
    /// Each junction is classified once; the index must not have been
    /// classified before.
    pub fn classify(&self, index: &mut JunctionIndex) -> FilterReport {
        index
            .junctions_mut()
            .for_each(|j| {
                let result = self.evaluate(j);
                j.set_filter_result(result);
            });
        FilterReport::from_index(index, &self.rules)
    }
}

/// Pass and fail sets of a classified index, with per-rule failure counts.
#[derive(Debug, Clone, Default)]
pub struct FilterReport {
    /// Passing introns in coordinate order
    pub passed: Vec<Intron>,
    /// Failing introns in coordinate order, with their failed rule
    pub failed: Vec<(Intron, String)>,
    /// Failures per rule, in rule order (rules that failed nothing included)
    pub failures_by_rule: Vec<(String, usize)>,
}

impl FilterReport {
    fn from_index(index: &JunctionIndex, rules: &RuleSet) -> Self {
        let mut report = FilterReport {
            failures_by_rule: rules
                .predicates()
                .iter()
                .map(|p| (p.id().to_string(), 0))
                .collect(),
            ..Default::default()
        };

        for junction in index.sorted() {
            match junction.filter_result() {
                Some(FilterResult::Pass) => report.passed.push(*junction.intron()),
                Some(FilterResult::Fail(rule)) => {
                    if let Some(entry) = report
                        .failures_by_rule
                        .iter_mut()
                        .find(|(id, _)| id == rule)
                    {
                        entry.1 += 1;
                    }
                    report.failed.push((*junction.intron(), rule.clone()));
                }
                None => {}
            }
        }
        report
    }

    pub fn n_pass(&self) -> usize {
        self.passed.len()
    }

    pub fn n_fail(&self) -> usize {
        self.failed.len()
    }

    /// Print summary statistics to log
    pub fn print_summary(&self) {
        let total = self.n_pass() + self.n_fail();
        info!("=== Junction Filter Summary ===");
        info!("Junctions classified: {}", total);
        if total > 0 {
            info!(
                "Passed: {} ({:.2}%)",
                self.n_pass(),
                100.0 * self.n_pass() as f64 / total as f64
            );
        }
        info!("Failed: {}", self.n_fail());
        for (rule, n) in &self.failures_by_rule {
            info!("  failed at {}: {}", rule, n);
        }
    }
}
