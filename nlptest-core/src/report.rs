//! Aggregator & Reporter: pass rates per transform against thresholds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use unicode_width::UnicodeWidthStr;

use crate::config::TransformSpec;
use crate::error::RegistryError;
use crate::judge::{accuracy_score, subgroup_scores, within_bound};
use crate::perturbation::{PerturbationRegistry, TransformKind};
use crate::types::{Category, EvaluationResult, Task, TestCase, Threshold};

/// Outcome of one transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub category: Category,
    pub transform: String,
    pub pass_count: usize,
    pub fail_count: usize,
    /// Share of passing cases; the metric score for accuracy transforms and
    /// the deciding subgroup score for fairness transforms.
    pub pass_rate: f64,
    pub threshold: Threshold,
    pub passed: bool,
}

impl CategoryReport {
    pub fn total(&self) -> usize {
        self.pass_count + self.fail_count
    }
}

/// The full report of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub task: Task,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<CategoryReport>,
}

impl Report {
    /// Whether every transform met its threshold.
    pub fn passed(&self) -> bool {
        self.entries.iter().all(|e| e.passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CategoryReport> {
        self.entries.iter().filter(|e| !e.passed)
    }

    pub fn get(&self, transform: &str) -> Option<&CategoryReport> {
        self.entries.iter().find(|e| e.transform == transform)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Render as an aligned text table with percentages.
    pub fn render_table(&self) -> String {
        const HEADERS: [&str; 7] = [
            "category",
            "test_type",
            "fail_count",
            "pass_count",
            "pass_rate",
            "minimum_pass_rate",
            "pass",
        ];
        let rows: Vec<[String; 7]> = self
            .entries
            .iter()
            .map(|e| {
                [
                    e.category.to_string(),
                    e.transform.clone(),
                    e.fail_count.to_string(),
                    e.pass_count.to_string(),
                    format!("{:.0}%", e.pass_rate * 100.0),
                    e.threshold.to_string(),
                    e.passed.to_string(),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(|h| h.width());
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.width());
            }
        }

        let mut out = String::new();
        let mut push_row = |cells: &[&str]| {
            let line: Vec<String> = cells
                .iter()
                .zip(widths)
                .map(|(cell, w)| format!("{cell}{}", " ".repeat(w - cell.width())))
                .collect();
            out.push_str(line.join("  ").trim_end());
            out.push('\n');
        };
        push_row(&HEADERS);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        push_row(&rule.iter().map(String::as_str).collect::<Vec<_>>());
        for row in &rows {
            push_row(&row.iter().map(String::as_str).collect::<Vec<_>>());
        }
        out
    }
}

/// Aggregate judged results into one report entry per spec.
///
/// Perturbation transforms pass when `passed / total` reaches the minimum
/// pass rate. Accuracy transforms report their metric score as pass rate.
/// Fairness transforms report the subgroup score closest to violating the
/// bound (the lowest against a minimum, the highest against a maximum).
/// Representation transforms pass only when every subgroup case passes.
/// A transform without cases passes vacuously.
pub fn aggregate(
    registry: &PerturbationRegistry,
    task: Task,
    specs: &[TransformSpec],
    cases: &[TestCase],
    results: &[EvaluationResult],
) -> Result<Report, RegistryError> {
    let result_by_id: HashMap<u64, &EvaluationResult> =
        results.iter().map(|r| (r.test_case_id, r)).collect();

    let mut entries = Vec::with_capacity(specs.len());
    for spec in specs {
        let registered = registry.get(&spec.name)?;
        let pairs: Vec<(&TestCase, &EvaluationResult)> = cases
            .iter()
            .filter(|c| c.transform == spec.name)
            .filter_map(|c| result_by_id.get(&c.id).map(|r| (c, *r)))
            .collect();
        let pass_count = pairs.iter().filter(|(_, r)| r.passed).count();
        let fail_count = pairs.len() - pass_count;

        let (pass_rate, passed) = if pairs.is_empty() {
            warn!(transform = %spec.name, "No test cases for transform; reporting it as passed");
            (1.0, true)
        } else {
            let share = pass_count as f64 / pairs.len() as f64;
            match &registered.kind {
                TransformKind::Perturbation(_) => (share, share >= spec.threshold.value()),
                TransformKind::Accuracy(metric) => {
                    let score = accuracy_score(task, *metric, pairs.iter().copied());
                    (score, score >= spec.threshold.value())
                }
                TransformKind::Fairness { .. } => {
                    let scores = subgroup_scores(task, pairs.iter().copied());
                    let deciding = match spec.threshold {
                        Threshold::MaxScore(_) => scores.values().copied().reduce(f64::max),
                        _ => scores.values().copied().reduce(f64::min),
                    }
                    .unwrap_or(share);
                    (deciding, within_bound(deciding, &spec.threshold))
                }
                TransformKind::Representation { .. } => (share, fail_count == 0),
            }
        };

        entries.push(CategoryReport {
            category: spec.category,
            transform: spec.name.clone(),
            pass_count,
            fail_count,
            pass_rate,
            threshold: spec.threshold,
            passed,
        });
    }

    let report = Report {
        task,
        generated_at: Utc::now(),
        entries,
    };
    info!(
        transforms = report.entries.len(),
        failed = report.failed().count(),
        "Report aggregated"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perturbation::TransformParams;
    use crate::types::{Prediction, Probe};

    fn spec(name: &str, category: Category, threshold: Threshold) -> TransformSpec {
        TransformSpec {
            name: name.into(),
            category,
            params: TransformParams::None,
            threshold,
        }
    }

    fn case(id: u64, transform: &str, category: Category, probe: Probe) -> TestCase {
        TestCase {
            id,
            transform: transform.into(),
            category,
            record: None,
            original: "t".into(),
            probe,
            expected: Some(Prediction::label("pos")),
        }
    }

    fn verdict(id: u64, passed: bool) -> EvaluationResult {
        EvaluationResult {
            passed,
            original_output: Some(Prediction::label(if passed { "pos" } else { "neg" })),
            ..EvaluationResult::pending(id)
        }
    }

    fn perturbed() -> Probe {
        Probe::Perturbed {
            text: "T".into(),
            edits: Vec::new(),
        }
    }

    #[test]
    fn test_pass_rate_against_threshold() {
        let registry = PerturbationRegistry::with_builtins();
        let cases: Vec<TestCase> = (0..4)
            .map(|i| case(i, "uppercase", Category::Robustness, perturbed()))
            .collect();
        let results = vec![verdict(0, true), verdict(1, true), verdict(2, true), verdict(3, false)];

        let report = aggregate(
            &registry,
            Task::TextClassification,
            &[spec("uppercase", Category::Robustness, Threshold::MinPassRate(0.75))],
            &cases,
            &results,
        )
        .unwrap();
        let entry = report.get("uppercase").unwrap();
        assert_eq!(entry.pass_count, 3);
        assert_eq!(entry.fail_count, 1);
        assert_eq!(entry.pass_rate, 0.75);
        assert!(entry.passed);

        let strict = aggregate(
            &registry,
            Task::TextClassification,
            &[spec("uppercase", Category::Robustness, Threshold::MinPassRate(0.8))],
            &cases,
            &results,
        )
        .unwrap();
        assert!(!strict.passed());
    }

    #[test]
    fn test_zero_threshold_always_passes() {
        let registry = PerturbationRegistry::with_builtins();
        let cases = vec![case(0, "lowercase", Category::Robustness, perturbed())];
        let report = aggregate(
            &registry,
            Task::TextClassification,
            &[spec("lowercase", Category::Robustness, Threshold::MinPassRate(0.0))],
            &cases,
            &[verdict(0, false)],
        )
        .unwrap();
        assert!(report.passed());
    }

    #[test]
    fn test_empty_transform_passes_vacuously() {
        let registry = PerturbationRegistry::with_builtins();
        let report = aggregate(
            &registry,
            Task::Ner,
            &[spec("add_typo", Category::Robustness, Threshold::MinPassRate(0.9))],
            &[],
            &[],
        )
        .unwrap();
        let entry = &report.entries[0];
        assert_eq!(entry.pass_rate, 1.0);
        assert!(entry.passed);
        assert_eq!(entry.total(), 0);
    }

    #[test]
    fn test_accuracy_reports_score() {
        let registry = PerturbationRegistry::with_builtins();
        let cases = vec![
            case(0, "min_micro_f1_score", Category::Accuracy, Probe::Reference),
            case(1, "min_micro_f1_score", Category::Accuracy, Probe::Reference),
        ];
        let report = aggregate(
            &registry,
            Task::TextClassification,
            &[spec("min_micro_f1_score", Category::Accuracy, Threshold::MinScore(0.6))],
            &cases,
            &[verdict(0, true), verdict(1, false)],
        )
        .unwrap();
        let entry = &report.entries[0];
        // gold pos/pos, predicted pos/neg: tp=1 fp=1 fn=1
        assert!((entry.pass_rate - 0.5).abs() < 1e-9);
        assert!(!entry.passed);
    }

    #[test]
    fn test_representation_needs_every_group() {
        let registry = PerturbationRegistry::with_builtins();
        let probe = |g: &str| Probe::Representation {
            group: g.into(),
            count: 1,
            proportion: 0.5,
        };
        let cases = vec![
            case(0, "min_gender_representation_count", Category::Representation, probe("male")),
            case(1, "min_gender_representation_count", Category::Representation, probe("female")),
        ];
        let report = aggregate(
            &registry,
            Task::TextClassification,
            &[spec("min_gender_representation_count", Category::Representation, Threshold::MinCount(1))],
            &cases,
            &[verdict(0, true), verdict(1, false)],
        )
        .unwrap();
        assert_eq!(report.entries[0].pass_rate, 0.5);
        assert!(!report.entries[0].passed);
    }

    fn fairness_cases(groups: &[(&str, bool)]) -> (Vec<TestCase>, Vec<EvaluationResult>) {
        let cases = groups
            .iter()
            .enumerate()
            .map(|(i, (g, _))| {
                case(i as u64, "min_gender_f1_score", Category::Fairness, Probe::Subgroup { group: g.to_string() })
            })
            .collect();
        let results = groups
            .iter()
            .enumerate()
            .map(|(i, (_, correct))| verdict(i as u64, *correct))
            .collect();
        (cases, results)
    }

    #[test]
    fn test_fairness_verdict_agrees_with_reported_rate() {
        let registry = PerturbationRegistry::with_builtins();
        let mut groups = vec![("male", true); 9];
        groups.push(("female", false));
        let (cases, mut results) = fairness_cases(&groups);
        let specs = [spec("min_gender_f1_score", Category::Fairness, Threshold::MinScore(0.6))];
        crate::judge::Judge::new(&registry, Task::TextClassification)
            .judge(&specs, &cases, &mut results)
            .unwrap();

        let report = aggregate(&registry, Task::TextClassification, &specs, &cases, &results).unwrap();
        let entry = &report.entries[0];
        assert_eq!(entry.pass_count, 9);
        assert_eq!(entry.fail_count, 1);
        // The female group scores 0.0 and decides the verdict.
        assert_eq!(entry.pass_rate, 0.0);
        assert_eq!(entry.passed, entry.pass_rate >= entry.threshold.value());
        assert!(!entry.passed);
    }

    #[test]
    fn test_fairness_max_bound_uses_best_group() {
        let registry = PerturbationRegistry::with_builtins();
        let (mut cases, results) = fairness_cases(&[("male", true), ("female", false)]);
        for c in &mut cases {
            c.transform = "max_gender_f1_score".into();
        }
        let report = aggregate(
            &registry,
            Task::TextClassification,
            &[spec("max_gender_f1_score", Category::Fairness, Threshold::MaxScore(0.9))],
            &cases,
            &results,
        )
        .unwrap();
        let entry = &report.entries[0];
        assert_eq!(entry.pass_rate, 1.0);
        assert!(!entry.passed);

        let (cases, results) = fairness_cases(&[("male", true), ("female", true)]);
        let lenient = aggregate(
            &registry,
            Task::TextClassification,
            &[spec("min_gender_f1_score", Category::Fairness, Threshold::MinScore(0.6))],
            &cases,
            &results,
        )
        .unwrap();
        assert_eq!(lenient.entries[0].pass_rate, 1.0);
        assert!(lenient.entries[0].passed);
    }

    #[test]
    fn test_render_table() {
        let report = Report {
            task: Task::Ner,
            generated_at: Utc::now(),
            entries: vec![CategoryReport {
                category: Category::Robustness,
                transform: "add_punctuation".into(),
                pass_count: 9,
                fail_count: 1,
                pass_rate: 0.9,
                threshold: Threshold::MinPassRate(0.65),
                passed: true,
            }],
        };
        let table = report.render_table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("category    test_type"));
        assert!(lines[2].contains("90%"));
        assert!(lines[2].contains("65%"));
        assert!(lines[2].ends_with("true"));
    }
}
