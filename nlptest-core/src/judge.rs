//! Pass/Fail Judge: category-specific comparators.
//!
//! Robustness and bias cases pass when the perturbed output keeps the
//! original's prediction: the same top label for text classification, the
//! same entity signature for NER. Accuracy cases compare the output
//! with ground truth. Fairness cases pass when their subgroup's macro-F1 is
//! within the configured bound. Representation cases compare the observed
//! count or proportion with the configured minimum and never involve the
//! model. A result carrying an error never passes.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::config::TransformSpec;
use crate::error::RegistryError;
use crate::metrics::{LabelMetrics, Metric, label_pairs, matches_ground_truth};
use crate::perturbation::{PerturbationRegistry, TransformKind};
use crate::types::{EvaluationResult, Probe, Task, TestCase, Threshold};

/// Invariant comparator: same prediction before and after perturbation.
///
/// A classifier may return a full distribution, so only its top label
/// counts; for NER the predicted entities are compared.
pub fn is_invariant(task: Task, result: &EvaluationResult) -> bool {
    match (&result.original_output, &result.perturbed_output) {
        (Some(original), Some(perturbed)) => match task {
            Task::TextClassification => original.top_label() == perturbed.top_label(),
            Task::Ner => original.entity_signature() == perturbed.entity_signature(),
        },
        _ => false,
    }
}

/// Whether an observed representation meets its minimum.
pub fn meets_representation(probe: &Probe, threshold: &Threshold) -> bool {
    let Probe::Representation {
        count, proportion, ..
    } = probe
    else {
        return false;
    };
    match *threshold {
        Threshold::MinCount(min) => *count >= min,
        Threshold::MinProportion(min) => *proportion >= min,
        _ => false,
    }
}

/// Whether a score is within a score bound.
pub fn within_bound(score: f64, threshold: &Threshold) -> bool {
    match *threshold {
        Threshold::MaxScore(max) => score <= max,
        other => score >= other.value(),
    }
}

/// Label metrics over the error-free cases of one transform, optionally
/// restricted to one subgroup.
pub fn label_metrics<'a, I>(task: Task, pairs: I) -> LabelMetrics
where
    I: IntoIterator<Item = (&'a TestCase, &'a EvaluationResult)>,
{
    let mut metrics = LabelMetrics::new();
    for (case, result) in pairs {
        if result.error.is_some() {
            continue;
        }
        if let (Some(gold), Some(predicted)) = (&case.expected, &result.original_output) {
            for (g, p) in label_pairs(task, gold, predicted) {
                metrics.add(&g, &p);
            }
        }
    }
    metrics
}

/// Metric score of an accuracy transform.
pub fn accuracy_score<'a, I>(task: Task, metric: Metric, pairs: I) -> f64
where
    I: IntoIterator<Item = (&'a TestCase, &'a EvaluationResult)>,
{
    metric.score(&label_metrics(task, pairs))
}

/// Macro-F1 per subgroup of a fairness transform.
pub fn subgroup_scores<'a, I>(task: Task, pairs: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = (&'a TestCase, &'a EvaluationResult)>,
{
    let mut by_group: BTreeMap<String, Vec<(&TestCase, &EvaluationResult)>> = BTreeMap::new();
    for (case, result) in pairs {
        if let Probe::Subgroup { group } = &case.probe {
            by_group.entry(group.clone()).or_default().push((case, result));
        }
    }
    by_group
        .into_iter()
        .map(|(group, pairs)| (group, label_metrics(task, pairs).macro_f1()))
        .collect()
}

/// Completes evaluation results with a pass/fail verdict.
pub struct Judge<'a> {
    registry: &'a PerturbationRegistry,
    task: Task,
}

impl<'a> Judge<'a> {
    pub fn new(registry: &'a PerturbationRegistry, task: Task) -> Self {
        Self { registry, task }
    }

    /// Set `passed` on every result whose case belongs to one of `specs`.
    pub fn judge(
        &self,
        specs: &[TransformSpec],
        cases: &[TestCase],
        results: &mut [EvaluationResult],
    ) -> Result<(), RegistryError> {
        let case_by_id: HashMap<u64, &TestCase> = cases.iter().map(|c| (c.id, c)).collect();

        for spec in specs {
            let registered = self.registry.get(&spec.name)?;

            // Fairness verdicts depend on every case of the group.
            let group_scores = match &registered.kind {
                TransformKind::Fairness { .. } => subgroup_scores(
                    self.task,
                    results.iter().filter_map(|r| {
                        case_by_id
                            .get(&r.test_case_id)
                            .filter(|c| c.transform == spec.name)
                            .map(|c| (*c, r))
                    }),
                ),
                _ => BTreeMap::new(),
            };

            let mut passed = 0usize;
            let mut total = 0usize;
            for result in results.iter_mut() {
                let Some(case) = case_by_id.get(&result.test_case_id) else {
                    continue;
                };
                if case.transform != spec.name {
                    continue;
                }
                result.passed = result.error.is_none()
                    && match (&registered.kind, &case.probe) {
                        (TransformKind::Perturbation(_), _) => is_invariant(self.task, result),
                        (TransformKind::Representation { .. }, probe) => {
                            meets_representation(probe, &spec.threshold)
                        }
                        (TransformKind::Accuracy(_), _) => {
                            match (&case.expected, &result.original_output) {
                                (Some(gold), Some(predicted)) => {
                                    matches_ground_truth(self.task, gold, predicted)
                                }
                                _ => false,
                            }
                        }
                        (TransformKind::Fairness { .. }, Probe::Subgroup { group }) => group_scores
                            .get(group)
                            .is_some_and(|score| within_bound(*score, &spec.threshold)),
                        (TransformKind::Fairness { .. }, _) => false,
                    };
                total += 1;
                passed += usize::from(result.passed);
            }
            debug!(transform = %spec.name, passed, total, "Judged transform");
        }
        Ok(())
    }
}
