//! Transform Engine: turns configured transforms and dataset records into
//! test cases.
//!
//! Generation is pure and deterministic: identifiers are assigned in
//! (spec order, record order, variant order) and randomized transforms draw
//! from an RNG seeded per (run seed, transform, record).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::TransformSpec;
use crate::error::RegistryError;
use crate::perturbation::{PerturbationRegistry, TransformKind, Variant, record_rng};
use crate::subgroup;
use crate::types::{Probe, Sample, Task, TestCase};

/// Generated test cases plus the records each transform had to skip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub test_cases: Vec<TestCase>,
    /// Skipped record count per transform name.
    pub skipped: BTreeMap<String, usize>,
}

/// Applies transform specs to a dataset.
pub struct TransformEngine<'a> {
    registry: &'a PerturbationRegistry,
    task: Task,
    seed: u64,
}

impl<'a> TransformEngine<'a> {
    pub fn new(registry: &'a PerturbationRegistry, task: Task, seed: u64) -> Self {
        Self {
            registry,
            task,
            seed,
        }
    }

    /// Generate every test case for `specs` over `samples`.
    ///
    /// Malformed records are skipped and counted, never fatal. Fails only if
    /// a spec names a transform the registry does not hold.
    pub fn generate(
        &self,
        specs: &[TransformSpec],
        samples: &[Sample],
    ) -> Result<Generation, RegistryError> {
        let mut generation = Generation::default();
        let mut next_id: u64 = 0;

        for spec in specs {
            let registered = self.registry.get(&spec.name)?;
            let before = generation.test_cases.len();
            let mut skipped = 0usize;

            let valid: Vec<(usize, &Sample)> = samples
                .iter()
                .enumerate()
                .filter(|(idx, sample)| match sample.malformed_reason(self.task) {
                    Some(reason) => {
                        warn!(transform = %spec.name, record = idx, reason, "MalformedInput: skipping record");
                        skipped += 1;
                        false
                    }
                    None => true,
                })
                .collect();

            let mut push = |record: Option<usize>, original: &str, probe: Probe, sample: Option<&Sample>| {
                generation.test_cases.push(TestCase {
                    id: next_id,
                    transform: spec.name.clone(),
                    category: spec.category,
                    record,
                    original: original.to_string(),
                    probe,
                    expected: sample.and_then(|s| s.expected.clone()),
                });
                next_id += 1;
            };

            match &registered.kind {
                TransformKind::Perturbation(perturbation) => {
                    for (idx, sample) in &valid {
                        let mut rng = record_rng(self.seed, &spec.name, *idx);
                        for Variant { text, edits } in
                            perturbation.perturb(sample, &spec.params, &mut rng)
                        {
                            push(Some(*idx), &sample.text, Probe::Perturbed { text, edits }, Some(*sample));
                        }
                    }
                }
                TransformKind::Representation { dimension, .. } => {
                    let records: Vec<Sample> = valid.iter().map(|(_, s)| (*s).clone()).collect();
                    let total = records.len();
                    for (group, count) in subgroup::observe(*dimension, self.task, &records) {
                        let proportion = if total == 0 {
                            0.0
                        } else {
                            count as f64 / total as f64
                        };
                        push(
                            None,
                            "",
                            Probe::Representation {
                                group,
                                count,
                                proportion,
                            },
                            None,
                        );
                    }
                }
                TransformKind::Accuracy(_) => {
                    for (idx, sample) in &valid {
                        if sample.expected.is_none() {
                            skipped += 1;
                            continue;
                        }
                        push(Some(*idx), &sample.text, Probe::Reference, Some(*sample));
                    }
                }
                TransformKind::Fairness { dimension, .. } => {
                    for (idx, sample) in &valid {
                        if sample.expected.is_none() {
                            skipped += 1;
                            continue;
                        }
                        for group in dimension.classify(self.task, sample) {
                            push(Some(*idx), &sample.text, Probe::Subgroup { group }, Some(*sample));
                        }
                    }
                }
            }

            let generated = generation.test_cases.len() - before;
            info!(transform = %spec.name, category = %spec.category, generated, skipped, "Generated test cases");
            generation.skipped.insert(spec.name.clone(), skipped);
        }

        Ok(generation)
    }

    /// Apply one perturbation spec to a single text, for previews.
    pub fn preview(&self, spec: &TransformSpec, sample: &Sample) -> Result<Vec<Variant>, RegistryError> {
        let registered = self.registry.get(&spec.name)?;
        match &registered.kind {
            TransformKind::Perturbation(p) => {
                let mut rng = record_rng(self.seed, &spec.name, 0);
                Ok(p.perturb(sample, &spec.params, &mut rng))
            }
            _ => Ok(Vec::new()),
        }
    }
}
