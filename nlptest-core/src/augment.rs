//! Training-data augmentation from failed robustness and bias reports.

use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::TransformSpec;
use crate::error::RegistryError;
use crate::perturbation::{PerturbationRegistry, TransformKind, record_rng};
use crate::report::Report;
use crate::types::{Category, Sample, Task};

/// Share of records to augment for a failed transform.
///
/// `min(1, (threshold - pass_rate) / threshold)`, scaled by `cap`. A
/// passing or zero-threshold transform gets nothing.
pub fn augmentation_proportion(pass_rate: f64, threshold: f64, cap: f64) -> f64 {
    if threshold <= 0.0 || pass_rate >= threshold {
        return 0.0;
    }
    ((threshold - pass_rate) / threshold).min(1.0) * cap.clamp(0.0, 1.0)
}

/// Build augmented training data: `samples` followed by perturbed copies
/// for every failed robustness or bias transform in `report`.
///
/// Records are drawn deterministically from `seed`. An NER copy keeps its
/// tags only when the perturbation preserved the token count; otherwise it
/// is dropped.
pub fn augment(
    registry: &PerturbationRegistry,
    task: Task,
    seed: u64,
    specs: &[TransformSpec],
    report: &Report,
    samples: &[Sample],
    cap: f64,
) -> Result<Vec<Sample>, RegistryError> {
    let mut augmented = samples.to_vec();

    for spec in specs {
        if !matches!(spec.category, Category::Robustness | Category::Bias) {
            continue;
        }
        let Some(entry) = report.get(&spec.name).filter(|e| !e.passed) else {
            continue;
        };
        let TransformKind::Perturbation(perturbation) = &registry.get(&spec.name)?.kind else {
            continue;
        };

        let proportion = augmentation_proportion(entry.pass_rate, spec.threshold.value(), cap);
        let candidates: Vec<usize> = samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.malformed_reason(task).is_none())
            .map(|(i, _)| i)
            .collect();
        let wanted = (proportion * candidates.len() as f64).round() as usize;
        if wanted == 0 {
            continue;
        }

        let mut pick_rng = record_rng(seed, &format!("augment:{}", spec.name), 0);
        let mut chosen: Vec<usize> = candidates
            .choose_multiple(&mut pick_rng, wanted)
            .copied()
            .collect();
        chosen.sort_unstable();

        let mut added = 0usize;
        for idx in chosen {
            let sample = &samples[idx];
            let mut rng = record_rng(seed, &spec.name, idx);
            let Some(variant) = perturbation
                .perturb(sample, &spec.params, &mut rng)
                .into_iter()
                .next()
            else {
                continue;
            };
            let expected = match task {
                Task::TextClassification => sample.expected.clone(),
                Task::Ner => match &sample.expected {
                    Some(tags) if variant.text.split_whitespace().count() == tags.labels.len() => {
                        Some(tags.clone())
                    }
                    Some(_) => {
                        debug!(transform = %spec.name, record = idx, "Token count changed; dropping augmented record");
                        continue;
                    }
                    None => None,
                },
            };
            augmented.push(Sample {
                text: variant.text,
                expected,
            });
            added += 1;
        }
        info!(transform = %spec.name, proportion, added, "Augmented training data");
    }

    Ok(augmented)
}
