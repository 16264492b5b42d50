//! Label-level classification metrics used by accuracy and fairness tests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{OUTSIDE_TAG, Prediction, Task, split_bio};

/// Aggregate score a metric-based transform is judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    MacroF1,
    MicroF1,
    MacroPrecision,
    MacroRecall,
}

impl Metric {
    pub fn score(&self, metrics: &LabelMetrics) -> f64 {
        match self {
            Metric::MacroF1 => metrics.macro_f1(),
            Metric::MicroF1 => metrics.micro_f1(),
            Metric::MacroPrecision => metrics.macro_precision(),
            Metric::MacroRecall => metrics.macro_recall(),
        }
    }
}

/// True/false positive counts for one label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl LabelCounts {
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

/// Per-label counts accumulated from (gold, predicted) pairs.
///
/// The outside tag never becomes a label of its own: a gold `O` predicted as
/// `PER` is a false positive for `PER` only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelMetrics {
    pub per_label: BTreeMap<String, LabelCounts>,
}

impl LabelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, gold: &str, predicted: &str) {
        if gold == predicted {
            if gold != OUTSIDE_TAG {
                self.per_label.entry(gold.to_string()).or_default().true_positives += 1;
            }
            return;
        }
        if gold != OUTSIDE_TAG {
            self.per_label.entry(gold.to_string()).or_default().false_negatives += 1;
        }
        if predicted != OUTSIDE_TAG {
            self.per_label
                .entry(predicted.to_string())
                .or_default()
                .false_positives += 1;
        }
    }

    pub fn extend<'a, I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (gold, predicted) in pairs {
            self.add(gold, predicted);
        }
    }

    fn macro_avg(&self, f: impl Fn(&LabelCounts) -> f64) -> f64 {
        if self.per_label.is_empty() {
            return 0.0;
        }
        self.per_label.values().map(f).sum::<f64>() / self.per_label.len() as f64
    }

    pub fn macro_precision(&self) -> f64 {
        self.macro_avg(LabelCounts::precision)
    }

    pub fn macro_recall(&self) -> f64 {
        self.macro_avg(LabelCounts::recall)
    }

    pub fn macro_f1(&self) -> f64 {
        self.macro_avg(LabelCounts::f1)
    }

    pub fn micro_f1(&self) -> f64 {
        let total = self
            .per_label
            .values()
            .fold(LabelCounts::default(), |mut acc, c| {
                acc.true_positives += c.true_positives;
                acc.false_positives += c.false_positives;
                acc.false_negatives += c.false_negatives;
                acc
            });
        total.f1()
    }
}

/// Align ground truth and prediction into (gold, predicted) label pairs.
///
/// Classification compares top labels. NER compares tags position by
/// position with BIO prefixes stripped, padding the shorter side with `O`.
pub fn label_pairs(task: Task, gold: &Prediction, predicted: &Prediction) -> Vec<(String, String)> {
    match task {
        Task::TextClassification => vec![(
            gold.top_label().unwrap_or(OUTSIDE_TAG).to_string(),
            predicted.top_label().unwrap_or(OUTSIDE_TAG).to_string(),
        )],
        Task::Ner => {
            let len = gold.labels.len().max(predicted.labels.len());
            (0..len)
                .map(|i| {
                    let g = gold.labels.get(i).map_or(OUTSIDE_TAG, |t| split_bio(t).1);
                    let p = predicted
                        .labels
                        .get(i)
                        .map_or(OUTSIDE_TAG, |t| split_bio(t).1);
                    (g.to_string(), p.to_string())
                })
                .collect()
        }
    }
}

/// Whether a prediction exactly matches the ground truth for the task.
pub fn matches_ground_truth(task: Task, gold: &Prediction, predicted: &Prediction) -> bool {
    label_pairs(task, gold, predicted)
        .iter()
        .all(|(g, p)| g == p)
}
