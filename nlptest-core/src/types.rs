//! Core data types for nlptest.
//!
//! Defines the dataset record (`Sample`), model output (`Prediction`),
//! generated `TestCase`s and their `EvaluationResult`s, plus the task,
//! category and threshold enums shared by every stage of the pipeline.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Tag used for tokens outside any entity in BIO-tagged sequences.
pub const OUTSIDE_TAG: &str = "O";

/// The NLP task the model under test performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    /// Token-level named entity recognition with BIO tags.
    #[serde(rename = "ner")]
    Ner,
    /// One label per input text.
    #[serde(rename = "text-classification")]
    TextClassification,
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::Ner => write!(f, "ner"),
            Task::TextClassification => write!(f, "text-classification"),
        }
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ner" => Ok(Task::Ner),
            "text-classification" | "text_classification" | "classification" => {
                Ok(Task::TextClassification)
            }
            other => Err(format!("unknown task '{other}'")),
        }
    }
}

/// Testing concern a transform belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Robustness,
    Bias,
    Representation,
    Accuracy,
    Fairness,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Robustness,
        Category::Bias,
        Category::Representation,
        Category::Accuracy,
        Category::Fairness,
    ];

    /// Whether test cases of this category send text to the model.
    pub fn needs_model(&self) -> bool {
        !matches!(self, Category::Representation)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Robustness => write!(f, "robustness"),
            Category::Bias => write!(f, "bias"),
            Category::Representation => write!(f, "representation"),
            Category::Accuracy => write!(f, "accuracy"),
            Category::Fairness => write!(f, "fairness"),
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// Model output for one text: labels with optional confidence scores.
///
/// For NER the labels are one BIO tag per whitespace token; for text
/// classification a single label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scores: Vec<f64>,
}

impl Prediction {
    pub fn new(labels: Vec<String>, scores: Vec<f64>) -> Self {
        Self { labels, scores }
    }

    /// A single ground-truth label (score 1.0).
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            labels: vec![label.into()],
            scores: vec![1.0],
        }
    }

    /// A BIO tag sequence without scores.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: tags.into_iter().map(Into::into).collect(),
            scores: Vec::new(),
        }
    }

    /// The highest-scoring label, or the first one when scores are absent.
    pub fn top_label(&self) -> Option<&str> {
        if self.scores.len() == self.labels.len() && !self.scores.is_empty() {
            self.labels
                .iter()
                .zip(&self.scores)
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(l, _)| l.as_str())
        } else {
            self.labels.first().map(String::as_str)
        }
    }

    /// Sorted multiset of predicted entity types.
    ///
    /// BIO chunks collapse to one entry (`B-PER I-PER` → `PER`) and the
    /// outside tag is dropped, so two outputs compare equal when they
    /// predict the same entities regardless of how many tokens each spans.
    /// Unprefixed labels (text classification) are kept as-is.
    pub fn entity_signature(&self) -> Vec<String> {
        let mut signature = Vec::new();
        let mut current: Option<&str> = None;
        for label in &self.labels {
            if label == OUTSIDE_TAG {
                current = None;
                continue;
            }
            match split_bio(label) {
                (Some('B'), ty) => {
                    signature.push(ty.to_string());
                    current = Some(ty);
                }
                (Some('I'), ty) => {
                    if current != Some(ty) {
                        signature.push(ty.to_string());
                    }
                    current = Some(ty);
                }
                (_, ty) => {
                    signature.push(ty.to_string());
                    current = None;
                }
            }
        }
        signature.sort();
        signature
    }
}

/// Split a BIO tag into its prefix letter and entity type.
pub fn split_bio(tag: &str) -> (Option<char>, &str) {
    match tag.split_once('-') {
        Some((prefix, ty)) if prefix == "B" || prefix == "I" => (prefix.chars().next(), ty),
        _ => (None, tag),
    }
}

/// A dataset record: input text plus optional ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Prediction>,
}

impl Sample {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            expected: None,
        }
    }

    pub fn with_expected(mut self, expected: Prediction) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Whitespace tokens of the text.
    pub fn tokens(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    /// Why this record cannot be perturbed, if it cannot.
    pub fn malformed_reason(&self, task: Task) -> Option<&'static str> {
        if self.text.trim().is_empty() {
            return Some("empty text");
        }
        if task == Task::Ner {
            if let Some(expected) = &self.expected {
                if expected.labels.len() != self.tokens().len() {
                    return Some("label count does not match token count");
                }
            }
        }
        None
    }
}

/// One substitution applied by a transform, in byte offsets of the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub original: String,
    pub replacement: String,
}

/// What a test case probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Probe {
    /// Original vs perturbed output (robustness, bias).
    Perturbed { text: String, edits: Vec<Edit> },
    /// Original output vs ground truth (accuracy).
    Reference,
    /// Original output vs ground truth, scored per subgroup (fairness).
    Subgroup { group: String },
    /// Dataset composition; never sent to the model.
    Representation {
        group: String,
        count: usize,
        proportion: f64,
    },
}

/// A generated test case. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u64,
    pub transform: String,
    pub category: Category,
    /// Index of the originating dataset record, absent for dataset-level cases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<usize>,
    pub original: String,
    pub probe: Probe,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Prediction>,
}

impl TestCase {
    pub fn perturbed_text(&self) -> Option<&str> {
        match &self.probe {
            Probe::Perturbed { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn needs_model(&self) -> bool {
        !matches!(self.probe, Probe::Representation { .. })
    }

    /// Texts the runner sends to the predictor for this case, in order.
    pub fn model_inputs(&self) -> Vec<&str> {
        match &self.probe {
            Probe::Perturbed { text, .. } => vec![self.original.as_str(), text.as_str()],
            Probe::Reference | Probe::Subgroup { .. } => vec![self.original.as_str()],
            Probe::Representation { .. } => Vec::new(),
        }
    }
}

/// Captured model outputs for one test case and the judged outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub test_case_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_output: Option<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perturbed_output: Option<Prediction>,
    pub passed: bool,
    /// Timeout or prediction failure; such results never pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResult {
    pub fn pending(test_case_id: u64) -> Self {
        Self {
            test_case_id,
            original_output: None,
            perturbed_output: None,
            passed: false,
            error: None,
        }
    }

    pub fn failed(test_case_id: u64, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::pending(test_case_id)
        }
    }
}

/// The kind of threshold a transform is judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    MinPassRate,
    MinScore,
    MaxScore,
    MinProportion,
    MinCount,
}

impl ThresholdKind {
    /// Configuration key carrying this threshold.
    pub fn field(&self) -> &'static str {
        match self {
            ThresholdKind::MinPassRate => "min_pass_rate",
            ThresholdKind::MinScore => "min_score",
            ThresholdKind::MaxScore => "max_score",
            ThresholdKind::MinProportion => "min_proportion",
            ThresholdKind::MinCount => "min_count",
        }
    }
}

/// A configured threshold value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    MinPassRate(f64),
    MinScore(f64),
    MaxScore(f64),
    MinProportion(f64),
    MinCount(usize),
}

impl Threshold {
    pub fn kind(&self) -> ThresholdKind {
        match self {
            Threshold::MinPassRate(_) => ThresholdKind::MinPassRate,
            Threshold::MinScore(_) => ThresholdKind::MinScore,
            Threshold::MaxScore(_) => ThresholdKind::MaxScore,
            Threshold::MinProportion(_) => ThresholdKind::MinProportion,
            Threshold::MinCount(_) => ThresholdKind::MinCount,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            Threshold::MinPassRate(v)
            | Threshold::MinScore(v)
            | Threshold::MaxScore(v)
            | Threshold::MinProportion(v) => v,
            Threshold::MinCount(c) => c as f64,
        }
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Threshold::MinPassRate(v) | Threshold::MinScore(v) | Threshold::MinProportion(v) => {
                write!(f, "{:.0}%", v * 100.0)
            }
            Threshold::MaxScore(v) => write!(f, "<={:.0}%", v * 100.0),
            Threshold::MinCount(c) => write!(f, "{c}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_signature_collapses_bio_chunks() {
        let a = Prediction::tags(["B-PER", "I-PER", "O", "B-LOC"]);
        let b = Prediction::tags(["O", "B-LOC", "O", "B-PER", "O"]);
        assert_eq!(a.entity_signature(), vec!["LOC", "PER"]);
        assert_eq!(a.entity_signature(), b.entity_signature());
    }

    #[test]
    fn test_entity_signature_counts_adjacent_entities() {
        let p = Prediction::tags(["B-PER", "B-PER", "I-PER"]);
        assert_eq!(p.entity_signature(), vec!["PER", "PER"]);
    }

    #[test]
    fn test_entity_signature_orphan_inside_tag() {
        let p = Prediction::tags(["O", "I-ORG", "I-ORG"]);
        assert_eq!(p.entity_signature(), vec!["ORG"]);
    }

    #[test]
    fn test_entity_signature_classification_label() {
        let p = Prediction::label("positive");
        assert_eq!(p.entity_signature(), vec!["positive"]);
    }

    #[test]
    fn test_top_label_uses_scores() {
        let p = Prediction::new(vec!["neg".into(), "pos".into()], vec![0.2, 0.8]);
        assert_eq!(p.top_label(), Some("pos"));
        let p = Prediction::tags(["neg", "pos"]);
        assert_eq!(p.top_label(), Some("neg"));
    }

    #[test]
    fn test_task_and_category_parse() {
        assert_eq!("ner".parse::<Task>().unwrap(), Task::Ner);
        assert_eq!(
            "text-classification".parse::<Task>().unwrap(),
            Task::TextClassification
        );
        assert!("pos".parse::<Task>().is_err());
        assert_eq!("Bias".parse::<Category>().unwrap(), Category::Bias);
        assert!("speed".parse::<Category>().is_err());
    }

    #[test]
    fn test_malformed_reason() {
        assert_eq!(
            Sample::new("   ").malformed_reason(Task::TextClassification),
            Some("empty text")
        );
        let s = Sample::new("John lives").with_expected(Prediction::tags(["B-PER"]));
        assert!(s.malformed_reason(Task::Ner).is_some());
        assert!(s.malformed_reason(Task::TextClassification).is_none());
    }

    #[test]
    fn test_probe_serialization_is_tagged() {
        let probe = Probe::Subgroup {
            group: "female".into(),
        };
        let json = serde_json::to_string(&probe).unwrap();
        assert_eq!(json, r#"{"kind":"subgroup","group":"female"}"#);
    }

    #[test]
    fn test_threshold_display() {
        assert_eq!(Threshold::MinPassRate(0.65).to_string(), "65%");
        assert_eq!(Threshold::MaxScore(0.9).to_string(), "<=90%");
        assert_eq!(Threshold::MinCount(12).to_string(), "12");
    }

    #[test]
    fn test_threshold_serializes_as_config_key() {
        let json = serde_json::to_string(&Threshold::MinProportion(0.1)).unwrap();
        assert_eq!(json, r#"{"min_proportion":0.1}"#);
        assert_eq!(Threshold::MinProportion(0.1).kind().field(), "min_proportion");
    }

    #[test]
    fn test_model_inputs() {
        let case = TestCase {
            id: 0,
            transform: "uppercase".into(),
            category: Category::Robustness,
            record: Some(0),
            original: "hi there".into(),
            probe: Probe::Perturbed {
                text: "HI THERE".into(),
                edits: Vec::new(),
            },
            expected: None,
        };
        assert_eq!(case.model_inputs(), vec!["hi there", "HI THERE"]);
        assert!(case.needs_model());
    }
}
