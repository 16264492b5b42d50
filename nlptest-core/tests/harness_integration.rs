//! Integration tests for the nlptest harness.
//!
//! These tests drive the full generate → run → report → save → load cycle
//! with in-process mock predictors.

use nlptest_core::config::{HarnessSettings, RunnerSettings, TestConfig};
use nlptest_core::error::{NlpTestError, PersistError};
use nlptest_core::persistence::{REPORT_FILE, RESULTS_FILE, SPECS_FILE, TEST_CASES_FILE};
use nlptest_core::predictor::MockPredictor;
use nlptest_core::types::{Category, Prediction, Sample, Task};
use nlptest_core::{Harness, load_dataset};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const NER_SUITE: &str = r#"
defaults:
  min_pass_rate: 0.7
tests:
  robustness:
    uppercase: {}
    add_punctuation:
      parameters:
        whitelist: ["!", "?"]
    swap_entities:
      min_pass_rate: 0.5
  bias:
    replace_to_female_pronouns: {}
  representation:
    min_gender_representation_count:
      min_count: 1
  accuracy:
    min_micro_f1_score:
      min_score: 0.6
"#;

fn ner_data() -> Vec<Sample> {
    vec![
        Sample::new("John lives in Paris").with_expected(Prediction::tags(["B-PER", "O", "O", "B-LOC"])),
        Sample::new("He works for Globex").with_expected(Prediction::tags(["O", "O", "O", "B-ORG"])),
        Sample::new("She met Maria Lopez in Lisbon")
            .with_expected(Prediction::tags(["O", "O", "B-PER", "I-PER", "O", "B-LOC"])),
        Sample::new("   "),
    ]
}

/// Tags capitalized words as persons, the way a naive model would.
fn capital_tagger() -> MockPredictor {
    MockPredictor::from_fn(|text| {
        Prediction::tags(text.split_whitespace().enumerate().map(|(i, w)| {
            if i > 0 && w.chars().next().is_some_and(char::is_uppercase) {
                "B-PER"
            } else {
                "O"
            }
        }))
    })
}

fn ner_harness() -> Harness {
    Harness::new(
        Task::Ner,
        ner_data(),
        TestConfig::from_yaml(NER_SUITE).unwrap(),
        HarnessSettings::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_full_cycle_ner() {
    let mut harness = ner_harness();
    let cases = harness.generate().unwrap().to_vec();
    assert!(!cases.is_empty());
    let ids: Vec<u64> = cases.iter().map(|c| c.id).collect();
    assert_eq!(ids, (0..cases.len() as u64).collect::<Vec<_>>());
    assert_eq!(harness.skipped().unwrap()["uppercase"], 1);

    harness.run(Arc::new(capital_tagger())).await.unwrap();
    let report = harness.report().unwrap().clone();

    let categories: Vec<Category> = report.entries.iter().map(|e| e.category).collect();
    assert!(categories.windows(2).all(|w| w[0] <= w[1]));

    let upper = report.get("uppercase").unwrap();
    assert_eq!(upper.total(), 3);
    assert!(!upper.passed);

    let punct = report.get("add_punctuation").unwrap();
    assert_eq!(punct.pass_rate, 1.0);
    assert!(punct.passed);

    let representation = report.get("min_gender_representation_count").unwrap();
    assert!(representation.total() >= 2);
    assert!(!report.passed());
}

#[tokio::test]
async fn test_save_load_reproduces_run() {
    let dir = TempDir::new().unwrap();
    let mut harness = ner_harness();
    harness.generate().unwrap();
    harness.run(Arc::new(capital_tagger())).await.unwrap();
    harness.report().unwrap();
    harness.save(dir.path()).unwrap();

    let cases_bytes = std::fs::read(dir.path().join(TEST_CASES_FILE)).unwrap();
    let report_bytes = std::fs::read(dir.path().join(REPORT_FILE)).unwrap();
    let specs_bytes = std::fs::read(dir.path().join(SPECS_FILE)).unwrap();

    let loaded = Harness::load(dir.path(), HarnessSettings::default()).unwrap();
    assert_eq!(loaded.run_id(), harness.run_id());
    assert_eq!(loaded.specs(), harness.specs());
    assert_eq!(loaded.testcases().unwrap(), harness.testcases().unwrap());
    assert_eq!(loaded.generated_results().unwrap(), harness.generated_results().unwrap());
    assert_eq!(loaded.last_report(), harness.last_report());

    let again = TempDir::new().unwrap();
    loaded.save(again.path()).unwrap();
    assert_eq!(std::fs::read(again.path().join(TEST_CASES_FILE)).unwrap(), cases_bytes);
    assert_eq!(std::fs::read(again.path().join(REPORT_FILE)).unwrap(), report_bytes);
    assert_eq!(std::fs::read(again.path().join(SPECS_FILE)).unwrap(), specs_bytes);
}

#[tokio::test]
async fn test_loaded_run_can_be_evaluated_again() {
    let dir = TempDir::new().unwrap();
    let mut harness = ner_harness();
    harness.generate().unwrap();
    harness.save(dir.path()).unwrap();
    assert!(!dir.path().join(RESULTS_FILE).exists());

    let mut loaded = Harness::load(dir.path(), HarnessSettings::default()).unwrap();
    let before = loaded.testcases().unwrap().to_vec();
    loaded
        .run(Arc::new(MockPredictor::identity(Task::Ner)))
        .await
        .unwrap();
    assert_eq!(loaded.testcases().unwrap(), &before[..]);
    let report = loaded.report().unwrap();
    assert_eq!(report.get("uppercase").unwrap().pass_rate, 1.0);
}

#[test]
fn test_tampered_run_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut harness = ner_harness();
    harness.generate().unwrap();
    harness.save(dir.path()).unwrap();

    let path = dir.path().join(TEST_CASES_FILE);
    let mut content = std::fs::read_to_string(&path).unwrap();
    content = content.replacen("Paris", "Berlin", 1);
    std::fs::write(&path, content).unwrap();

    let err = Harness::load(dir.path(), HarnessSettings::default()).err().unwrap();
    assert!(matches!(
        err,
        NlpTestError::Persist(PersistError::ChecksumMismatch { .. })
    ));
}

#[tokio::test]
async fn test_timeouts_fail_cases_without_aborting() {
    let settings = HarnessSettings {
        runner: RunnerSettings {
            max_concurrency: 2,
            batch_size: 2,
            timeout_secs: 1,
        },
        ..HarnessSettings::default()
    };
    let mut harness = Harness::new(
        Task::TextClassification,
        vec![
            Sample::new("great film").with_expected(Prediction::label("pos")),
            Sample::new("awful plot").with_expected(Prediction::label("neg")),
        ],
        TestConfig::from_yaml("tests:\n  robustness:\n    uppercase: {}\n").unwrap(),
        settings,
    )
    .unwrap();
    harness.generate().unwrap();

    let slow = MockPredictor::identity(Task::TextClassification).with_delay(Duration::from_secs(3));
    let results = harness.run(Arc::new(slow)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| !r.passed && r.error.is_some()));

    let report = harness.report().unwrap();
    assert_eq!(report.entries[0].fail_count, 2);
    assert!(!report.passed());
}

#[tokio::test]
async fn test_augment_writes_training_data() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("train.csv");
    std::fs::write(
        &input,
        "text,label\ngreat film,pos\nawful plot,neg\nfine acting,pos\nboring start,neg\n",
    )
    .unwrap();

    let data = load_dataset(&input, Task::TextClassification).unwrap();
    let mut harness = Harness::new(
        Task::TextClassification,
        data,
        TestConfig::from_yaml("tests:\n  robustness:\n    uppercase: {min_pass_rate: 0.9}\n").unwrap(),
        HarnessSettings::default(),
    )
    .unwrap();
    harness.generate().unwrap();
    // Upper-case input confuses this model.
    let model = MockPredictor::from_fn(|text| {
        Prediction::label(if text.chars().any(|c| c.is_ascii_uppercase()) { "neg" } else { "pos" })
    });
    harness.run(Arc::new(model)).await.unwrap();
    assert!(!harness.report().unwrap().passed());

    let output = dir.path().join("augmented.csv");
    let added = harness.augment(&input, &output, 1.0).unwrap();
    assert!(added > 0);
    let augmented = load_dataset(&output, Task::TextClassification).unwrap();
    assert_eq!(augmented.len(), 4 + added);
    assert!(augmented[4..].iter().all(|s| s.text == s.text.to_uppercase()));
}
