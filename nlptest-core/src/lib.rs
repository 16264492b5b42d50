//! # nlptest Core
//!
//! Core library for nlptest, a harness that checks NLP models for
//! robustness, bias, representation, accuracy and fairness.
//! Provides the perturbation registry, test-case generation, the evaluation
//! runner, pass/fail judging, reporting and run persistence.

pub mod augment;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod harness;
pub mod judge;
pub mod metrics;
pub mod persistence;
pub mod perturbation;
pub mod predictor;
pub mod report;
pub mod runner;
pub mod subgroup;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{HarnessSettings, RunnerSettings, TestConfig, TransformSpec, load_settings};
pub use dataset::{export_dataset, load_dataset};
pub use engine::{Generation, TransformEngine};
pub use error::{
    ConfigError, DatasetError, HarnessError, NlpTestError, PersistError, PredictError,
    RegistryError, Result,
};
pub use harness::Harness;
pub use metrics::Metric;
pub use perturbation::{Perturbation, PerturbationRegistry, TransformParams, Variant};
pub use predictor::{MockPredictor, Predictor};
pub use report::{CategoryReport, Report};
pub use runner::EvaluationRunner;
pub use types::{
    Category, EvaluationResult, Prediction, Probe, Sample, Task, TestCase, Threshold,
};
