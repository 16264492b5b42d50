//! Error types for the nlptest core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering configuration, the transform registry, prediction, persistence,
//! dataset loading and harness lifecycle.

use std::path::PathBuf;

use crate::types::{Category, Task};

/// Top-level error type for the nlptest core library.
#[derive(Debug, thiserror::Error)]
pub enum NlpTestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Prediction error: {0}")]
    Predict(#[from] PredictError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Harness error: {0}")]
    Harness(#[from] HarnessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from test configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown transform '{name}' is not registered")]
    UnknownTransform { name: String },

    #[error("Transform '{name}' is configured under '{configured}' but belongs to '{registered}'")]
    CategoryMismatch {
        name: String,
        configured: Category,
        registered: Category,
    },

    #[error("Transform '{name}' requires '{field}'")]
    MissingThreshold { name: String, field: &'static str },

    #[error("Transform '{name}': '{field}' must be within [0, 1], got {value}")]
    OutOfRange {
        name: String,
        field: &'static str,
        value: f64,
    },

    #[error("Transform '{name}' does not support task '{task}'")]
    UnsupportedTask { name: String, task: Task },

    #[error("Invalid parameters for transform '{name}': {reason}")]
    InvalidParameters { name: String, reason: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from perturbation registration and lookup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown transform: {name}")]
    UnknownTransform { name: String },

    #[error("Transform already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Transform '{name}' cannot be registered under category '{category}'")]
    InvalidCategory { name: String, category: Category },
}

/// Errors crossing the prediction boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PredictError {
    #[error("Prediction timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Prediction request failed: {message}")]
    Request { message: String },

    #[error("Prediction response could not be parsed: {message}")]
    Response { message: String },

    #[error("Predictor returned {actual} predictions for {expected} texts")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Errors from saving and loading a persisted run.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("File '{file}' is missing from saved run at {dir}")]
    MissingFile { dir: PathBuf, file: String },

    #[error("Saved run has format version {found}, expected {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },

    #[error("Checksum mismatch for '{file}'")]
    ChecksumMismatch { file: String },

    #[error("File '{file}' is corrupted: {message}")]
    Corrupted { file: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from dataset loading and export.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Unsupported dataset format: '{extension}'")]
    UnsupportedFormat { extension: String },

    #[error("{format} datasets cannot be used for task '{task}'")]
    TaskMismatch { format: &'static str, task: Task },

    #[error("Missing column '{column}' (available: {available})")]
    MissingColumn { column: String, available: String },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from calling harness stages out of order.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Test cases have not been generated yet; call generate() first")]
    NotGenerated,

    #[error("Tests have not been run yet; call run() first")]
    NotRun,

    #[error("No report is available; call report() first")]
    NotReported,
}

/// A type alias for results using the top-level `NlpTestError`.
pub type Result<T> = std::result::Result<T, NlpTestError>;
