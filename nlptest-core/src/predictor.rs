//! The prediction boundary: the model under test behind an async trait.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::PredictError;
use crate::types::{OUTSIDE_TAG, Prediction, Task};

/// The model under test. Implementations must return exactly one
/// prediction per input text, in input order.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str {
        "predictor"
    }

    /// Predict a batch of texts.
    async fn predict_batch(&self, texts: &[String]) -> Result<Vec<Prediction>, PredictError>;

    /// Predict a single text.
    async fn predict(&self, text: &str) -> Result<Prediction, PredictError> {
        let mut out = self.predict_batch(&[text.to_string()]).await?;
        match out.len() {
            1 => Ok(out.remove(0)),
            actual => Err(PredictError::LengthMismatch {
                expected: 1,
                actual,
            }),
        }
    }
}

type PredictFn = dyn Fn(&str) -> Prediction + Send + Sync;

/// An in-process predictor for testing and development.
///
/// Answers with a user-supplied function, optionally after a delay, and
/// records every text it was asked about.
pub struct MockPredictor {
    predict_fn: Box<PredictFn>,
    delay: Option<Duration>,
    failure: Option<String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl MockPredictor {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str) -> Prediction + Send + Sync + 'static,
    {
        Self {
            predict_fn: Box::new(f),
            delay: None,
            failure: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A model whose output never depends on its input: one fixed label for
    /// classification, all-outside tags for NER.
    pub fn identity(task: Task) -> Self {
        match task {
            Task::TextClassification => Self::from_fn(|_| Prediction::label("neutral")),
            Task::Ner => Self::from_fn(|text| {
                Prediction::tags(text.split_whitespace().map(|_| OUTSIDE_TAG))
            }),
        }
    }

    /// Delay every call, e.g. to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with a request error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Number of `predict_batch` calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every text received so far, in arrival order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Predictor for MockPredictor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn predict_batch(&self, texts: &[String]) -> Result<Vec<Prediction>, PredictError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.extend(texts.iter().cloned());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(PredictError::Request {
                message: message.clone(),
            });
        }
        Ok(texts.iter().map(|t| (self.predict_fn)(t)).collect())
    }
}
