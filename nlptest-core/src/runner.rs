//! Evaluation Runner: sends test-case inputs through the model under test.
//!
//! Test cases are grouped into batches; batches run on a bounded pool of
//! tokio tasks gated by a semaphore. Each predictor call carries its own
//! timeout. A failed or timed-out call fails every case of its batch and the
//! run continues. Partial results are merged and ordered by test-case id.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::RunnerSettings;
use crate::error::PredictError;
use crate::predictor::Predictor;
use crate::types::{EvaluationResult, Prediction, TestCase};

/// One case of a batch: its id, and how many consecutive inputs it owns.
#[derive(Debug, Clone, Copy)]
struct Slot {
    id: u64,
    inputs: usize,
}

/// Runs test cases against a predictor.
pub struct EvaluationRunner {
    predictor: Arc<dyn Predictor>,
    max_concurrency: usize,
    batch_size: usize,
    timeout: Duration,
}

impl EvaluationRunner {
    pub fn new(predictor: Arc<dyn Predictor>, settings: &RunnerSettings) -> Self {
        Self {
            predictor,
            max_concurrency: settings.max_concurrency.max(1),
            batch_size: settings.batch_size.max(1),
            timeout: settings.timeout(),
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Evaluate every case, returning one result per case ordered by id.
    ///
    /// Results carry model outputs only; `passed` is left for the judge.
    /// Representation cases are answered without calling the model.
    pub async fn run(&self, cases: &[TestCase]) -> Vec<EvaluationResult> {
        let start = Instant::now();
        let mut results: Vec<EvaluationResult> = cases
            .iter()
            .filter(|c| !c.needs_model())
            .map(|c| EvaluationResult::pending(c.id))
            .collect();

        let model_cases: Vec<&TestCase> = cases.iter().filter(|c| c.needs_model()).collect();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::new();

        for (batch_no, chunk) in model_cases.chunks(self.batch_size).enumerate() {
            let slots: Vec<Slot> = chunk
                .iter()
                .map(|c| Slot {
                    id: c.id,
                    inputs: c.model_inputs().len(),
                })
                .collect();
            let texts: Vec<String> = chunk
                .iter()
                .flat_map(|c| c.model_inputs())
                .map(String::from)
                .collect();
            let predictor = self.predictor.clone();
            let sem = semaphore.clone();
            let timeout = self.timeout;

            let task_slots = slots.clone();
            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await.unwrap();
                debug!(batch = batch_no, texts = texts.len(), "Evaluating batch");
                let outcome =
                    match tokio::time::timeout(timeout, predictor.predict_batch(&texts)).await {
                        Ok(Ok(predictions)) if predictions.len() == texts.len() => Ok(predictions),
                        Ok(Ok(predictions)) => Err(PredictError::LengthMismatch {
                            expected: texts.len(),
                            actual: predictions.len(),
                        }),
                        Ok(Err(e)) => Err(e),
                        Err(_) => Err(PredictError::Timeout {
                            timeout_ms: timeout.as_millis() as u64,
                        }),
                    };
                match outcome {
                    Ok(predictions) => distribute(&task_slots, predictions),
                    Err(e) => {
                        warn!(batch = batch_no, cases = task_slots.len(), error = %e, "Batch evaluation failed");
                        fail_all(&task_slots, &e.to_string())
                    }
                }
            });
            handles.push((slots, handle));
        }

        let (slot_lists, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let joined = futures::future::join_all(tasks).await;
        for (slots, outcome) in slot_lists.into_iter().zip(joined) {
            match outcome {
                Ok(partial) => results.extend(partial),
                Err(e) => {
                    warn!(error = %e, "Evaluation task panicked");
                    results.extend(fail_all(&slots, &format!("evaluation task failed: {e}")));
                }
            }
        }

        results.sort_by_key(|r| r.test_case_id);
        let failed = results.iter().filter(|r| r.error.is_some()).count();
        info!(
            cases = results.len(),
            failed,
            predictor = self.predictor.name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Evaluation finished"
        );
        results
    }
}

/// Hand consecutive predictions back to the cases that asked for them.
fn distribute(slots: &[Slot], predictions: Vec<Prediction>) -> Vec<EvaluationResult> {
    let mut predictions = predictions.into_iter();
    slots
        .iter()
        .map(|slot| {
            let mut result = EvaluationResult::pending(slot.id);
            result.original_output = predictions.next();
            if slot.inputs > 1 {
                result.perturbed_output = predictions.next();
            }
            result
        })
        .collect()
}

fn fail_all(slots: &[Slot], error: &str) -> Vec<EvaluationResult> {
    slots
        .iter()
        .map(|slot| EvaluationResult::failed(slot.id, error))
        .collect()
}
