//! HTTP predictor: forwards batches to a model served behind a JSON endpoint.
//!
//! Request: `POST <endpoint>` with `{"texts": ["...", ...]}`.
//! Response: `[{"labels": [...], "scores": [...]}, ...]`, one entry per text,
//! either bare or wrapped as `{"predictions": [...]}`.

use async_trait::async_trait;
use nlptest_core::config::PredictorSettings;
use nlptest_core::error::PredictError;
use nlptest_core::predictor::Predictor;
use nlptest_core::types::Prediction;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Serialize)]
struct PredictRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PredictResponse {
    Bare(Vec<Prediction>),
    Wrapped { predictions: Vec<Prediction> },
}

/// A predictor reached over HTTP.
pub struct HttpPredictor {
    client: Client,
    endpoint: String,
    headers: BTreeMap<String, String>,
}

impl HttpPredictor {
    pub fn new(endpoint: impl Into<String>, headers: BTreeMap<String, String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            headers,
        }
    }

    /// Build from settings; `endpoint` overrides the configured one.
    pub fn from_settings(settings: &PredictorSettings, endpoint: Option<&str>) -> Option<Self> {
        let endpoint = endpoint.or(settings.endpoint.as_deref())?;
        Some(Self::new(endpoint, settings.headers.clone()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn parse_predictions(body: &str) -> Result<Vec<Prediction>, PredictError> {
    let response: PredictResponse =
        serde_json::from_str(body).map_err(|e| PredictError::Response {
            message: format!("Invalid JSON in response: {}", e),
        })?;
    Ok(match response {
        PredictResponse::Bare(predictions) => predictions,
        PredictResponse::Wrapped { predictions } => predictions,
    })
}

#[async_trait]
impl Predictor for HttpPredictor {
    fn name(&self) -> &str {
        "http"
    }

    async fn predict_batch(&self, texts: &[String]) -> Result<Vec<Prediction>, PredictError> {
        debug!(url = self.endpoint.as_str(), texts = texts.len(), "Sending prediction request");

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json");
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        let response = request
            .json(&PredictRequest { texts })
            .send()
            .await
            .map_err(|e| PredictError::Request {
                message: format!("Request to {} failed: {}", self.endpoint, e),
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| PredictError::Response {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(PredictError::Request {
                message: format!("HTTP {}: {}", status, body_text.trim()),
            });
        }

        parse_predictions(&body_text)
    }
}
