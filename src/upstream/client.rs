//! Replicate-compatible HTTP client.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::error::UpstreamError;
use super::models::{
    ModelRef, ModelSummary, Prediction, PredictionStatus, RawModel, RawPrediction, SearchHit,
    SearchResponse,
};
use super::{ImageApi, PredictionObserver};
use crate::config::UpstreamConfig;
use crate::errors::{Error, Result};
use crate::mcp::cancellation::CancellationToken;

/// Asks the upstream to hold the create call open until the prediction finishes
const PREFER_WAIT: &str = "wait";

pub struct ReplicateClient {
    http: Client,
    base_url: Url,
    poll_interval: Duration,
    max_wait: Duration,
    search_limit: usize,
}

impl ReplicateClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::config(format!("Invalid upstream base URL '{}': {}", config.base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
            search_limit: config.search_limit,
        })
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, UpstreamError> {
        self.base_url
            .join(path)
            .map_err(|e| UpstreamError::Request(format!("invalid upstream path '{}': {}", path, e)))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, UpstreamError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(UpstreamError::from_response(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    async fn fetch_input_schema(
        &self,
        owner: &str,
        name: &str,
        credential: &str,
    ) -> std::result::Result<Option<Value>, UpstreamError> {
        let url = self.endpoint(&format!("v1/models/{}/{}", owner, name))?;
        let model: RawModel = self.send_json(self.http.get(url).bearer_auth(credential)).await?;
        Ok(model.input_schema())
    }

    async fn summarize(&self, model: RawModel, credential: &str) -> ModelSummary {
        let input_schema = match self.fetch_input_schema(&model.owner, &model.name, credential).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!(model = %format!("{}/{}", model.owner, model.name), error = %e, "Failed to fetch model schema");
                None
            }
        };

        ModelSummary {
            owner: model.owner,
            name: model.name,
            description: model.description,
            run_count: model.run_count,
            input_schema,
        }
    }

    async fn create_prediction(
        &self,
        model: &ModelRef,
        input: Value,
        credential: &str,
    ) -> std::result::Result<Prediction, UpstreamError> {
        let (url, body) = match &model.version {
            Some(version) => (self.endpoint("v1/predictions")?, json!({"version": version, "input": input})),
            None => (
                self.endpoint(&format!("v1/models/{}/{}/predictions", model.owner, model.name))?,
                json!({"input": input}),
            ),
        };

        let request = self.http.post(url).bearer_auth(credential).header("Prefer", PREFER_WAIT).json(&body);
        let raw: RawPrediction = self.send_json(request).await?;
        let prediction = Prediction::from(raw);
        info!(model = %model, prediction_id = %prediction.id, status = %prediction.status, "Created prediction");
        Ok(prediction)
    }

    async fn get_prediction(&self, id: &str, credential: &str) -> std::result::Result<Prediction, UpstreamError> {
        let url = self.endpoint(&format!("v1/predictions/{}", id))?;
        let raw: RawPrediction = self.send_json(self.http.get(url).bearer_auth(credential)).await?;
        Ok(raw.into())
    }

    async fn cancel_prediction(&self, id: &str, credential: &str) -> std::result::Result<Prediction, UpstreamError> {
        let url = self.endpoint(&format!("v1/predictions/{}/cancel", id))?;
        let raw: RawPrediction = self.send_json(self.http.post(url).bearer_auth(credential)).await?;
        Ok(raw.into())
    }

    /// Cancel upstream and report the prediction as canceled either way
    async fn abandon(&self, prediction: Prediction, credential: &str) -> Prediction {
        let latest = match self.cancel_prediction(&prediction.id, credential).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(prediction_id = %prediction.id, error = %e, "Failed to cancel upstream prediction");
                prediction
            }
        };
        Prediction { status: PredictionStatus::Canceled, ..latest }
    }
}

#[async_trait]
impl ImageApi for ReplicateClient {
    async fn search(&self, query: &str, credential: &str) -> std::result::Result<Vec<ModelSummary>, UpstreamError> {
        let url = self.endpoint("v1/search")?;
        let request = self
            .http
            .get(url)
            .bearer_auth(credential)
            .query(&[("query", query.to_string()), ("limit", self.search_limit.to_string())]);

        let response: SearchResponse = self.send_json(request).await?;
        let models: Vec<RawModel> = response
            .models
            .into_iter()
            .map(SearchHit::into_model)
            .take(self.search_limit)
            .collect();

        debug!(query = %query, hits = models.len(), "Model search returned");
        Ok(join_all(models.into_iter().map(|model| self.summarize(model, credential))).await)
    }

    async fn run(
        &self,
        model: &ModelRef,
        input: Value,
        credential: &str,
        cancel: &CancellationToken,
        observer: PredictionObserver<'_>,
    ) -> std::result::Result<Prediction, UpstreamError> {
        let started = Instant::now();

        if cancel.is_cancelled() {
            return Err(UpstreamError::Canceled);
        }

        let create = self.create_prediction(model, input, credential);
        tokio::pin!(create);
        let mut prediction = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // The upstream may already have accepted the request; let it
                // answer (bounded by the client timeout) so the id can be canceled.
                return match create.await {
                    Ok(created) => {
                        info!(prediction_id = %created.id, "Canceling prediction created after cancel request");
                        Ok(self.abandon(created, credential).await)
                    }
                    Err(e) => {
                        debug!(error = %e, "Prediction create failed after cancel request");
                        Err(UpstreamError::Canceled)
                    }
                };
            }
            created = &mut create => created?,
        };

        loop {
            observer(&prediction);
            if prediction.status.is_terminal() {
                return Ok(prediction);
            }

            if started.elapsed() >= self.max_wait {
                warn!(prediction_id = %prediction.id, "Prediction exceeded max wait; canceling");
                let id = prediction.id.clone();
                self.abandon(prediction, credential).await;
                return Err(UpstreamError::Timeout(format!(
                    "prediction {} did not finish within {}s",
                    id,
                    self.max_wait.as_secs()
                )));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(prediction_id = %prediction.id, "Canceling prediction on request");
                    return Ok(self.abandon(prediction, credential).await);
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let id = prediction.id.clone();
            prediction = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(prediction_id = %id, "Canceling prediction on request");
                    return Ok(self.abandon(prediction, credential).await);
                }
                latest = self.get_prediction(&id, credential) => latest?,
            };
        }
    }
}
