//! Upstream image-generation API.
//!
//! [`ImageApi`] is the narrow seam tool handlers depend on: search models, and
//! run a model to completion. [`ReplicateClient`] implements it over HTTP.

pub mod client;
pub mod error;
pub mod models;

use async_trait::async_trait;
use serde_json::Value;

use crate::mcp::cancellation::CancellationToken;

pub use client::ReplicateClient;
pub use error::{is_rate_limit_text, UpstreamError};
pub use models::{ModelRef, ModelSummary, Prediction, PredictionStatus};

/// Callback invoked with every prediction state the client observes
pub type PredictionObserver<'a> = &'a (dyn Fn(&Prediction) + Send + Sync);

#[async_trait]
pub trait ImageApi: Send + Sync {
    /// Find models matching `query`. Schema lookups that fail leave
    /// `input_schema` empty instead of failing the search.
    async fn search(&self, query: &str, credential: &str) -> Result<Vec<ModelSummary>, UpstreamError>;

    /// Run `model` on `input` until the prediction reaches a terminal status.
    ///
    /// When `cancel` fires mid-flight the upstream prediction is canceled and
    /// returned with status `canceled`.
    async fn run(
        &self,
        model: &ModelRef,
        input: Value,
        credential: &str,
        cancel: &CancellationToken,
        observer: PredictionObserver<'_>,
    ) -> Result<Prediction, UpstreamError>;
}
