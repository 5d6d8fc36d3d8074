//! `generate_image`: run a model and return the image URLs it produced.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::mcp::error::McpError;
use crate::mcp::protocol::ToolCallResult;
use crate::mcp::tool_registry::{ToolContext, ToolDefinition, ToolHandler};
use crate::upstream::{is_rate_limit_text, ImageApi, ModelRef, Prediction, PredictionStatus, UpstreamError};

pub const GENERATE_IMAGE: &str = "generate_image";

/// Accepted model ids: `owner/name` or `owner/name:version`
pub const MODEL_ID_PATTERN: &str = r"^[\w.-]+/[\w.-]+(:[\w]+)?$";

#[derive(Debug, Deserialize)]
struct GenerateImageArgs {
    model: String,
    input: Value,
}

pub fn definition(api: Arc<dyn ImageApi>) -> ToolDefinition {
    ToolDefinition::new(
        GENERATE_IMAGE,
        "Generate images with a model from the image-generation API. Use search_models first to \
         find a model and the shape of its input. Returns the URLs of the generated images.",
        json!({
            "type": "object",
            "properties": {
                "model": {
                    "type": "string",
                    "pattern": MODEL_ID_PATTERN,
                    "description": "Model id as owner/name, optionally pinned to a version with owner/name:version"
                },
                "input": {
                    "type": "object",
                    "description": "Model input matching the model's input schema, e.g. {\"prompt\": \"a red fox\"}"
                }
            },
            "required": ["model", "input"],
            "additionalProperties": false
        }),
        Arc::new(GenerateImageTool::new(api)),
    )
    .with_title("Generate image")
}

pub struct GenerateImageTool {
    api: Arc<dyn ImageApi>,
}

impl GenerateImageTool {
    pub fn new(api: Arc<dyn ImageApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ToolHandler for GenerateImageTool {
    async fn call(&self, arguments: Value, context: ToolContext) -> Result<ToolCallResult, McpError> {
        let args: GenerateImageArgs = serde_json::from_value(arguments)
            .map_err(|e| McpError::InvalidParams(format!("Invalid generate_image arguments: {}", e)))?;

        let Some(credential) = context.credential.as_deref() else {
            warn!("generate_image called without an upstream credential");
            return Ok(super::missing_credential());
        };

        let model = match ModelRef::parse(&args.model) {
            Ok(model) => model,
            Err(e) => return Ok(ToolCallResult::error(e.to_string())),
        };

        if context.is_cancelled() {
            return Err(McpError::Cancelled);
        }

        let observed = AtomicU64::new(0);
        let observer = |prediction: &Prediction| {
            let step = observed.fetch_add(1, Ordering::Relaxed) + 1;
            context.report_progress(
                step as f64,
                None,
                Some(format!("Prediction {} is {}", prediction.id, prediction.status)),
            );
        };

        let outcome = self.api.run(&model, args.input, credential, &context.cancellation, &observer).await;
        Ok(describe_outcome(&model, outcome))
    }
}

fn describe_outcome(model: &ModelRef, outcome: Result<Prediction, UpstreamError>) -> ToolCallResult {
    let prediction = match outcome {
        Ok(prediction) => prediction,
        Err(UpstreamError::RateLimited(detail)) => return super::rate_limited(&detail),
        Err(UpstreamError::Canceled) => return canceled(None),
        Err(e) => {
            warn!(model = %model, error = %e, "Image generation failed");
            return ToolCallResult::error(format!("Image generation failed: {}", e));
        }
    };

    match prediction.status {
        PredictionStatus::Succeeded if prediction.output.is_empty() => ToolCallResult::error(format!(
            "Model {} finished without returning any images (prediction {}).",
            model, prediction.id
        )),
        PredictionStatus::Succeeded => {
            info!(
                model = %model,
                prediction_id = %prediction.id,
                images = prediction.output.len(),
                "Image generation succeeded"
            );
            ToolCallResult::text(success_text(model, &prediction))
        }
        PredictionStatus::Failed => {
            let error = prediction.error.as_deref().unwrap_or("no error details were provided");
            if is_rate_limit_text(error) {
                super::rate_limited(error)
            } else {
                ToolCallResult::error(format!("Image generation failed: {}", error))
            }
        }
        PredictionStatus::Canceled => canceled(Some(&prediction.id)),
        other => ToolCallResult::error(format!(
            "Prediction {} ended in unexpected status '{}'.",
            prediction.id, other
        )),
    }
}

fn success_text(model: &ModelRef, prediction: &Prediction) -> String {
    let count = prediction.output.len();
    let mut lines = vec![format!(
        "Generated {} image{} with {}:",
        count,
        if count == 1 { "" } else { "s" },
        model
    )];
    lines.extend(prediction.output.iter().cloned());
    if let Some(seconds) = prediction.predict_time {
        lines.push(format!("Generated in {}s", seconds));
    }
    lines.join("\n")
}

fn canceled(prediction_id: Option<&str>) -> ToolCallResult {
    match prediction_id {
        Some(id) => ToolCallResult::error(format!("Image generation was canceled (prediction {}).", id)),
        None => ToolCallResult::error("Image generation was canceled."),
    }
}
