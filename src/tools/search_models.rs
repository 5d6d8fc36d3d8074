//! `search_models`: find upstream models and show how to call them.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

use crate::mcp::error::McpError;
use crate::mcp::protocol::ToolCallResult;
use crate::mcp::tool_registry::{ToolContext, ToolDefinition, ToolHandler};
use crate::upstream::{ImageApi, ModelSummary, UpstreamError};

pub const SEARCH_MODELS: &str = "search_models";

#[derive(Debug, Deserialize)]
struct SearchModelsArgs {
    query: String,
}

pub fn definition(api: Arc<dyn ImageApi>) -> ToolDefinition {
    ToolDefinition::new(
        SEARCH_MODELS,
        "Search the image-generation API for models matching a free-text query. Returns each \
         model's id (owner/name), run count, description and the JSON schema of its input, which \
         is what generate_image expects as `input`.",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "description": "What to look for, e.g. \"photorealistic portrait\" or \"flux\""
                }
            },
            "required": ["query"]
        }),
        Arc::new(SearchModelsTool::new(api)),
    )
    .with_title("Search models")
}

pub struct SearchModelsTool {
    api: Arc<dyn ImageApi>,
}

impl SearchModelsTool {
    pub fn new(api: Arc<dyn ImageApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ToolHandler for SearchModelsTool {
    async fn call(&self, arguments: Value, context: ToolContext) -> Result<ToolCallResult, McpError> {
        let args: SearchModelsArgs = serde_json::from_value(arguments)
            .map_err(|e| McpError::InvalidParams(format!("Invalid search_models arguments: {}", e)))?;

        let Some(credential) = context.credential.as_deref() else {
            warn!("search_models called without an upstream credential");
            return Ok(super::missing_credential());
        };

        match self.api.search(&args.query, credential).await {
            Ok(models) => {
                info!(query = %args.query, results = models.len(), "Model search completed");
                Ok(ToolCallResult::text(format_models(&args.query, &models)))
            }
            Err(UpstreamError::RateLimited(detail)) => Ok(super::rate_limited(&detail)),
            Err(e) => {
                warn!(query = %args.query, error = %e, "Model search failed");
                Ok(ToolCallResult::error(format!("Model search failed: {}", e)))
            }
        }
    }
}

fn format_models(query: &str, models: &[ModelSummary]) -> String {
    if models.is_empty() {
        return format!("No models found matching \"{}\".", query);
    }

    let mut text = format!(
        "Found {} model{} matching \"{}\":\n",
        models.len(),
        if models.len() == 1 { "" } else { "s" },
        query
    );

    for (index, model) in models.iter().enumerate() {
        let _ = write!(text, "\n{}. {} ({} runs)", index + 1, model.id(), model.run_count);
        if let Some(description) = model.description.as_deref().filter(|d| !d.trim().is_empty()) {
            let _ = write!(text, "\n   {}", description.trim());
        }
        match &model.input_schema {
            Some(schema) => {
                let _ = write!(text, "\n   Input schema: {}", schema);
            }
            None => text.push_str("\n   Input schema unavailable"),
        }
        text.push('\n');
    }

    text
}
