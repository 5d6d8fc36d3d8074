//! Tool table exposed over MCP.
//!
//! Both tools talk to the upstream through [`ImageApi`] and report upstream
//! failures as `isError` results with remediation text.

pub mod generate_image;
pub mod search_models;

use std::sync::Arc;

use crate::config::{ENV_UPSTREAM_TOKEN, ENV_UPSTREAM_TOKEN_FALLBACK};
use crate::mcp::error::McpError;
use crate::mcp::protocol::ToolCallResult;
use crate::mcp::tool_registry::{ToolDefinition, ToolRegistry};
use crate::upstream::ImageApi;

pub use generate_image::{GenerateImageTool, GENERATE_IMAGE};
pub use search_models::{SearchModelsTool, SEARCH_MODELS};

/// All tool definitions, in listing order
pub fn definitions(api: Arc<dyn ImageApi>) -> Vec<ToolDefinition> {
    vec![search_models::definition(api.clone()), generate_image::definition(api)]
}

/// Validated registry over [`definitions`]
pub fn build_registry(api: Arc<dyn ImageApi>) -> Result<ToolRegistry, McpError> {
    ToolRegistry::new(definitions(api))
}

pub(crate) fn missing_credential() -> ToolCallResult {
    ToolCallResult::error(format!(
        "Configuration error: the server has no upstream API token. Set {} (or {}) in the \
         server environment and restart it.",
        ENV_UPSTREAM_TOKEN, ENV_UPSTREAM_TOKEN_FALLBACK
    ))
}

pub(crate) fn rate_limited(detail: &str) -> ToolCallResult {
    ToolCallResult::error(format!(
        "The image API is rate limiting requests ({}). Wait a minute before retrying.",
        detail
    ))
}
