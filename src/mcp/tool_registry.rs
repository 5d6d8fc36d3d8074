//! MCP Tool Registry
//!
//! Immutable table of tools built once at startup. Construction validates
//! every definition (unique non-empty names, compilable input schemas), so a
//! bad table stops the process before it accepts traffic.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::mcp::cancellation::CancellationToken;
use crate::mcp::error::McpError;
use crate::mcp::notifications::{NotificationSink, ProgressParams, ProgressToken, StreamMessage};
use crate::mcp::protocol::{JsonRpcId, Tool, ToolCallResult};
use crate::mcp::session::SessionId;
use crate::mcp::validation::{ArgumentValidator, FieldError};

/// Behavior of a tool.
///
/// Domain failures (bad upstream response, missing credential) should be
/// returned as `Ok(ToolCallResult::error(..))`. An `Err` or a panic is
/// converted to an error result by the dispatcher.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value, context: ToolContext) -> Result<ToolCallResult, McpError>;
}

/// Call-site context handed to a tool handler
#[derive(Clone)]
pub struct ToolContext {
    pub request_id: JsonRpcId,
    pub session_id: Option<SessionId>,
    /// Upstream credential for this call
    pub credential: Option<String>,
    pub cancellation: CancellationToken,
    progress: Option<ProgressReporter>,
}

impl ToolContext {
    pub fn new(
        request_id: JsonRpcId,
        session_id: Option<SessionId>,
        credential: Option<String>,
        cancellation: CancellationToken,
    ) -> Self {
        Self { request_id, session_id, credential, cancellation, progress: None }
    }

    /// Attach a progress channel; used when the caller sent a progress token
    pub fn with_progress(mut self, token: ProgressToken, sink: Arc<dyn NotificationSink>) -> Self {
        self.progress = Some(ProgressReporter { token, sink });
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Push a progress notification. Returns false when nobody is listening.
    pub fn report_progress(&self, progress: f64, total: Option<f64>, message: Option<String>) -> bool {
        match &self.progress {
            Some(reporter) => reporter.sink.push(StreamMessage::progress(ProgressParams {
                progress_token: reporter.token.clone(),
                progress,
                total,
                message,
            })),
            None => false,
        }
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("request_id", &self.request_id)
            .field("session_id", &self.session_id)
            .field("credential_set", &self.credential.is_some())
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("progress", &self.progress.as_ref().map(|p| p.token.to_string()))
            .finish()
    }
}

#[derive(Clone)]
struct ProgressReporter {
    token: ProgressToken,
    sink: Arc<dyn NotificationSink>,
}

/// Static description of a tool plus its handler
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub title: Option<String>,
    pub description: String,
    pub input_schema: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: description.into(),
            input_schema,
            handler,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Wire form for `tools/list`
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.clone(),
            title: self.title.clone(),
            description: Some(self.description.clone()),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition").field("name", &self.name).field("title", &self.title).finish()
    }
}

/// A definition whose schema has been compiled
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    definition: ToolDefinition,
    validator: ArgumentValidator,
}

impl RegisteredTool {
    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        self.definition.handler.clone()
    }

    pub fn validate(&self, arguments: &Value) -> Result<(), Vec<FieldError>> {
        self.validator.validate(arguments)
    }
}

/// Name-indexed, registration-ordered tool table
#[derive(Debug)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build the registry, rejecting empty, duplicate or malformed definitions
    pub fn new(definitions: Vec<ToolDefinition>) -> Result<Self, McpError> {
        if definitions.is_empty() {
            return Err(McpError::EmptyRegistry);
        }

        let mut tools = Vec::with_capacity(definitions.len());
        let mut index = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            if definition.name.trim().is_empty() {
                return Err(McpError::InvalidToolDefinition {
                    tool: definition.name,
                    message: "tool name cannot be empty".to_string(),
                });
            }
            if index.contains_key(&definition.name) {
                return Err(McpError::DuplicateTool(definition.name));
            }

            let validator = ArgumentValidator::compile(&definition.name, &definition.input_schema)?;
            index.insert(definition.name.clone(), tools.len());
            tools.push(RegisteredTool { definition, validator });
        }

        Ok(Self { tools, index })
    }

    /// Exact, case-sensitive lookup
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// All tools in registration order
    pub fn list(&self) -> Vec<Tool> {
        self.tools.iter().map(|tool| tool.definition.to_tool()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Shared registry type
pub type SharedToolRegistry = Arc<ToolRegistry>;
