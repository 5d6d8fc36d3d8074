//! MCP Request Dispatcher
//!
//! Routes JSON-RPC methods to the built-in protocol handlers or to registered
//! tools, and enforces the request/notification contract: a message with an
//! id gets exactly one response, a notification gets none.

use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::mcp::context::SharedContextStore;
use crate::mcp::error::McpError;
use crate::mcp::notifications::NotificationSink;
use crate::mcp::protocol::{
    methods, negotiate_protocol_version, CancelledParams, InitializeParams, InitializeResult,
    JsonRpcId, JsonRpcRequest, JsonRpcResponse, MessageId, ServerCapabilities, ServerInfo,
    ToolCallParams, ToolCallResult, ToolCapabilities, ToolsListResult,
};
use crate::mcp::session::{SessionId, SharedSessionManager};
use crate::mcp::tool_registry::{SharedToolRegistry, ToolContext};
use crate::mcp::validation::format_field_errors;

/// Identity the server reports from `initialize`
#[derive(Debug, Clone)]
pub struct ServerMetadata {
    pub name: String,
    pub version: String,
    pub title: Option<String>,
    pub instructions: Option<String>,
}

impl Default for ServerMetadata {
    fn default() -> Self {
        Self {
            name: crate::APP_NAME.to_string(),
            version: crate::VERSION.to_string(),
            title: None,
            instructions: None,
        }
    }
}

/// Per-call inputs supplied by the transport
#[derive(Clone, Default)]
pub struct CallContext {
    pub session_id: Option<SessionId>,
    pub correlation_id: Uuid,
    /// Upstream credential forwarded to tools
    pub credential: Option<String>,
    /// Where tools may push progress notifications
    pub notifier: Option<Arc<dyn NotificationSink>>,
}

impl CallContext {
    pub fn for_session(session_id: SessionId, credential: Option<String>) -> Self {
        Self {
            session_id: Some(session_id),
            correlation_id: Uuid::new_v4(),
            credential,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("session_id", &self.session_id)
            .field("correlation_id", &self.correlation_id)
            .field("credential_set", &self.credential.is_some())
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

/// The protocol state machine shared by every session transport
pub struct McpDispatcher {
    metadata: ServerMetadata,
    tools: SharedToolRegistry,
    sessions: SharedSessionManager,
    contexts: SharedContextStore,
}

impl McpDispatcher {
    pub fn new(
        metadata: ServerMetadata,
        tools: SharedToolRegistry,
        sessions: SharedSessionManager,
        contexts: SharedContextStore,
    ) -> Self {
        Self { metadata, tools, sessions, contexts }
    }

    pub fn tools(&self) -> &SharedToolRegistry {
        &self.tools
    }

    pub fn contexts(&self) -> &SharedContextStore {
        &self.contexts
    }

    /// True when the message must not be answered.
    ///
    /// A missing id always marks a notification; an explicit `null` id does
    /// so only until the session finished `initialize`.
    pub fn is_notification(&self, request: &JsonRpcRequest, session_id: Option<&SessionId>) -> bool {
        match &request.id {
            MessageId::Absent => true,
            MessageId::Null => {
                !session_id.map(|id| self.sessions.is_initialized(id)).unwrap_or(false)
            }
            MessageId::Id(_) => false,
        }
    }

    /// Handle one inbound message. Returns `None` for notifications.
    pub async fn dispatch(&self, request: JsonRpcRequest, call: CallContext) -> Option<JsonRpcResponse> {
        let notification = self.is_notification(&request, call.session_id.as_ref());
        let response_id = request.id.response_id();
        let method = request.method;

        debug!(
            method = %method,
            id = ?response_id,
            notification,
            correlation_id = %call.correlation_id,
            "Handling MCP message"
        );

        let outcome = match method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request.params, &call),
            methods::INITIALIZED => Ok(self.handle_initialized(&call)),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => self.handle_tools_list(),
            methods::TOOLS_CALL => {
                let request_id = response_id.clone().unwrap_or_else(|| {
                    JsonRpcId::String(format!("notification:{}", call.correlation_id))
                });
                self.handle_tools_call(request_id, request.params, &call).await
            }
            methods::CANCELLED | methods::CANCEL_REQUEST => self.handle_cancel(request.params, &call),
            other => Err(McpError::MethodNotFound(other.to_string())),
        };

        if notification {
            if let Err(e) = &outcome {
                debug!(method = %method, error = %e, "Notification produced an error; dropping");
            }
            return None;
        }

        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(response_id, result),
            Err(e) => self.error_response(response_id, &method, e),
        };

        debug!(method = %method, has_error = response.error.is_some(), "Completed MCP request");
        Some(response)
    }

    fn handle_initialize(&self, params: Value, call: &CallContext) -> Result<Value, McpError> {
        let session_id = call.session_id.as_ref().ok_or_else(|| {
            McpError::InternalError("session store unavailable: no session bound".to_string())
        })?;

        let params: InitializeParams = if params.is_null() {
            InitializeParams::default()
        } else {
            serde_json::from_value(params).unwrap_or_else(|e| {
                warn!(error = %e, "Malformed initialize params; using defaults");
                InitializeParams::default()
            })
        };

        let protocol_version = negotiate_protocol_version(params.protocol_version.as_deref());
        let client_name = params.client_info.as_ref().map(|c| c.name.clone());

        if !self.sessions.mark_initialized(
            session_id,
            protocol_version,
            params.client_info,
            params.capabilities,
        ) {
            return Err(McpError::InternalError(format!(
                "session store unavailable: session {} is not registered",
                session_id
            )));
        }

        info!(
            session_id = %session_id,
            client = client_name.as_deref().unwrap_or("unknown"),
            protocol_version,
            "MCP session initialized"
        );

        let result = InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolCapabilities { list_changed: false }),
            },
            server_info: ServerInfo {
                name: self.metadata.name.clone(),
                version: self.metadata.version.clone(),
                title: self.metadata.title.clone(),
            },
            instructions: self.metadata.instructions.clone(),
        };

        Ok(serde_json::to_value(result)?)
    }

    fn handle_initialized(&self, call: &CallContext) -> Value {
        if let Some(session_id) = &call.session_id {
            if self.sessions.mark_client_ready(session_id) {
                debug!(session_id = %session_id, "Client reported initialized");
            }
        }
        json!({})
    }

    fn handle_tools_list(&self) -> Result<Value, McpError> {
        Ok(serde_json::to_value(ToolsListResult { tools: self.tools.list() })?)
    }

    async fn handle_tools_call(
        &self,
        request_id: JsonRpcId,
        params: Value,
        call: &CallContext,
    ) -> Result<Value, McpError> {
        let params: ToolCallParams = serde_json::from_value(params)
            .map_err(|e| McpError::InvalidParams(format!("Invalid tools/call params: {}", e)))?;

        let tool = self
            .tools
            .get(&params.name)
            .ok_or_else(|| McpError::ToolNotFound(params.name.clone()))?;

        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        if let Err(errors) = tool.validate(&arguments) {
            warn!(tool = %params.name, errors = errors.len(), "Tool arguments failed schema validation");
            let result = ToolCallResult::error(format_field_errors(&params.name, &errors));
            return Ok(serde_json::to_value(result)?);
        }

        let session_id = call.session_id.as_ref();
        let context = self.contexts.create(session_id, request_id.clone(), call.credential.clone());

        let mut tool_context = ToolContext::new(
            request_id.clone(),
            call.session_id.clone(),
            context.credential.clone(),
            context.token.clone(),
        );
        let progress_token = params.meta.and_then(|meta| meta.progress_token);
        if let (Some(token), Some(sink)) = (progress_token, call.notifier.clone()) {
            tool_context = tool_context.with_progress(token, sink);
        }

        let handler = tool.handler();
        let outcome = AssertUnwindSafe(handler.call(arguments, tool_context))
            .catch_unwind()
            .instrument(crate::tool_span!(params.name, request_id))
            .await;

        self.contexts.delete(session_id, &request_id);

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(McpError::Cancelled)) => {
                info!(tool = %params.name, request_id = %request_id, "Tool call cancelled");
                ToolCallResult::error(format!("Tool '{}' was cancelled before completing.", params.name))
            }
            Ok(Err(e)) => {
                error!(tool = %params.name, error = %e, "Tool handler failed");
                ToolCallResult::error(format!("Tool '{}' failed: {}", params.name, e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(tool = %params.name, panic = %message, "Tool handler panicked");
                ToolCallResult::error(format!(
                    "Tool '{}' failed unexpectedly: {}",
                    params.name, message
                ))
            }
        };

        Ok(serde_json::to_value(result)?)
    }

    fn handle_cancel(&self, params: Value, call: &CallContext) -> Result<Value, McpError> {
        let params: CancelledParams = serde_json::from_value(params)
            .map_err(|e| McpError::InvalidParams(format!("Invalid cancellation params: {}", e)))?;

        let found = self.contexts.cancel(call.session_id.as_ref(), &params.request_id);
        info!(
            request_id = %params.request_id,
            found,
            reason = params.reason.as_deref().unwrap_or(""),
            "Received cancellation"
        );
        Ok(json!({}))
    }

    fn error_response(&self, id: Option<JsonRpcId>, method: &str, error: McpError) -> JsonRpcResponse {
        match &error {
            McpError::MethodNotFound(_) | McpError::ToolNotFound(_) | McpError::InvalidParams(_) => {
                warn!(method = %method, error = %error, "MCP request rejected")
            }
            _ => error!(method = %method, error = %error, "MCP error"),
        }
        JsonRpcResponse::failure(id, error.to_json_rpc_error())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
