//! MCP Transport Common Utilities
//!
//! Header extraction, response-mode selection and JSON-RPC error responses
//! shared by the POST, GET and DELETE handlers.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::mcp::error::McpError;
use crate::mcp::protocol::{
    JsonRpcError, JsonRpcId, JsonRpcResponse, JSONRPC_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::session::SessionId;

/// Header carrying the session id in both directions
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Header carrying the negotiated protocol version
pub const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// MCP-relevant request headers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct McpHeaders {
    pub protocol_version: Option<String>,
    pub session_id: Option<String>,
    pub accept: Option<String>,
}

impl McpHeaders {
    /// Parse the session header, if present
    pub fn session(&self) -> Result<Option<SessionId>, McpError> {
        self.session_id.as_deref().map(SessionId::parse).transpose()
    }

    /// Reject a protocol version header this server does not speak.
    ///
    /// A missing header is accepted; clients predating the header omit it.
    pub fn check_protocol_version(&self) -> Result<(), McpError> {
        match self.protocol_version.as_deref() {
            Some(version) if !SUPPORTED_PROTOCOL_VERSIONS.contains(&version) => {
                Err(McpError::InvalidRequest(format!(
                    "Unsupported mcp-protocol-version '{}'; supported: {}",
                    version,
                    SUPPORTED_PROTOCOL_VERSIONS.join(", ")
                )))
            }
            _ => Ok(()),
        }
    }
}

/// How a POST response is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Plain `application/json` body (default)
    Json,
    /// A single SSE `message` event
    Sse,
}

pub fn extract_mcp_headers(headers: &HeaderMap) -> McpHeaders {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    McpHeaders {
        protocol_version: read(MCP_PROTOCOL_VERSION_HEADER),
        session_id: read(MCP_SESSION_ID_HEADER),
        accept: read("accept"),
    }
}

/// SSE only when the client accepts event streams and not JSON
pub fn determine_response_mode(accept_header: Option<&str>) -> ResponseMode {
    match accept_header {
        Some(accept)
            if accept.contains("text/event-stream")
                && !accept.contains("application/json")
                && !accept.contains("*/*") =>
        {
            ResponseMode::Sse
        }
        _ => ResponseMode::Json,
    }
}

pub fn error_response_json(code: i32, message: String, id: Option<JsonRpcId>) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        result: None,
        error: Some(JsonRpcError { code, message, data: None }),
    }
}

/// JSON-RPC error body with an explicit HTTP status
pub fn json_rpc_error_response(status: StatusCode, error: &McpError, id: Option<JsonRpcId>) -> Response {
    (status, Json(error_response_json(error.error_code(), error.to_string(), id))).into_response()
}

/// Echo the session id on a response
pub fn with_session_header(mut response: Response, session_id: &SessionId) -> Response {
    match HeaderValue::from_str(session_id.as_str()) {
        Ok(value) => {
            response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
        }
        Err(e) => warn!(session_id = %session_id, error = %e, "Session id is not a valid header value"),
    }
    response
}
