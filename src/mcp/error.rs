//! MCP Error Types

use crate::mcp::protocol::{error_codes, JsonRpcError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid or stale session, please re-initialize: {0}")]
    InvalidSession(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("Invalid definition for tool '{tool}': {message}")]
    InvalidToolDefinition { tool: String, message: String },

    #[error("No tools registered")]
    EmptyRegistry,
}

impl McpError {
    /// Convert to JSON-RPC error code
    pub fn error_code(&self) -> i32 {
        match self {
            McpError::ParseError(_) => error_codes::PARSE_ERROR,
            McpError::InvalidRequest(_) | McpError::InvalidSession(_) => {
                error_codes::INVALID_REQUEST
            }
            McpError::MethodNotFound(_) | McpError::ToolNotFound(_) => {
                error_codes::METHOD_NOT_FOUND
            }
            McpError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            McpError::InternalError(_)
            | McpError::SerializationError(_)
            | McpError::Cancelled
            | McpError::DuplicateTool(_)
            | McpError::InvalidToolDefinition { .. }
            | McpError::EmptyRegistry => error_codes::INTERNAL_ERROR,
        }
    }

    /// Convert to JsonRpcError
    pub fn to_json_rpc_error(&self) -> JsonRpcError {
        JsonRpcError { code: self.error_code(), message: self.to_string(), data: None }
    }
}

impl From<McpError> for JsonRpcError {
    fn from(error: McpError) -> Self {
        error.to_json_rpc_error()
    }
}

impl From<McpError> for crate::errors::Error {
    fn from(error: McpError) -> Self {
        match error {
            McpError::DuplicateTool(_)
            | McpError::InvalidToolDefinition { .. }
            | McpError::EmptyRegistry => {
                crate::errors::Error::config(error.to_string())
            }
            other => crate::errors::Error::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(McpError::ParseError("test".to_string()).error_code(), error_codes::PARSE_ERROR);
        assert_eq!(
            McpError::InvalidRequest("test".to_string()).error_code(),
            error_codes::INVALID_REQUEST
        );
        assert_eq!(
            McpError::InvalidSession("abc".to_string()).error_code(),
            error_codes::INVALID_REQUEST
        );
        assert_eq!(
            McpError::MethodNotFound("test".to_string()).error_code(),
            error_codes::METHOD_NOT_FOUND
        );
        assert_eq!(
            McpError::ToolNotFound("test".to_string()).error_code(),
            error_codes::METHOD_NOT_FOUND
        );
        assert_eq!(
            McpError::InvalidParams("test".to_string()).error_code(),
            error_codes::INVALID_PARAMS
        );
        assert_eq!(
            McpError::InternalError("test".to_string()).error_code(),
            error_codes::INTERNAL_ERROR
        );
    }

    #[test]
    fn test_to_json_rpc_error() {
        let error = McpError::ToolNotFound("test_tool".to_string());
        let json_rpc_error = error.to_json_rpc_error();

        assert_eq!(json_rpc_error.code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(json_rpc_error.message, "Tool not found: test_tool");
        assert!(json_rpc_error.data.is_none());
    }

    #[test]
    fn test_stale_session_message_asks_for_reinitialize() {
        let error: JsonRpcError = McpError::InvalidSession("s-1".to_string()).into();
        assert!(error.message.contains("please re-initialize"));
    }

    #[test]
    fn test_registry_errors_become_config_errors() {
        let err: crate::errors::Error = McpError::DuplicateTool("dup".to_string()).into();
        assert!(matches!(err, crate::errors::Error::Config(_)));
    }
}
