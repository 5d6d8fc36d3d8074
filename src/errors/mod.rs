//! # Error Handling
//!
//! Process-level error types for the image generation MCP server.
//! Protocol failures live in [`crate::mcp::error::McpError`]; this enum
//! covers startup, configuration and I/O failures.

/// Custom result type for server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the server process
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network transport errors (bind, serve)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Upstream image API errors surfaced outside a tool call
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new upstream error
    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Config(errors.to_string())
    }
}
