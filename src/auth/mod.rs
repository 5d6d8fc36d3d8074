//! Shared-secret authentication for the MCP endpoint.

pub mod api_key;
pub mod middleware;

pub use api_key::{ApiKeyVerifier, AuthError};
pub use middleware::authenticate;
