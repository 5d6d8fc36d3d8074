//! # Configuration Settings
//!
//! Defines the configuration sections for the image generation MCP server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use validator::Validate;

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Bind port
    #[validate(range(min = 1, message = "Port must be non-zero"))]
    pub port: u16,

    /// Human-readable server title reported by health and initialize
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: String,

    /// Path of the JSON-RPC endpoint
    #[validate(custom(function = "validate_mcp_path"))]
    pub mcp_path: String,

    /// Allowed CORS origins; `*` allows any origin
    #[validate(length(min = 1, message = "At least one CORS origin is required"))]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            title: "Image Generation MCP Server".to_string(),
            mcp_path: "/mcp".to_string(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    /// Socket address string for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when every origin is allowed
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|origin| origin == "*")
    }
}

fn validate_mcp_path(path: &str) -> Result<(), validator::ValidationError> {
    if path.starts_with('/') && path.len() > 1 && path != "/health" {
        Ok(())
    } else {
        Err(validator::ValidationError::new("mcp_path")
            .with_message("MCP path must start with '/' and must not be '/' or '/health'".into()))
    }
}

/// Inbound API-key authentication
#[derive(Clone, Default, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    /// Shared secret accepted via `Authorization: Bearer` or `X-Api-Key`.
    /// `None` runs the server in insecure dev mode.
    #[validate(length(min = 1, message = "API key cannot be empty when set"))]
    pub api_key: Option<String>,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig").field("api_key_set", &self.api_key.is_some()).finish()
    }
}

/// Upstream image API client configuration
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct UpstreamConfig {
    /// Credential forwarded to the upstream API
    pub api_token: Option<String>,

    /// Base URL of the upstream API
    #[validate(url(message = "Upstream base URL must be a valid URL"))]
    pub base_url: String,

    /// Timeout for a single upstream HTTP call
    #[validate(range(min = 1, max = 600, message = "Upstream timeout must be 1-600 seconds"))]
    pub timeout_seconds: u64,

    /// Delay between prediction status polls
    #[validate(range(min = 10, max = 60000, message = "Poll interval must be 10-60000 ms"))]
    pub poll_interval_ms: u64,

    /// Longest a single generation may run before the client gives up
    #[validate(range(min = 1, max = 3600, message = "Max wait must be 1-3600 seconds"))]
    pub max_wait_seconds: u64,

    /// Max number of models returned by a search
    #[validate(range(min = 1, max = 50, message = "Search limit must be 1-50"))]
    pub search_limit: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: "https://api.replicate.com".to_string(),
            timeout_seconds: 60,
            poll_interval_ms: 1000,
            max_wait_seconds: 300,
            search_limit: 10,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds)
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_token_set", &self.api_token.is_some())
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_wait_seconds", &self.max_wait_seconds)
            .field("search_limit", &self.search_limit)
            .finish()
    }
}

/// Request context bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ContextConfig {
    /// Contexts older than this are dropped by the sweeper
    #[validate(range(min = 1, message = "Context max age must be at least 1 second"))]
    pub max_age_seconds: u64,

    /// Sweeper period
    #[validate(range(min = 1, message = "Sweep interval must be at least 1 second"))]
    pub sweep_interval_seconds: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_age_seconds: 600, sweep_interval_seconds: 60 }
    }
}

impl ContextConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit JSON structured logs
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ServerConfig::default().validate().is_ok());
        assert!(AuthConfig::default().validate().is_ok());
        assert!(UpstreamConfig::default().validate().is_ok());
        assert!(ContextConfig::default().validate().is_ok());
        assert!(ObservabilityConfig::default().validate().is_ok());
    }

    #[test]
    fn test_context_defaults_match_sweep_policy() {
        let config = ContextConfig::default();
        assert_eq!(config.max_age(), Duration::from_secs(600));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_mcp_path_validation() {
        let mut config = ServerConfig::default();
        config.mcp_path = "mcp".to_string();
        assert!(config.validate().is_err());

        config.mcp_path = "/health".to_string();
        assert!(config.validate().is_err());

        config.mcp_path = "/v1/mcp".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_upstream_url_rejected() {
        let config = UpstreamConfig { base_url: "not a url".to_string(), ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let auth = AuthConfig { api_key: Some("super-secret".to_string()) };
        let upstream =
            UpstreamConfig { api_token: Some("r8_secret".to_string()), ..Default::default() };

        let rendered = format!("{:?} {:?}", auth, upstream);
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("r8_secret"));
        assert!(rendered.contains("api_key_set: true"));
    }

    #[test]
    fn test_any_origin() {
        let mut config = ServerConfig::default();
        assert!(config.allows_any_origin());
        config.cors_origins = vec!["https://app.example.com".to_string()];
        assert!(!config.allows_any_origin());
    }
}
