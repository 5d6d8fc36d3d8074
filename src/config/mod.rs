//! # Configuration Management
//!
//! Loads server configuration from environment variables. `main` calls
//! `dotenvy::dotenv()` first so a local `.env` file feeds the same path.

pub mod settings;

pub use settings::{
    AuthConfig, ContextConfig, ObservabilityConfig, ServerConfig, UpstreamConfig,
};

use std::str::FromStr;
use validator::Validate;

use crate::errors::{Error, Result};

pub const ENV_HOST: &str = "IMAGEGEN_HOST";
pub const ENV_PORT: &str = "IMAGEGEN_PORT";
pub const ENV_TITLE: &str = "IMAGEGEN_TITLE";
pub const ENV_MCP_PATH: &str = "IMAGEGEN_MCP_PATH";
pub const ENV_CORS_ORIGINS: &str = "IMAGEGEN_CORS_ORIGINS";
pub const ENV_API_KEY: &str = "IMAGEGEN_API_KEY";
pub const ENV_UPSTREAM_TOKEN: &str = "IMAGEGEN_UPSTREAM_TOKEN";
pub const ENV_UPSTREAM_TOKEN_FALLBACK: &str = "REPLICATE_API_TOKEN";
pub const ENV_UPSTREAM_BASE_URL: &str = "IMAGEGEN_UPSTREAM_BASE_URL";
pub const ENV_UPSTREAM_TIMEOUT_SECS: &str = "IMAGEGEN_UPSTREAM_TIMEOUT_SECS";
pub const ENV_POLL_INTERVAL_MS: &str = "IMAGEGEN_POLL_INTERVAL_MS";
pub const ENV_MAX_WAIT_SECS: &str = "IMAGEGEN_MAX_WAIT_SECS";
pub const ENV_SEARCH_LIMIT: &str = "IMAGEGEN_SEARCH_LIMIT";
pub const ENV_CONTEXT_MAX_AGE_SECS: &str = "IMAGEGEN_CONTEXT_MAX_AGE_SECS";
pub const ENV_CONTEXT_SWEEP_INTERVAL_SECS: &str = "IMAGEGEN_CONTEXT_SWEEP_INTERVAL_SECS";
pub const ENV_LOG_LEVEL: &str = "IMAGEGEN_LOG_LEVEL";
pub const ENV_JSON_LOGS: &str = "IMAGEGEN_JSON_LOGS";

/// Complete server configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub upstream: UpstreamConfig,
    pub context: ContextConfig,
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Unset and blank values fall back to defaults; values that are set but
    /// fail to parse are configuration errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let server = ServerConfig {
            host: get(ENV_HOST).unwrap_or(defaults.server.host),
            port: parse_or(&get, ENV_PORT, defaults.server.port)?,
            title: get(ENV_TITLE).unwrap_or(defaults.server.title),
            mcp_path: get(ENV_MCP_PATH).unwrap_or(defaults.server.mcp_path),
            cors_origins: get(ENV_CORS_ORIGINS)
                .map(|raw| {
                    raw.split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.server.cors_origins),
        };

        let auth = AuthConfig { api_key: get(ENV_API_KEY) };

        let upstream = UpstreamConfig {
            api_token: get(ENV_UPSTREAM_TOKEN).or_else(|| get(ENV_UPSTREAM_TOKEN_FALLBACK)),
            base_url: get(ENV_UPSTREAM_BASE_URL).unwrap_or(defaults.upstream.base_url),
            timeout_seconds: parse_or(
                &get,
                ENV_UPSTREAM_TIMEOUT_SECS,
                defaults.upstream.timeout_seconds,
            )?,
            poll_interval_ms: parse_or(
                &get,
                ENV_POLL_INTERVAL_MS,
                defaults.upstream.poll_interval_ms,
            )?,
            max_wait_seconds: parse_or(&get, ENV_MAX_WAIT_SECS, defaults.upstream.max_wait_seconds)?,
            search_limit: parse_or(&get, ENV_SEARCH_LIMIT, defaults.upstream.search_limit)?,
        };

        let context = ContextConfig {
            max_age_seconds: parse_or(
                &get,
                ENV_CONTEXT_MAX_AGE_SECS,
                defaults.context.max_age_seconds,
            )?,
            sweep_interval_seconds: parse_or(
                &get,
                ENV_CONTEXT_SWEEP_INTERVAL_SECS,
                defaults.context.sweep_interval_seconds,
            )?,
        };

        let observability = ObservabilityConfig {
            log_level: get(ENV_LOG_LEVEL).unwrap_or(defaults.observability.log_level),
            json_logging: get(ENV_JSON_LOGS)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.observability.json_logging),
        };

        let config = Self { server, auth, upstream, context, observability };
        config.validate_all()?;
        Ok(config)
    }

    /// Validate every configuration section
    pub fn validate_all(&self) -> Result<()> {
        self.server.validate()?;
        self.auth.validate()?;
        self.upstream.validate()?;
        self.context.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::config(format!("Invalid value for {}: '{}' ({})", key, raw, e))),
        None => Ok(default),
    }
}
