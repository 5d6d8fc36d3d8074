//! # Structured Logging
//!
//! Span macros and startup logging helpers built on the tracing ecosystem.

/// Create a tracing span for an inbound MCP call.
///
/// Every span gets a fresh `correlation_id` so log lines from one JSON-RPC
/// exchange can be grouped even when the caller reuses request ids.
///
/// ```rust,ignore
/// let span = request_span!("POST", "/mcp", rpc_method = "tools/call");
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            correlation_id = %uuid::Uuid::new_v4(),
            session_id = tracing::field::Empty
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            correlation_id = %uuid::Uuid::new_v4(),
            session_id = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Create a tracing span for a tool invocation
#[macro_export]
macro_rules! tool_span {
    ($tool:expr, $request_id:expr) => {
        tracing::info_span!("tool_call", tool = %$tool, request_id = %$request_id)
    };
}

/// Log configuration at startup; secrets are reported only as set/unset
pub fn log_config_info(config: &crate::config::Config) {
    tracing::info!(
        bind_address = %config.server.bind_address(),
        mcp_path = %config.server.mcp_path,
        auth_enabled = config.auth.is_enabled(),
        upstream_base_url = %config.upstream.base_url,
        upstream_token_configured = config.upstream.api_token.is_some(),
        context_max_age_secs = config.context.max_age_seconds,
        "Image generation MCP server configuration"
    );

    if !config.auth.is_enabled() {
        tracing::warn!("No API key configured; all requests are accepted (insecure dev mode)");
    }
}
