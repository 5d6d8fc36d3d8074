//! Startup sequence
//!
//! Builds the shared state from configuration, wires the router, runs the
//! context sweeper alongside the HTTP server, and unwinds both on shutdown.

use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::api::{build_router, start_api_server, ApiState};
use crate::config::Config;
use crate::errors::Result;
use crate::mcp::context::ContextSweeper;
use crate::mcp::handler::ServerMetadata;
use crate::mcp::server::McpState;
use crate::tools::build_registry;
use crate::upstream::{ImageApi, ReplicateClient};
use crate::{APP_NAME, VERSION};

const SERVER_INSTRUCTIONS: &str = "Use search_models to find an image model and the schema of \
its input, then call generate_image with the model id (owner/name) and an input object that \
matches that schema. Generated images are returned as URLs.";

pub fn server_metadata(config: &Config) -> ServerMetadata {
    ServerMetadata {
        name: APP_NAME.to_string(),
        version: VERSION.to_string(),
        title: Some(config.server.title.clone()),
        instructions: Some(SERVER_INSTRUCTIONS.to_string()),
    }
}

/// Build application state backed by the HTTP upstream client
pub fn build_state(config: Arc<Config>) -> Result<ApiState> {
    let api: Arc<dyn ImageApi> = Arc::new(ReplicateClient::new(&config.upstream)?);
    build_state_with_api(config, api)
}

/// Build application state around any [`ImageApi`].
///
/// Fails when the tool table is invalid; nothing should be served then.
pub fn build_state_with_api(config: Arc<Config>, api: Arc<dyn ImageApi>) -> Result<ApiState> {
    let registry = build_registry(api)?;
    info!(tools = ?registry.names(), "Registered MCP tools");

    let mcp = McpState::new(
        server_metadata(&config),
        Arc::new(registry),
        config.context.max_age(),
        config.upstream.api_token.clone(),
    );
    ApiState::new(config, mcp)
}

/// Serve until `shutdown` resolves, then stop background work
pub async fn run<F>(config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let config = Arc::new(config);
    let state = build_state(config.clone())?;
    let mcp = state.mcp.clone();
    let router = build_router(state)?;

    let sweeper = ContextSweeper::spawn(mcp.contexts.clone(), config.context.sweep_interval());

    let served = start_api_server(&config.server.bind_address(), router, shutdown).await;

    sweeper.stop().await;
    let cancelled = mcp.shutdown();
    info!(cancelled, "Cancelled outstanding requests");

    served
}
