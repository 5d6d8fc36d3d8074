use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{authenticate, ApiKeyVerifier};
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::mcp::server::McpState;
use crate::mcp::streamable_http::{delete_handler, get_handler, post_handler};
use crate::mcp::transport_common::{MCP_PROTOCOL_VERSION_HEADER, MCP_SESSION_ID_HEADER};

use super::health::health_handler;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub mcp: McpState,
    /// `None` when no API key is configured (insecure dev mode)
    pub auth: Option<Arc<ApiKeyVerifier>>,
}

impl ApiState {
    pub fn new(config: Arc<Config>, mcp: McpState) -> Result<Self> {
        let auth = match config.auth.api_key.as_deref() {
            Some(key) => Some(Arc::new(ApiKeyVerifier::new(key)?)),
            None => None,
        };
        Ok(Self { config, mcp, auth })
    }
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("config", &self.config)
            .field("mcp", &self.mcp)
            .field("auth_enabled", &self.auth.is_some())
            .finish()
    }
}

pub fn build_router(state: ApiState) -> Result<Router> {
    let cors = cors_layer(&state.config)?;
    let mcp_path = state.config.server.mcp_path.clone();

    let auth_layer = middleware::from_fn_with_state(state.clone(), authenticate);

    let mcp_routes = Router::new()
        .route(&mcp_path, post(post_handler).get(get_handler).delete(delete_handler))
        .route_layer(auth_layer);

    Ok(Router::new()
        .route("/health", get(health_handler))
        .merge(mcp_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

fn cors_layer(config: &Config) -> Result<CorsLayer> {
    let allow_origin = if config.server.allows_any_origin() {
        AllowOrigin::any()
    } else {
        let origins = config
            .server
            .cors_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|e| Error::config(format!("Invalid CORS origin '{}': {}", origin, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static(MCP_SESSION_ID_HEADER),
            HeaderName::from_static(MCP_PROTOCOL_VERSION_HEADER),
            HeaderName::from_static("last-event-id"),
        ])
        .expose_headers([HeaderName::from_static(MCP_SESSION_ID_HEADER)]))
}
