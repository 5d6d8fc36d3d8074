//! MCP Streamable HTTP DELETE Handler
//!
//! Terminates a session: removes it and its transport, and cancels every
//! in-flight request that belongs to it.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{field, info, warn, Instrument, Span};

use crate::api::routes::ApiState;
use crate::mcp::error::McpError;
use crate::mcp::transport_common::{extract_mcp_headers, json_rpc_error_response, with_session_header};

/// DELETE {mcp_path}
///
/// - 200: session terminated
/// - 400: malformed session header
/// - 404: unknown session
/// - 405: no session header
pub async fn delete_handler(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let span = crate::request_span!("DELETE", state.config.server.mcp_path);
    handle_delete(state, headers).instrument(span).await
}

async fn handle_delete(state: ApiState, headers: HeaderMap) -> Response {
    let mcp_headers = extract_mcp_headers(&headers);

    let session_id = match mcp_headers.session() {
        Ok(Some(session_id)) => session_id,
        Ok(None) => {
            warn!("DELETE without mcp-session-id header");
            let error = McpError::InvalidRequest(
                "Method not allowed: DELETE requires an mcp-session-id header".to_string(),
            );
            return json_rpc_error_response(StatusCode::METHOD_NOT_ALLOWED, &error, None);
        }
        Err(e) => return json_rpc_error_response(StatusCode::BAD_REQUEST, &e, None),
    };
    Span::current().record("session_id", field::display(&session_id));

    if state.mcp.sessions.remove(&session_id).is_none() {
        warn!(session_id = %session_id, "DELETE for unknown session");
        let error = McpError::InvalidSession(session_id.to_string());
        return json_rpc_error_response(StatusCode::NOT_FOUND, &error, None);
    }

    state.mcp.transports.remove(&session_id);
    let cancelled = state.mcp.contexts.cancel_session(&session_id);

    info!(session_id = %session_id, cancelled, "Session terminated");
    with_session_header(StatusCode::OK.into_response(), &session_id)
}
