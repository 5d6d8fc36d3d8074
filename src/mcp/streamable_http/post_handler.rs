//! MCP Streamable HTTP POST Handler
//!
//! - `initialize`: reuses the caller's session id or generates a UUID v4 one
//! - anything else: requires a live session, then routes through the session transport

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, field, info, warn, Instrument, Span};
use uuid::Uuid;

use crate::api::routes::ApiState;
use crate::mcp::error::McpError;
use crate::mcp::handler::CallContext;
use crate::mcp::notifications::NotificationSink;
use crate::mcp::protocol::{methods, JsonRpcId, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use crate::mcp::session::SessionId;
use crate::mcp::transport_common::{
    determine_response_mode, extract_mcp_headers, json_rpc_error_response, with_session_header,
    ResponseMode,
};

/// POST {mcp_path}
pub async fn post_handler(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> Response {
    let span = crate::request_span!("POST", state.config.server.mcp_path, rpc_method = field::Empty);
    handle_post(state, headers, body).instrument(span).await
}

async fn handle_post(state: ApiState, headers: HeaderMap, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err((error, id)) => {
            warn!(error = %error, "Rejected malformed JSON-RPC body");
            return json_rpc_error_response(StatusCode::BAD_REQUEST, &error, id);
        }
    };
    Span::current().record("rpc_method", field::display(&request.method));

    let mcp_headers = extract_mcp_headers(&headers);
    let response_id = request.id.response_id();

    let header_session = match mcp_headers.session() {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Invalid mcp-session-id header");
            return json_rpc_error_response(StatusCode::BAD_REQUEST, &e, response_id);
        }
    };

    let sessions = &state.mcp.sessions;
    let session_id = if request.method == methods::INITIALIZE {
        let session_id = header_session.unwrap_or_else(SessionId::generate);
        sessions.get_or_create(&session_id, state.mcp.upstream_credential.clone());
        session_id
    } else {
        let Some(session_id) = header_session else {
            warn!(method = %request.method, "POST without mcp-session-id header");
            let error = McpError::InvalidRequest(
                "mcp-session-id header required; call initialize first".to_string(),
            );
            return json_rpc_error_response(StatusCode::BAD_REQUEST, &error, response_id);
        };

        if let Err(e) = mcp_headers.check_protocol_version() {
            warn!(session_id = %session_id, error = %e, "Rejected protocol version header");
            return json_rpc_error_response(StatusCode::BAD_REQUEST, &e, response_id);
        }

        if !sessions.exists(&session_id) {
            warn!(session_id = %session_id, method = %request.method, "Unknown or stale session");
            let error = McpError::InvalidSession(session_id.to_string());
            return json_rpc_error_response(StatusCode::NOT_FOUND, &error, response_id);
        }
        sessions.touch(&session_id);
        session_id
    };
    Span::current().record("session_id", field::display(&session_id));

    let Some(transport) = state.mcp.attach_transport(&session_id) else {
        warn!(session_id = %session_id, method = %request.method, "Session ended while handling request");
        let error = McpError::InvalidSession(session_id.to_string());
        return json_rpc_error_response(StatusCode::NOT_FOUND, &error, response_id);
    };

    let credential = sessions.get(&session_id).and_then(|session| session.credential);
    let notifier: Arc<dyn NotificationSink> = transport.clone();
    let call = CallContext {
        session_id: Some(session_id.clone()),
        correlation_id: Uuid::new_v4(),
        credential,
        notifier: Some(notifier),
    };

    let method = request.method.clone();
    let response = match transport.handle(request, call).await {
        Ok(Some(response)) => response,
        Ok(None) => {
            debug!(method = %method, "Accepted notification");
            return with_session_header(StatusCode::ACCEPTED.into_response(), &session_id);
        }
        Err(e) => {
            error!(error = %e, method = %method, "Transport failed to handle request");
            return with_session_header(
                json_rpc_error_response(StatusCode::INTERNAL_SERVER_ERROR, &e, response_id),
                &session_id,
            );
        }
    };

    if method == methods::INITIALIZE {
        info!(session_id = %session_id, "Session established");
    }

    let body = match determine_response_mode(mcp_headers.accept.as_deref()) {
        ResponseMode::Json => Json(response).into_response(),
        ResponseMode::Sse => sse_single_response(&response),
    };
    with_session_header(body, &session_id)
}

/// Parse and shape-check a POST body.
///
/// On failure returns the error plus whatever id could be recovered.
fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, (McpError, Option<JsonRpcId>)> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| (McpError::ParseError(e.to_string()), None))?;

    let object = match &value {
        Value::Object(object) => object,
        Value::Array(_) => {
            return Err((McpError::InvalidRequest("batch requests are not supported".to_string()), None))
        }
        _ => {
            return Err((McpError::InvalidRequest("request must be a JSON object".to_string()), None))
        }
    };

    let id = object.get("id").and_then(|id| serde_json::from_value::<JsonRpcId>(id.clone()).ok());

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err((McpError::InvalidRequest("jsonrpc must be \"2.0\"".to_string()), id));
    }
    if !object.get("method").map(Value::is_string).unwrap_or(false) {
        return Err((McpError::InvalidRequest("method must be a string".to_string()), id));
    }

    serde_json::from_value(value).map_err(|e| (McpError::InvalidRequest(e.to_string()), id))
}

fn sse_single_response(response: &JsonRpcResponse) -> Response {
    let data = serde_json::to_string(response).unwrap_or_else(|_| "{}".to_string());
    let event = Event::default().event("message").data(data);
    Sse::new(futures::stream::once(async move { Ok::<_, Infallible>(event) })).into_response()
}
