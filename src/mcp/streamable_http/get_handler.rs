//! MCP Streamable HTTP GET Handler
//!
//! Opens the server-to-client SSE stream for an existing session. Events are
//! JSON-RPC messages sent as `message` events with increasing ids.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{field, info, warn, Instrument, Span};

use crate::api::routes::ApiState;
use crate::mcp::error::McpError;
use crate::mcp::transport::{SessionTransport, StreamEnvelope};
use crate::mcp::transport_common::{extract_mcp_headers, json_rpc_error_response, with_session_header};

/// Interval between SSE keep-alive comments
pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Stream wrapper that detaches the stream from its transport when dropped
struct CleanupStream<S> {
    inner: S,
    transport: Arc<SessionTransport>,
    generation: u64,
}

impl<S: Stream + Unpin> Stream for CleanupStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for CleanupStream<S> {
    fn drop(&mut self) {
        if self.transport.close_stream(self.generation) {
            info!(session_id = %self.transport.session_id(), "SSE stream closed");
        }
    }
}

fn to_event(envelope: StreamEnvelope) -> Result<Event, Infallible> {
    Ok(Event::default()
        .id(envelope.event_id.to_string())
        .event("message")
        .data(envelope.message.to_json()))
}

/// GET {mcp_path}
pub async fn get_handler(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let span = crate::request_span!("GET", state.config.server.mcp_path);
    handle_get(state, headers).instrument(span).await
}

async fn handle_get(state: ApiState, headers: HeaderMap) -> Response {
    let mcp_headers = extract_mcp_headers(&headers);

    let session_id = match mcp_headers.session() {
        Ok(Some(session_id)) => session_id,
        Ok(None) => {
            warn!("GET without mcp-session-id header");
            let error = McpError::InvalidRequest(
                "Method not allowed: GET requires an mcp-session-id header".to_string(),
            );
            return json_rpc_error_response(StatusCode::METHOD_NOT_ALLOWED, &error, None);
        }
        Err(e) => return json_rpc_error_response(StatusCode::BAD_REQUEST, &e, None),
    };
    Span::current().record("session_id", field::display(&session_id));

    if let Err(e) = mcp_headers.check_protocol_version() {
        warn!(session_id = %session_id, error = %e, "Rejected protocol version header");
        return json_rpc_error_response(StatusCode::BAD_REQUEST, &e, None);
    }

    if !state.mcp.sessions.exists(&session_id) {
        warn!(session_id = %session_id, "GET for unknown session");
        let error = McpError::InvalidSession(session_id.to_string());
        return json_rpc_error_response(StatusCode::NOT_FOUND, &error, None);
    }
    state.mcp.sessions.touch(&session_id);

    let Some(transport) = state.mcp.attach_transport(&session_id) else {
        warn!(session_id = %session_id, "Session ended before the stream opened");
        let error = McpError::InvalidSession(session_id.to_string());
        return json_rpc_error_response(StatusCode::NOT_FOUND, &error, None);
    };
    let (generation, receiver) = transport.open_stream();

    info!(session_id = %session_id, generation, "SSE stream opened");

    let stream = CleanupStream {
        inner: ReceiverStream::new(receiver).map(to_event),
        transport,
        generation,
    };

    let sse = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE_INTERVAL).text("keep-alive"));
    with_session_header(sse.into_response(), &session_id)
}
