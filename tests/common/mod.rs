//! Shared helpers for the HTTP-level integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use imagegen_mcp::api::build_router;
use imagegen_mcp::config::Config;
use imagegen_mcp::startup::build_state;
use serde_json::{json, Value};
use tower::ServiceExt;

pub const MCP_PATH: &str = "/mcp";
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Config pointing the upstream client at `base_url` with fast polling
pub fn test_config(base_url: &str, api_key: Option<&str>, upstream_token: Option<&str>) -> Config {
    let mut config = Config::default();
    config.auth.api_key = api_key.map(str::to_string);
    config.upstream.base_url = base_url.to_string();
    config.upstream.api_token = upstream_token.map(str::to_string);
    config.upstream.poll_interval_ms = 20;
    config.upstream.max_wait_seconds = 5;
    config
}

pub fn router(config: Config) -> Router {
    let state = build_state(Arc::new(config)).expect("build state");
    build_router(state).expect("build router")
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn session_id(&self) -> Option<String> {
        self.headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string)
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.expect("router responds");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("read body").to_vec();
    TestResponse { status, headers, body }
}

/// POST a raw body to the MCP endpoint with extra headers
pub async fn post_raw(router: &Router, body: &str, headers: &[(&str, &str)]) -> TestResponse {
    let mut builder = Request::builder()
        .method("POST")
        .uri(MCP_PATH)
        .header("content-type", "application/json")
        .header("accept", "application/json, text/event-stream");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(router, builder.body(Body::from(body.to_string())).expect("request")).await
}

pub async fn post_json(router: &Router, message: Value, headers: &[(&str, &str)]) -> TestResponse {
    post_raw(router, &message.to_string(), headers).await
}

/// POST within an established session
pub async fn post_in_session(
    router: &Router,
    session_id: &str,
    message: Value,
    extra: &[(&str, &str)],
) -> TestResponse {
    let mut headers = vec![(SESSION_HEADER, session_id)];
    headers.extend_from_slice(extra);
    post_json(router, message, &headers).await
}

pub fn initialize_request(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "integration-test", "version": "1.0.0"}
        }
    })
}

/// Run the initialize handshake and return the assigned session id
pub async fn initialize(router: &Router, extra: &[(&str, &str)]) -> String {
    let response = post_json(router, initialize_request(1), extra).await;
    assert_eq!(response.status, StatusCode::OK, "initialize failed: {}", response.text());
    let session_id = response.session_id().expect("session header on initialize");

    let initialized = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    let ack = post_in_session(router, &session_id, initialized, extra).await;
    assert_eq!(ack.status, StatusCode::ACCEPTED);

    session_id
}

pub fn tool_call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

/// Concatenated text content of a tools/call result
pub fn result_text(response: &Value) -> String {
    response["result"]["content"]
        .as_array()
        .map(|blocks| {
            blocks.iter().filter_map(|b| b["text"].as_str()).collect::<Vec<_>>().join("\n")
        })
        .unwrap_or_default()
}

pub fn is_error_result(response: &Value) -> bool {
    response["result"]["isError"].as_bool().unwrap_or(false)
}
