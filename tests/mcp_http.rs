//! End-to-end tests of the streamable HTTP endpoint: sessions, notifications,
//! authentication, and error mapping.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::*;
use serde_json::json;
use std::collections::HashSet;
use tower::ServiceExt;

/// Never contacted by these tests
const UNUSED_UPSTREAM: &str = "http://127.0.0.1:9";

fn open_router() -> axum::Router {
    router(test_config(UNUSED_UPSTREAM, None, Some("r8_test")))
}

fn secured_router() -> axum::Router {
    router(test_config(UNUSED_UPSTREAM, Some("sekret"), Some("r8_test")))
}

// ---- Health ----

#[tokio::test]
async fn health_needs_no_credentials() {
    let router = secured_router();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = send(&router, request).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

// ---- Initialize and sessions ----

#[tokio::test]
async fn initialize_returns_capabilities_and_session() {
    let router = open_router();
    let response = post_json(&router, initialize_request(1), &[]).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.session_id().is_some());

    let body = response.json();
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["protocolVersion"], "2025-06-18");
    assert!(body["result"]["capabilities"]["tools"].is_object());
    assert_eq!(body["result"]["serverInfo"]["name"], "imagegen-mcp");
}

#[tokio::test]
async fn initialize_reuses_supplied_session_id() {
    let router = open_router();
    let response =
        post_json(&router, initialize_request(1), &[(SESSION_HEADER, "client-chosen-id")]).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.session_id().as_deref(), Some("client-chosen-id"));

    let ping = json!({"jsonrpc": "2.0", "id": 2, "method": "ping"});
    let response = post_in_session(&router, "client-chosen-id", ping, &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["result"], json!({}));
}

#[tokio::test]
async fn initialize_without_header_generates_distinct_ids() {
    let router = open_router();
    let mut seen = HashSet::new();

    for id in 0..5 {
        let response = post_json(&router, initialize_request(id), &[]).await;
        let session_id = response.session_id().expect("session id");
        assert!(uuid::Uuid::parse_str(&session_id).is_ok(), "not a uuid: {}", session_id);
        assert!(seen.insert(session_id));
    }
}

#[tokio::test]
async fn request_without_session_header_is_rejected() {
    let router = open_router();
    let ping = json!({"jsonrpc": "2.0", "id": 7, "method": "ping"});
    let response = post_json(&router, ping, &[]).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], 7);
}

#[tokio::test]
async fn stale_session_is_not_found() {
    let router = open_router();
    let ping = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
    let response = post_in_session(&router, "never-initialized", ping, &[]).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["error"]["code"], -32600);
}

#[tokio::test]
async fn unsupported_protocol_version_header_is_rejected() {
    let router = open_router();
    let session_id = initialize(&router, &[]).await;

    let ping = json!({"jsonrpc": "2.0", "id": 4, "method": "ping"});
    let response =
        post_in_session(&router, &session_id, ping.clone(), &[("mcp-protocol-version", "1999-01-01")]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], 4);

    let response =
        post_in_session(&router, &session_id, ping, &[("mcp-protocol-version", "2025-06-18")]).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn get_with_unsupported_protocol_version_is_bad_request() {
    let router = open_router();
    let session_id = initialize(&router, &[]).await;

    let request = Request::builder()
        .method("GET")
        .uri(MCP_PATH)
        .header(SESSION_HEADER, session_id.as_str())
        .header("mcp-protocol-version", "1999-01-01")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

// ---- JSON-RPC framing ----

#[tokio::test]
async fn zero_id_is_a_request_not_a_notification() {
    let router = open_router();
    let session_id = initialize(&router, &[]).await;

    let ping = json!({"jsonrpc": "2.0", "id": 0, "method": "ping"});
    let response = post_in_session(&router, &session_id, ping, &[]).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["id"], 0);
    assert_eq!(body["result"], json!({}));
}

#[tokio::test]
async fn notification_gets_accepted_with_empty_body() {
    let router = open_router();
    let session_id = initialize(&router, &[]).await;

    let ping = json!({"jsonrpc": "2.0", "method": "ping"});
    let response = post_in_session(&router, &session_id, ping, &[]).await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert!(response.body.is_empty());
    assert_eq!(response.session_id().as_deref(), Some(session_id.as_str()));
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let router = open_router();
    let session_id = initialize(&router, &[]).await;

    let request = json!({"jsonrpc": "2.0", "id": "abc", "method": "resources/list"});
    let response = post_in_session(&router, &session_id, request, &[]).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["id"], "abc");
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let router = open_router();
    let response = post_raw(&router, "{\"jsonrpc\": \"2.0\", ", &[]).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["error"]["code"], -32700);
    assert!(body["id"].is_null());
}

#[tokio::test]
async fn batch_is_invalid_request() {
    let router = open_router();
    let response = post_raw(&router, r#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#, &[]).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"]["code"], -32600);
}

#[tokio::test]
async fn event_stream_only_accept_gets_sse_response() {
    let router = open_router();
    let session_id = initialize(&router, &[]).await;

    let request = Request::builder()
        .method("POST")
        .uri(MCP_PATH)
        .header("content-type", "application/json")
        .header("accept", "text/event-stream")
        .header(SESSION_HEADER, session_id.as_str())
        .body(Body::from(json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}).to_string()))
        .unwrap();
    let response = send(&router, request).await;

    assert_eq!(response.status, StatusCode::OK);
    let content_type = response.headers[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
    let text = response.text();
    assert!(text.contains("event: message"));
    assert!(text.contains("\"id\":9"));
}

// ---- Tools ----

#[tokio::test]
async fn tools_list_advertises_both_tools() {
    let router = open_router();
    let session_id = initialize(&router, &[]).await;

    let request = json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"});
    let response = post_in_session(&router, &session_id, request, &[]).await;
    let body = response.json();

    let names: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert_eq!(names, vec!["search_models", "generate_image"]);

    for tool in body["result"]["tools"].as_array().unwrap() {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
}

#[tokio::test]
async fn invalid_arguments_produce_error_result() {
    let router = open_router();
    let session_id = initialize(&router, &[]).await;

    let call = tool_call(4, "generate_image", json!({"input": {}}));
    let response = post_in_session(&router, &session_id, call, &[]).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert!(body.get("error").is_none());
    assert!(is_error_result(&body));
    assert!(result_text(&body).contains("model"));
}

#[tokio::test]
async fn unknown_tool_is_json_rpc_error() {
    let router = open_router();
    let session_id = initialize(&router, &[]).await;

    let call = tool_call(5, "draw_cat", json!({}));
    let response = post_in_session(&router, &session_id, call, &[]).await;

    assert_eq!(response.json()["error"]["code"], -32601);
}

// ---- Authentication ----

#[tokio::test]
async fn missing_credentials_are_unauthorized() {
    let router = secured_router();
    let response = post_json(&router, initialize_request(1), &[]).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers[header::WWW_AUTHENTICATE], "Bearer");
    let body = response.json();
    assert_eq!(body["error"]["code"], -32001);
    assert!(body["id"].is_null());
}

#[tokio::test]
async fn wrong_api_key_is_unauthorized() {
    let router = secured_router();
    let response = post_json(&router, initialize_request(1), &[("x-api-key", "guess")]).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"]["code"], -32001);
}

#[tokio::test]
async fn bearer_and_api_key_are_both_accepted() {
    let router = secured_router();

    let session_id = initialize(&router, &[("authorization", "Bearer sekret")]).await;
    let ping = json!({"jsonrpc": "2.0", "id": 2, "method": "ping"});
    let response = post_in_session(&router, &session_id, ping, &[("x-api-key", "sekret")]).await;

    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn preflight_skips_authentication() {
    let router = secured_router();
    let request = Request::builder()
        .method("OPTIONS")
        .uri(MCP_PATH)
        .header("origin", "https://client.example")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;

    assert_ne!(response.status, StatusCode::UNAUTHORIZED);
}

// ---- GET and DELETE ----

#[tokio::test]
async fn get_without_session_is_method_not_allowed() {
    let router = open_router();
    let request = Request::builder().method("GET").uri(MCP_PATH).body(Body::empty()).unwrap();
    let response = send(&router, request).await;

    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn get_for_unknown_session_is_not_found() {
    let router = open_router();
    let request = Request::builder()
        .method("GET")
        .uri(MCP_PATH)
        .header(SESSION_HEADER, "ghost")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_opens_event_stream() {
    let router = open_router();
    let session_id = initialize(&router, &[]).await;

    let request = Request::builder()
        .method("GET")
        .uri(MCP_PATH)
        .header("accept", "text/event-stream")
        .header(SESSION_HEADER, session_id.as_str())
        .body(Body::empty())
        .unwrap();
    // The body never ends; only inspect the head.
    let response = router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
    assert_eq!(response.headers()[SESSION_HEADER].to_str().unwrap(), session_id);
}

#[tokio::test]
async fn delete_without_session_is_method_not_allowed() {
    let router = open_router();
    let request = Request::builder().method("DELETE").uri(MCP_PATH).body(Body::empty()).unwrap();
    let response = send(&router, request).await;

    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn delete_ends_the_session() {
    let router = open_router();
    let session_id = initialize(&router, &[]).await;

    let delete = |id: String| {
        Request::builder()
            .method("DELETE")
            .uri(MCP_PATH)
            .header(SESSION_HEADER, id)
            .body(Body::empty())
            .unwrap()
    };

    let response = send(&router, delete(session_id.clone())).await;
    assert_eq!(response.status, StatusCode::OK);

    let ping = json!({"jsonrpc": "2.0", "id": 2, "method": "ping"});
    let response = post_in_session(&router, &session_id, ping, &[]).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = send(&router, delete(session_id)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
