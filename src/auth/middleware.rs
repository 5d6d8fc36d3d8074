//! Axum middleware guarding the MCP endpoint.

use axum::{
    body::Body,
    extract::State,
    http::{header::WWW_AUTHENTICATE, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info_span, warn};

use crate::api::routes::ApiState;
use crate::auth::api_key::AuthError;
use crate::mcp::protocol::error_codes;
use crate::mcp::transport_common::error_response_json;

/// Reject requests without a valid API key.
///
/// With no key configured every request passes (insecure dev mode).
pub async fn authenticate(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let Some(verifier) = state.auth.as_ref() else {
        return Ok(next.run(request).await);
    };

    let outcome = {
        let correlation_id = uuid::Uuid::new_v4();
        let span = info_span!(
            "auth_middleware.authenticate",
            http.method = %request.method(),
            http.path = %request.uri().path(),
            correlation_id = %correlation_id
        );
        let _guard = span.enter();

        let outcome = verifier.verify_headers(request.headers());
        if let Err(err) = &outcome {
            warn!(%correlation_id, error = %err, "authentication failed");
        }
        outcome
    };

    outcome?;
    Ok(next.run(request).await)
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = error_response_json(error_codes::UNAUTHORIZED, format!("Unauthorized: {}", self), None);
        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        response.headers_mut().insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        response
    }
}
