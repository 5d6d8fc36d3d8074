//! Upstream failure classification.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Text that marks a failure as upstream throttling
static RATE_LIMIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)rate.?limit|too many requests|throttl").expect("rate limit regex is valid")
});

/// Longest upstream body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream rate limit reached: {0}")]
    RateLimited(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("could not decode upstream response: {0}")]
    Decode(String),

    #[error("request was canceled before a prediction was created")]
    Canceled,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid model identifier '{0}': expected owner/name or owner/name:version")]
    InvalidModel(String),
}

impl UpstreamError {
    /// Classify a non-success HTTP response
    pub fn from_response(status: u16, body: &str) -> Self {
        let detail = error_detail(body);
        if status == 429 || is_rate_limit_text(&detail) {
            UpstreamError::RateLimited(detail)
        } else {
            UpstreamError::Http { status, body: detail }
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, UpstreamError::RateLimited(_))
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            UpstreamError::Timeout(error.to_string())
        } else if error.is_decode() {
            UpstreamError::Decode(error.to_string())
        } else {
            UpstreamError::Request(error.to_string())
        }
    }
}

impl From<UpstreamError> for crate::errors::Error {
    fn from(error: UpstreamError) -> Self {
        crate::errors::Error::upstream(error.to_string())
    }
}

/// True when `text` reads like a throttling message
pub fn is_rate_limit_text(text: &str) -> bool {
    RATE_LIMIT_PATTERN.is_match(text)
}

/// Human-readable part of an error body: `detail` or `title` of a JSON
/// problem document, otherwise the raw text, truncated.
fn error_detail(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        ["detail", "title", "error"]
            .iter()
            .find_map(|key| json.get(*key).and_then(Value::as_str).map(str::to_string))
    });

    let text = from_json.unwrap_or_else(|| body.trim().to_string());
    if text.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_429_is_rate_limited() {
        assert!(UpstreamError::from_response(429, "slow down").is_rate_limited());
    }

    #[test]
    fn test_rate_limit_text_is_classified() {
        assert!(is_rate_limit_text("Rate limit exceeded"));
        assert!(is_rate_limit_text("You are being THROTTLED"));
        assert!(is_rate_limit_text("too many requests, try later"));
        assert!(is_rate_limit_text("ratelimit hit"));
        assert!(!is_rate_limit_text("model not found"));

        let error = UpstreamError::from_response(503, r#"{"detail":"Request was throttled"}"#);
        assert!(error.is_rate_limited());
    }

    #[test]
    fn test_json_detail_extracted() {
        match UpstreamError::from_response(404, r#"{"title":"Not found","detail":"Model does not exist"}"#) {
            UpstreamError::Http { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "Model does not exist");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_long_body_truncated() {
        let body = "x".repeat(2000);
        match UpstreamError::from_response(500, &body) {
            UpstreamError::Http { body, .. } => assert_eq!(body.len(), MAX_ERROR_BODY_CHARS + 3),
            other => panic!("unexpected {:?}", other),
        }
    }
}
