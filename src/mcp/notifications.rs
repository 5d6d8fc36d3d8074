//! MCP Notification Types
//!
//! Server-to-client notifications pushed over a session's GET stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mcp::protocol::{methods, JsonRpcNotification};

/// Progress token chosen by the client in `_meta.progressToken`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    Number(i64),
    String(String),
}

impl std::fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressToken::Number(n) => write!(f, "{}", n),
            ProgressToken::String(s) => write!(f, "{}", s),
        }
    }
}

/// Progress notification parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    pub progress_token: ProgressToken,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Destination for server-to-client messages, typically a session's open GET stream
pub trait NotificationSink: Send + Sync {
    /// Deliver `message`. Returns false when no stream is listening.
    fn push(&self, message: StreamMessage) -> bool;
}

/// Messages delivered on a session stream
#[derive(Debug, Clone)]
pub enum StreamMessage {
    /// A JSON-RPC notification originated by the server
    Notification(JsonRpcNotification),
}

impl StreamMessage {
    pub fn progress(params: ProgressParams) -> Self {
        let params = serde_json::to_value(params).unwrap_or(Value::Null);
        StreamMessage::Notification(JsonRpcNotification::new(methods::PROGRESS, Some(params)))
    }

    /// Serialized JSON-RPC payload for the SSE `data:` field
    pub fn to_json(&self) -> String {
        match self {
            StreamMessage::Notification(n) => serde_json::to_string(n),
        }
        .unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_message_shape() {
        let message = StreamMessage::progress(ProgressParams {
            progress_token: ProgressToken::String("tok".to_string()),
            progress: 2.0,
            total: None,
            message: Some("processing".to_string()),
        });

        let value: Value = serde_json::from_str(&message.to_json()).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "notifications/progress");
        assert_eq!(value["params"]["progressToken"], "tok");
        assert_eq!(value["params"]["progress"], 2.0);
        assert!(value["params"].get("total").is_none());
        assert!(value.get("id").is_none());
    }
}
