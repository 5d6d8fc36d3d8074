//! MCP Streamable HTTP Transport
//!
//! One endpoint, three verbs:
//! - POST: send a JSON-RPC request or notification (JSON or SSE response based on `Accept`)
//! - GET: open the session's server-to-client SSE stream
//! - DELETE: terminate the session
//!
//! Every call after `initialize` carries the `mcp-session-id` header.

mod delete_handler;
mod get_handler;
mod post_handler;

pub use delete_handler::delete_handler;
pub use get_handler::{get_handler, SSE_KEEP_ALIVE_INTERVAL};
pub use post_handler::post_handler;
