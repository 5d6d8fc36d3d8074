//! MCP (Model Context Protocol) Server Implementation
//!
//! JSON-RPC 2.0 dispatch, per-session state and the streamable HTTP transport.

pub mod cancellation;
pub mod context;
pub mod error;
pub mod handler;
pub mod notifications;
pub mod protocol;
pub mod server;
pub mod session;
pub mod streamable_http;
pub mod tool_registry;
pub mod transport;
pub mod transport_common;
pub mod validation;

pub use cancellation::CancellationToken;
pub use context::{
    create_context_store, ContextKey, ContextSweeper, RequestContext, RequestContextStore,
    SharedContextStore,
};
pub use error::McpError;
pub use handler::{CallContext, McpDispatcher, ServerMetadata};
pub use notifications::{NotificationSink, ProgressParams, ProgressToken, StreamMessage};
pub use protocol::*;
pub use server::McpState;
pub use session::{create_session_manager, McpSession, SessionId, SessionManager, SharedSessionManager};
pub use tool_registry::{
    RegisteredTool, SharedToolRegistry, ToolContext, ToolDefinition, ToolHandler, ToolRegistry,
};
pub use transport::{SessionTransport, SharedTransportRegistry, TransportRegistry};
