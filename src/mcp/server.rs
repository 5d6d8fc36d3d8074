//! MCP Server State
//!
//! Bundles every piece of shared MCP state into one explicitly owned value
//! built at startup and handed to the HTTP layer. Independent instances do not
//! share anything, which keeps tests isolated.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::mcp::context::{create_context_store, SharedContextStore};
use crate::mcp::handler::{McpDispatcher, ServerMetadata};
use crate::mcp::session::{create_session_manager, SessionId, SharedSessionManager};
use crate::mcp::tool_registry::SharedToolRegistry;
use crate::mcp::transport::{SessionTransport, SharedTransportRegistry, TransportRegistry};

#[derive(Clone)]
pub struct McpState {
    pub sessions: SharedSessionManager,
    pub transports: SharedTransportRegistry,
    pub contexts: SharedContextStore,
    pub dispatcher: Arc<McpDispatcher>,
    /// Server-side upstream credential bound to new sessions
    pub upstream_credential: Option<String>,
}

impl McpState {
    pub fn new(
        metadata: ServerMetadata,
        tools: SharedToolRegistry,
        context_max_age: Duration,
        upstream_credential: Option<String>,
    ) -> Self {
        let sessions = create_session_manager();
        let contexts = create_context_store(context_max_age);
        let dispatcher =
            Arc::new(McpDispatcher::new(metadata, tools, sessions.clone(), contexts.clone()));

        Self {
            sessions,
            transports: Arc::new(TransportRegistry::new()),
            contexts,
            dispatcher,
            upstream_credential,
        }
    }

    /// Connected transport for a live session.
    ///
    /// The session is checked again after the transport is created so a DELETE
    /// landing in between cannot leave a transport behind for a dead session.
    pub fn attach_transport(&self, session_id: &SessionId) -> Option<Arc<SessionTransport>> {
        if self.sessions.exists(session_id) {
            let transport = self.transports.get_or_create(session_id);
            if self.sessions.exists(session_id) {
                transport.ensure_connected(&self.dispatcher);
                return Some(transport);
            }
        }
        self.transports.remove(session_id);
        None
    }

    /// Cancel all outstanding work; used during shutdown
    pub fn shutdown(&self) -> usize {
        self.contexts.cancel_all()
    }
}

impl fmt::Debug for McpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpState")
            .field("sessions", &self.sessions.total_sessions())
            .field("transports", &self.transports.len())
            .field("contexts", &self.contexts.len())
            .field("tools", &self.dispatcher.tools().names())
            .field("upstream_credential_set", &self.upstream_credential.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::error::McpError;
    use crate::mcp::protocol::ToolCallResult;
    use crate::mcp::tool_registry::{ToolContext, ToolDefinition, ToolHandler, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Noop;

    #[async_trait]
    impl ToolHandler for Noop {
        async fn call(&self, _arguments: Value, _context: ToolContext) -> Result<ToolCallResult, McpError> {
            Ok(ToolCallResult::text("ok"))
        }
    }

    fn state() -> McpState {
        let tools = ToolRegistry::new(vec![ToolDefinition::new(
            "noop",
            "Does nothing",
            json!({"type": "object"}),
            Arc::new(Noop),
        )])
        .unwrap();
        McpState::new(ServerMetadata::default(), Arc::new(tools), Duration::from_secs(600), None)
    }

    #[test]
    fn test_attach_transport_for_live_session() {
        let state = state();
        let sid = SessionId::generate();
        state.sessions.get_or_create(&sid, None);

        let transport = state.attach_transport(&sid).unwrap();
        assert!(transport.is_connected());
        assert_eq!(state.transports.len(), 1);

        let again = state.attach_transport(&sid).unwrap();
        assert!(Arc::ptr_eq(&transport, &again));
        assert_eq!(transport.connect_count(), 1);
    }

    #[test]
    fn test_attach_transport_unknown_session_creates_nothing() {
        let state = state();
        assert!(state.attach_transport(&SessionId::generate()).is_none());
        assert!(state.transports.is_empty());
    }

    #[test]
    fn test_attach_transport_drops_transport_of_deleted_session() {
        let state = state();
        let sid = SessionId::generate();
        state.sessions.get_or_create(&sid, None);
        state.attach_transport(&sid).unwrap();

        // Session removed but its transport not yet, as mid-DELETE
        state.sessions.remove(&sid);
        assert_eq!(state.transports.len(), 1);

        assert!(state.attach_transport(&sid).is_none());
        assert!(state.transports.is_empty());
    }
}
