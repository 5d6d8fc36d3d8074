//! MCP Session State Management
//!
//! Tracks per-session protocol state across HTTP requests. A session is
//! created when `initialize` arrives and lives until it is deleted; there is
//! no idle expiry. Only request contexts are swept by age.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::mcp::error::McpError;
use crate::mcp::protocol::ClientInfo;

/// Longest session id accepted from a client
const MAX_SESSION_ID_LEN: usize = 128;

/// Opaque session identifier carried in the `mcp-session-id` header
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session id (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a client-supplied id. Ids must be 1-128 visible ASCII characters.
    pub fn parse(raw: &str) -> Result<Self, McpError> {
        if raw.is_empty() || raw.len() > MAX_SESSION_ID_LEN {
            return Err(McpError::InvalidRequest(format!(
                "Session id must be 1-{} characters",
                MAX_SESSION_ID_LEN
            )));
        }
        if !raw.bytes().all(|b| (0x21..=0x7e).contains(&b)) {
            return Err(McpError::InvalidRequest(
                "Session id must contain only visible ASCII characters".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-session MCP state
#[derive(Clone)]
pub struct McpSession {
    pub id: SessionId,
    /// Set once `initialize` has been answered
    pub initialized: bool,
    /// Set once the client sent `notifications/initialized`
    pub client_ready: bool,
    pub protocol_version: Option<String>,
    pub client_info: Option<ClientInfo>,
    /// Capabilities the client declared during initialize
    pub client_capabilities: Value,
    /// Upstream credential bound to this session at creation
    pub credential: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: Instant,
}

impl McpSession {
    pub fn new(id: SessionId, credential: Option<String>) -> Self {
        Self {
            id,
            initialized: false,
            client_ready: false,
            protocol_version: None,
            client_info: None,
            client_capabilities: Value::Null,
            credential,
            created_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }

    /// Update the last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("id", &self.id)
            .field("initialized", &self.initialized)
            .field("client_ready", &self.client_ready)
            .field("protocol_version", &self.protocol_version)
            .field("client_info", &self.client_info)
            .field("credential_set", &self.credential.is_some())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Process-lifetime session store
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<SessionId, McpSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an existing session or create a new one bound to `credential`.
    ///
    /// An existing session keeps its original credential.
    pub fn get_or_create(&self, id: &SessionId, credential: Option<String>) -> McpSession {
        let mut entry = self.sessions.entry(id.clone()).or_insert_with(|| {
            debug!(session_id = %id, "Created new MCP session");
            McpSession::new(id.clone(), credential)
        });
        entry.touch();
        entry.clone()
    }

    /// Get a snapshot of a session
    pub fn get(&self, id: &SessionId) -> Option<McpSession> {
        self.sessions.get(id).map(|entry| entry.clone())
    }

    /// Record the outcome of `initialize`. Returns false for an unknown session.
    pub fn mark_initialized(
        &self,
        id: &SessionId,
        protocol_version: &str,
        client_info: Option<ClientInfo>,
        client_capabilities: Value,
    ) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.initialized = true;
                session.protocol_version = Some(protocol_version.to_string());
                session.client_info = client_info;
                session.client_capabilities = client_capabilities;
                session.touch();
                debug!(session_id = %id, protocol_version, "Session initialized");
                true
            }
            None => false,
        }
    }

    /// Record `notifications/initialized`
    pub fn mark_client_ready(&self, id: &SessionId) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.client_ready = true;
                session.touch();
                true
            }
            None => false,
        }
    }

    pub fn is_initialized(&self, id: &SessionId) -> bool {
        self.sessions.get(id).map(|s| s.initialized).unwrap_or(false)
    }

    /// Refresh activity on an existing session
    pub fn touch(&self, id: &SessionId) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.touch();
        }
    }

    pub fn exists(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Remove a session, returning its final state
    pub fn remove(&self, id: &SessionId) -> Option<McpSession> {
        let removed = self.sessions.remove(id).map(|(_, session)| session);
        if removed.is_some() {
            debug!(session_id = %id, "Removed MCP session");
        }
        removed
    }

    pub fn total_sessions(&self) -> usize {
        self.sessions.len()
    }
}

/// Shared session manager type
pub type SharedSessionManager = Arc<SessionManager>;

/// Create a new shared session manager
pub fn create_session_manager() -> SharedSessionManager {
    Arc::new(SessionManager::new())
}
