//! Per-Session Transports
//!
//! One [`SessionTransport`] exists per MCP session. It binds the session to the
//! shared dispatcher (at most once) and owns the session's optional
//! server-to-client stream, which doubles as the session's notification sink.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mcp::error::McpError;
use crate::mcp::handler::{CallContext, McpDispatcher};
use crate::mcp::notifications::{NotificationSink, StreamMessage};
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::mcp::session::SessionId;

/// Bounded capacity of a session stream; slow readers lose notifications
pub const STREAM_CHANNEL_CAPACITY: usize = 100;

/// A message queued for the SSE stream together with its event id
#[derive(Debug, Clone)]
pub struct StreamEnvelope {
    pub event_id: u64,
    pub message: StreamMessage,
}

struct StreamHandle {
    generation: u64,
    sender: mpsc::Sender<StreamEnvelope>,
}

/// Transport state for one session
pub struct SessionTransport {
    session_id: SessionId,
    dispatcher: OnceLock<Arc<McpDispatcher>>,
    connect_count: AtomicUsize,
    stream: Mutex<Option<StreamHandle>>,
    next_generation: AtomicU64,
    next_event_id: AtomicU64,
}

impl SessionTransport {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            dispatcher: OnceLock::new(),
            connect_count: AtomicUsize::new(0),
            stream: Mutex::new(None),
            next_generation: AtomicU64::new(1),
            next_event_id: AtomicU64::new(1),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Bind this transport to `dispatcher`.
    ///
    /// Only the first call connects; later calls are no-ops and return false.
    pub fn ensure_connected(&self, dispatcher: &Arc<McpDispatcher>) -> bool {
        let mut connected = false;
        self.dispatcher.get_or_init(|| {
            connected = true;
            self.connect_count.fetch_add(1, Ordering::SeqCst);
            dispatcher.clone()
        });

        if connected {
            debug!(session_id = %self.session_id, "Transport connected to dispatcher");
        }
        connected
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.get().is_some()
    }

    /// How many times the underlying connect step actually ran
    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Route a message through the bound dispatcher
    pub async fn handle(
        &self,
        request: JsonRpcRequest,
        call: CallContext,
    ) -> Result<Option<JsonRpcResponse>, McpError> {
        let dispatcher = self.dispatcher.get().cloned().ok_or_else(|| {
            McpError::InternalError(format!("transport for session {} is not connected", self.session_id))
        })?;
        Ok(dispatcher.dispatch(request, call).await)
    }

    fn stream(&self) -> MutexGuard<'_, Option<StreamHandle>> {
        self.stream.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open the server-to-client stream, replacing any previous one
    pub fn open_stream(&self) -> (u64, mpsc::Receiver<StreamEnvelope>) {
        let (sender, receiver) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

        if self.stream().replace(StreamHandle { generation, sender }).is_some() {
            info!(session_id = %self.session_id, "Replaced existing session stream");
        }
        (generation, receiver)
    }

    /// Detach the stream opened as `generation`, unless it was already replaced
    pub fn close_stream(&self, generation: u64) -> bool {
        let mut stream = self.stream();
        match stream.as_ref() {
            Some(handle) if handle.generation == generation => {
                *stream = None;
                debug!(session_id = %self.session_id, generation, "Session stream detached");
                true
            }
            _ => false,
        }
    }

    pub fn has_stream(&self) -> bool {
        self.stream().as_ref().map(|handle| !handle.sender.is_closed()).unwrap_or(false)
    }

    /// Drop the stream; receivers see end-of-stream
    pub fn close(&self) {
        self.stream().take();
    }
}

impl NotificationSink for SessionTransport {
    fn push(&self, message: StreamMessage) -> bool {
        let mut stream = self.stream();
        let Some(handle) = stream.as_ref() else {
            return false;
        };

        let event_id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        match handle.sender.try_send(StreamEnvelope { event_id, message }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session_id = %self.session_id, "Session stream is full; dropping notification");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                *stream = None;
                false
            }
        }
    }
}

impl std::fmt::Debug for SessionTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTransport")
            .field("session_id", &self.session_id)
            .field("connected", &self.is_connected())
            .field("has_stream", &self.has_stream())
            .finish()
    }
}

/// Session id to transport mapping
#[derive(Debug, Default)]
pub struct TransportRegistry {
    transports: DashMap<SessionId, Arc<SessionTransport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lazily create the transport for `session_id`
    pub fn get_or_create(&self, session_id: &SessionId) -> Arc<SessionTransport> {
        self.transports
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(SessionTransport::new(session_id.clone())))
            .clone()
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<SessionTransport>> {
        self.transports.get(session_id).map(|entry| entry.clone())
    }

    /// Remove and close the transport for `session_id`
    pub fn remove(&self, session_id: &SessionId) -> Option<Arc<SessionTransport>> {
        let (_, transport) = self.transports.remove(session_id)?;
        transport.close();
        Some(transport)
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

pub type SharedTransportRegistry = Arc<TransportRegistry>;
