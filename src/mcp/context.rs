//! Request Context Store
//!
//! Bookkeeping for in-flight `tools/call` requests: each context carries the
//! cancellation token handed to the tool, the owning session and the upstream
//! credential. Contexts are keyed by `(session id, request id)` so two sessions
//! reusing the same JSON-RPC id cannot clobber each other.
//!
//! A background sweeper drops contexts older than the configured age. The sweep
//! only frees bookkeeping; it never cancels running work.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::mcp::cancellation::CancellationToken;
use crate::mcp::protocol::JsonRpcId;
use crate::mcp::session::SessionId;

/// Default age after which a context is swept
pub const DEFAULT_CONTEXT_MAX_AGE: Duration = Duration::from_secs(600);

/// Default period of the sweeper task
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Composite key of a request context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub session_id: Option<SessionId>,
    pub request_id: JsonRpcId,
}

impl ContextKey {
    pub fn new(session_id: Option<&SessionId>, request_id: JsonRpcId) -> Self {
        Self { session_id: session_id.cloned(), request_id }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session_id {
            Some(session) => write!(f, "{}/{}", session, self.request_id),
            None => write!(f, "-/{}", self.request_id),
        }
    }
}

/// Metadata for one in-flight request
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: JsonRpcId,
    pub session_id: Option<SessionId>,
    pub token: CancellationToken,
    pub credential: Option<String>,
    pub created_at: DateTime<Utc>,
    created: Instant,
}

impl RequestContext {
    /// Time since the context was created
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created)
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("session_id", &self.session_id)
            .field("cancelled", &self.token.is_cancelled())
            .field("credential_set", &self.credential.is_some())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Shared mapping of in-flight request contexts
pub struct RequestContextStore {
    contexts: DashMap<ContextKey, RequestContext>,
    max_age: Duration,
}

impl Default for RequestContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_MAX_AGE)
    }
}

impl RequestContextStore {
    pub fn new(max_age: Duration) -> Self {
        Self { contexts: DashMap::new(), max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Allocate a context with a fresh token.
    ///
    /// An existing context under the same key is replaced (last write wins).
    pub fn create(
        &self,
        session_id: Option<&SessionId>,
        request_id: JsonRpcId,
        credential: Option<String>,
    ) -> RequestContext {
        self.create_at(session_id, request_id, credential, Instant::now())
    }

    fn create_at(
        &self,
        session_id: Option<&SessionId>,
        request_id: JsonRpcId,
        credential: Option<String>,
        created: Instant,
    ) -> RequestContext {
        let key = ContextKey::new(session_id, request_id.clone());
        let context = RequestContext {
            request_id,
            session_id: session_id.cloned(),
            token: CancellationToken::new(),
            credential,
            created_at: Utc::now(),
            created,
        };

        if self.contexts.insert(key.clone(), context.clone()).is_some() {
            warn!(context = %key, "Replaced existing request context with the same id");
        } else {
            debug!(context = %key, "Created request context");
        }

        context
    }

    pub fn get(&self, session_id: Option<&SessionId>, request_id: &JsonRpcId) -> Option<RequestContext> {
        let key = ContextKey::new(session_id, request_id.clone());
        self.contexts.get(&key).map(|entry| entry.clone())
    }

    /// Signal the context's token. Returns false when no such context exists.
    pub fn cancel(&self, session_id: Option<&SessionId>, request_id: &JsonRpcId) -> bool {
        let key = ContextKey::new(session_id, request_id.clone());
        // Clone the token out so listeners never run under the map's shard lock.
        let token = self.contexts.get(&key).map(|entry| entry.token.clone());
        match token {
            Some(token) => {
                token.cancel();
                debug!(context = %key, "Cancelled request context");
                true
            }
            None => {
                debug!(context = %key, "No request context to cancel");
                false
            }
        }
    }

    /// Remove a context once its handler settled
    pub fn delete(&self, session_id: Option<&SessionId>, request_id: &JsonRpcId) -> bool {
        let key = ContextKey::new(session_id, request_id.clone());
        self.contexts.remove(&key).is_some()
    }

    /// Cancel and drop every context owned by `session_id`. Returns how many were cancelled.
    pub fn cancel_session(&self, session_id: &SessionId) -> usize {
        let keys: Vec<ContextKey> = self
            .contexts
            .iter()
            .filter(|entry| entry.key().session_id.as_ref() == Some(session_id))
            .map(|entry| entry.key().clone())
            .collect();

        let mut cancelled = 0;
        for key in keys {
            if let Some((_, context)) = self.contexts.remove(&key) {
                context.token.cancel();
                cancelled += 1;
            }
        }

        if cancelled > 0 {
            info!(session_id = %session_id, cancelled, "Cancelled in-flight requests for session");
        }
        cancelled
    }

    /// Cancel every outstanding context, used during shutdown
    pub fn cancel_all(&self) -> usize {
        let tokens: Vec<CancellationToken> =
            self.contexts.iter().map(|entry| entry.token.clone()).collect();
        for token in &tokens {
            token.cancel();
        }
        self.contexts.clear();
        tokens.len()
    }

    /// Drop every context older than the max age
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// Sweep as if the current time were `now`
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.contexts.len();
        self.contexts.retain(|_, context| context.age_at(now) <= self.max_age);
        let removed = before.saturating_sub(self.contexts.len());

        if removed > 0 {
            info!(removed, remaining = self.contexts.len(), "Swept expired request contexts");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// Shared context store type
pub type SharedContextStore = Arc<RequestContextStore>;

/// Create a new shared context store
pub fn create_context_store(max_age: Duration) -> SharedContextStore {
    Arc::new(RequestContextStore::new(max_age))
}

/// Handle to the periodic sweep task
pub struct ContextSweeper {
    shutdown: tokio_util::sync::CancellationToken,
    handle: JoinHandle<()>,
}

impl ContextSweeper {
    /// Start sweeping `store` every `interval`
    pub fn spawn(store: SharedContextStore, interval: Duration) -> Self {
        let shutdown = tokio_util::sync::CancellationToken::new();
        let stop = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        store.sweep_expired();
                    }
                }
            }
            debug!("Context sweeper stopped");
        });

        info!(interval_secs = interval.as_secs_f64(), "Started request context sweeper");
        Self { shutdown, handle }
    }

    /// Stop the sweeper and wait for it to exit
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Context sweeper task ended abnormally");
        }
    }
}
