//! Cooperative Cancellation
//!
//! A one-way `Active -> Cancelled` signal shared between the context store and
//! the tool work it guards. Listeners registered with [`CancellationToken::on_cancel`]
//! run synchronously at cancellation time, or immediately if the token was
//! already cancelled, so a registration can never miss the signal. Async code
//! can instead await [`CancellationToken::cancelled`], which is backed by
//! `tokio_util::sync::CancellationToken`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Callback run once when a token is cancelled
pub type CancelListener = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct ListenerState {
    cancelled: bool,
    listeners: Vec<CancelListener>,
}

#[derive(Default)]
struct TokenInner {
    signal: tokio_util::sync::CancellationToken,
    state: Mutex<ListenerState>,
}

/// Cloneable cancellation token; clones observe the same signal
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ListenerState> {
        // A panicking listener runs outside the lock, so poisoning only
        // happens on a bug elsewhere; the state itself stays consistent.
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Transition to cancelled and run every registered listener.
    ///
    /// Idempotent: later calls do nothing.
    pub fn cancel(&self) {
        let listeners = {
            let mut state = self.state();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            self.inner.signal.cancel();
            std::mem::take(&mut state.listeners)
        };

        for listener in listeners {
            listener();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.signal.is_cancelled()
    }

    /// Register a listener.
    ///
    /// Runs `listener` right away when the token is already cancelled.
    pub fn on_cancel<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state();
        if state.cancelled {
            drop(state);
            listener();
        } else {
            state.listeners.push(Box::new(listener));
        }
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        self.inner.signal.cancelled().await
    }

    /// Number of listeners still waiting for cancellation
    pub fn pending_listeners(&self) -> usize {
        self.state().listeners.len()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken").field("cancelled", &self.is_cancelled()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_pending, assert_ready, task};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> CancelListener) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        let make = move || -> CancelListener {
            let handle = handle.clone();
            Box::new(move || {
                handle.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, make)
    }

    #[test]
    fn test_new_token_is_active() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_monotonic_and_idempotent() {
        let token = CancellationToken::new();
        let (count, listener) = counter();
        token.on_cancel(listener());

        token.cancel();
        token.cancel();

        assert!(token.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_registered_after_cancel_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel();

        let (count, listener) = counter();
        token.on_cancel(listener());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(token.pending_listeners(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        let (count, listener) = counter();
        clone.on_cancel(listener());
        assert_eq!(token.pending_listeners(), 1);

        token.cancel();

        assert!(clone.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(clone.pending_listeners(), 0);
    }

    #[test]
    fn test_listener_sees_cancelled_state() {
        let token = CancellationToken::new();
        let observed = Arc::new(AtomicUsize::new(0));
        let inner = token.clone();
        let flag = observed.clone();
        token.on_cancel(move || {
            if inner.is_cancelled() {
                flag.store(1, Ordering::SeqCst);
            }
        });

        token.cancel();
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancelled_future_resolves_on_cancel() {
        let token = CancellationToken::new();
        let mut waiter = task::spawn(token.cancelled());
        assert_pending!(waiter.poll());

        token.cancel();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_cancel_from_another_task() {
        let token = CancellationToken::new();
        let remote = token.clone();

        let handle = tokio::spawn(async move {
            remote.cancelled().await;
            remote.is_cancelled()
        });

        tokio::task::yield_now().await;
        token.cancel();

        assert!(handle.await.unwrap());
    }

    #[test]
    fn test_concurrent_registration_and_cancel() {
        for _ in 0..50 {
            let token = CancellationToken::new();
            let (count, listener) = counter();
            let listener = Arc::new(listener);

            let registrars: Vec<_> = (0..4)
                .map(|_| {
                    let token = token.clone();
                    let listener = listener.clone();
                    std::thread::spawn(move || token.on_cancel(listener()))
                })
                .collect();
            let canceller = {
                let token = token.clone();
                std::thread::spawn(move || token.cancel())
            };

            for handle in registrars {
                handle.join().unwrap();
            }
            canceller.join().unwrap();

            // Every listener runs exactly once regardless of interleaving.
            assert_eq!(count.load(Ordering::SeqCst), 4);
        }
    }
}
