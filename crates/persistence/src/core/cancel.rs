//! Cooperative cancellation of storage operations.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::TransactionError;

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    next_hook: AtomicU64,
    hooks: Mutex<Vec<(u64, Hook)>>,
}

/// A cancellation signal shared between a caller and running operations.
///
/// Clones share state. Operations check the flag before every statement;
/// a backend may additionally register a hook that aborts the statement
/// currently executing (for SQLite, the connection's interrupt handle).
///
/// ```
/// use cfgstore_persistence::core::Cancellation;
///
/// let token = Cancellation::new();
/// assert!(token.check().is_ok());
/// token.clone().cancel();
/// assert!(token.check().is_err());
/// ```
#[derive(Clone, Default)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

impl Cancellation {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every operation observing this token.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks: Vec<Hook> = self
            .inner
            .hooks
            .lock()
            .iter()
            .map(|(_, hook)| Arc::clone(hook))
            .collect();
        for hook in hooks {
            hook();
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`TransactionError::Cancelled`] if cancelled.
    pub fn check(&self) -> Result<(), TransactionError> {
        if self.is_cancelled() {
            Err(TransactionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Registers `hook` to run on cancellation until the guard is dropped.
    ///
    /// If the token is already cancelled the hook runs immediately.
    pub fn on_cancel<F>(&self, hook: F) -> CancelGuard
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_hook.fetch_add(1, Ordering::Relaxed);
        let hook: Hook = Arc::new(hook);
        self.inner.hooks.lock().push((id, Arc::clone(&hook)));
        if self.is_cancelled() {
            hook();
        }
        CancelGuard {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }
}

impl fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Deregisters a cancellation hook when dropped.
#[must_use = "the hook is removed as soon as the guard is dropped"]
pub struct CancelGuard {
    inner: Weak<Inner>,
    id: u64,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.hooks.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_check() {
        let token = Cancellation::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(token.check(), Err(TransactionError::Cancelled)));
    }

    #[test]
    fn test_hook_runs_once_while_registered() {
        let token = Cancellation::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _guard = token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel();
        token.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_guard_removes_hook() {
        let token = Cancellation::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        drop(token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        token.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_hook_registered_after_cancel_runs_immediately() {
        let token = Cancellation::new();
        token.cancel();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _guard = token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
