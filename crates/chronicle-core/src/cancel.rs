//! Hierarchical cancellation tokens.
//!
//! A [`CancelToken`] is a node in a tree: cancelling a node cancels every
//! token derived from it with [`CancelToken::child`], never its parent.
//! Cancellation is idempotent. Callbacks registered with
//! [`CancelToken::on_cancel`] run synchronously on the cancelling thread, or
//! immediately when the token is already cancelled. Worker threads that
//! cannot await can poll with [`CancelToken::wait`].

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

type Callback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct NodeState {
    cancelled: bool,
    callbacks: Vec<Callback>,
    children: Vec<Weak<Node>>,
}

#[derive(Default)]
struct Node {
    state: Mutex<NodeState>,
    cond: Condvar,
}

/// Cloneable handle to a node in the cancellation tree.
#[derive(Clone, Default)]
pub struct CancelToken {
    node: Arc<Node>,
}

impl CancelToken {
    /// Create a new root token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child token. A child of a cancelled token starts cancelled.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        let mut state = self.node.state.lock();
        if state.cancelled {
            drop(state);
            child.cancel();
            return child;
        }
        state.children.retain(|w| w.strong_count() > 0);
        state.children.push(Arc::downgrade(&child.node));
        child
    }

    /// Cancel this token and all of its descendants.
    pub fn cancel(&self) {
        let (callbacks, children) = {
            let mut state = self.node.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            let callbacks = std::mem::take(&mut state.callbacks);
            let children = std::mem::take(&mut state.children);
            let _ = self.node.cond.notify_all();
            (callbacks, children)
        };

        for callback in callbacks {
            callback();
        }
        for child in children.iter().filter_map(Weak::upgrade) {
            Self { node: child }.cancel();
        }
    }

    /// Whether this token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.node.state.lock().cancelled
    }

    /// Register a callback to run on cancellation.
    ///
    /// Runs immediately on the calling thread if the token is already cancelled.
    pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) {
        let mut state = self.node.state.lock();
        if state.cancelled {
            drop(state);
            callback();
            return;
        }
        state.callbacks.push(Box::new(callback));
    }

    /// Block until cancelled or `timeout` elapses. Returns whether the token is cancelled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.node.state.lock();
        while !state.cancelled {
            if self.node.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.cancelled
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn initial_state_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        token.on_cancel(move || {
            let _ = c.fetch_add(1, Ordering::SeqCst);
        });
        token.cancel();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parent_cancels_descendants() {
        let root = CancelToken::new();
        let child = root.child();
        let grandchild = child.child();
        root.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn child_does_not_cancel_parent() {
        let root = CancelToken::new();
        let child = root.child();
        let sibling = root.child();
        child.cancel();
        assert!(!root.is_cancelled());
        assert!(!sibling.is_cancelled());
    }

    #[test]
    fn child_of_cancelled_starts_cancelled() {
        let root = CancelToken::new();
        root.cancel();
        assert!(root.child().is_cancelled());
    }

    #[test]
    fn callback_fires_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        token.on_cancel(move || {
            let _ = f.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn child_callbacks_fire_on_parent_cancel() {
        let root = CancelToken::new();
        let child = root.child();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        child.on_cancel(move || {
            let _ = f.fetch_add(1, Ordering::SeqCst);
        });
        root.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_times_out_when_not_cancelled() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.wait(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_wakes_on_cancel_from_other_thread() {
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            remote.cancel();
        });
        assert!(token.wait(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn dropped_children_are_pruned() {
        let root = CancelToken::new();
        for _ in 0..100 {
            let _child = root.child();
        }
        let _kept = root.child();
        assert!(root.node.state.lock().children.len() <= 1);
    }
}
