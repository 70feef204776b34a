//! Close notification for outgoing responses.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Listener = Box<dyn FnOnce() + Send>;

/// Handle returned by [`CloseListeners::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct ListenerState {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
    closed: bool,
}

/// A set of one-shot listeners fired when something closes.
///
/// Clones share the same set, so a transport can keep one to report a
/// client disconnect while the emitter registers against another. Once
/// notified the set stays closed and late registrations fire immediately.
#[derive(Clone, Default)]
pub struct CloseListeners {
    inner: Arc<Mutex<ListenerState>>,
}

impl CloseListeners {
    /// Create an open listener set.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ListenerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener.
    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state();
        let id = ListenerId(state.next_id);
        state.next_id += 1;

        if state.closed {
            drop(state);
            listener();
        } else {
            state.listeners.push((id, Box::new(listener)));
        }
        id
    }

    /// Remove a listener that has not fired yet.
    pub fn deregister(&self, id: ListenerId) -> bool {
        let mut state = self.state();
        let before = state.listeners.len();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
        state.listeners.len() != before
    }

    /// Mark closed and fire every registered listener.
    pub fn notify(&self) {
        let listeners = {
            let mut state = self.state();
            state.closed = true;
            std::mem::take(&mut state.listeners)
        };
        for (_, listener) in listeners {
            listener();
        }
    }

    /// Whether `notify` has run.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Number of pending listeners.
    pub fn len(&self) -> usize {
        self.state().listeners.len()
    }

    /// Whether no listeners are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CloseListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("CloseListeners")
            .field("pending", &state.listeners.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// A callback that runs at most once, however many paths try to fire it.
#[derive(Clone)]
pub struct OnceCallback {
    inner: Arc<Mutex<Option<Listener>>>,
}

impl OnceCallback {
    /// Wrap a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(callback)))),
        }
    }

    /// Run the callback if it has not run yet. Returns whether it ran.
    pub fn fire(&self) -> bool {
        let callback = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Whether the callback already ran.
    pub fn has_fired(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl std::fmt::Debug for OnceCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnceCallback")
            .field("fired", &self.has_fired())
            .finish()
    }
}
