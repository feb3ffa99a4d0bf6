//! Subscriber fan-out for engine notifications.
//!
//! Every current subscriber is notified once per state change, in
//! subscription order. Handlers are invoked after the subscriber list lock is
//! released, so a handler may subscribe, unsubscribe or call back into the
//! engine. A handler registered while a notification is in flight does not
//! receive that notification.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Observers<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

/// Ordered list of notification handlers.
pub struct ObserverList<T> {
    inner: Arc<Mutex<Observers<T>>>,
}

impl<T: 'static> ObserverList<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Observers {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Observers<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `handler`; it stays registered until the returned
    /// subscription is unsubscribed or the list is cleared.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut observers = self.lock();
        let id = observers.next_id;
        observers.next_id += 1;
        observers.handlers.push((id, Arc::new(handler)));

        let weak: Weak<Mutex<Observers<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut observers = inner.lock().unwrap_or_else(|e| e.into_inner());
                    observers.handlers.retain(|(handler_id, _)| *handler_id != id);
                }
            })),
        }
    }

    /// Deliver `value` to every handler registered at call time.
    pub fn notify(&self, value: &T) {
        let handlers = self
            .lock()
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect::<Vec<_>>();
        for handler in handlers {
            handler(value);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().handlers.clear();
    }
}

impl<T: 'static> Default for ObserverList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`. Dropping it keeps the handler registered.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
