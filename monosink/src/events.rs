//! Play-state notifications
//!
//! The UI emits a boolean play/pause signal. Interested parties bind a
//! handler for as long as they live and unbind it when they go away.
//! Handlers run synchronously on the emitting thread, outside the registry
//! lock, so a handler may unbind itself.

use crate::dsp::stream::lock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Handler invoked with each emitted value
pub type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Registration token returned by [`Event::bind_handler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Handler registry for one event type.
pub struct Event<T> {
    handlers: Mutex<Vec<(HandlerId, Handler<T>)>>,
    next_id: AtomicU64,
}

/// Play (true) / pause (false) notifications
pub type PlayStateEvents = Event<bool>;

impl<T: Clone> Event<T> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn bind_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.handlers).push((id, Arc::new(handler)));
        trace!("Bound handler {:?}", id);
        id
    }

    /// Returns false if the handler was not bound.
    pub fn unbind_handler(&self, id: HandlerId) -> bool {
        let mut handlers = lock(&self.handlers);
        let before = handlers.len();
        handlers.retain(|(bound, _)| *bound != id);
        trace!("Unbound handler {:?}", id);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.handlers).len()
    }

    /// Invoke every bound handler with `value`.
    pub fn emit(&self, value: T) {
        let handlers: Vec<Handler<T>> = lock(&self.handlers)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(value.clone());
        }
    }
}

impl<T: Clone> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}
