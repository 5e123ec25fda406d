//! Event fan-out for scan state changes.
//!
//! The orchestrator publishes a `ScanEvent` whenever the in-memory state moves
//! past a throttle boundary, on subscribe, and when the state is cleared.
//! Listeners are called synchronously in registration order. A failing or
//! panicking listener is logged and does not stop the others.

use crate::scan::types::{ProcessingState, ScanError};
use crate::utils::lock;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error};

/// Events published by the orchestrator
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// The current state changed. `None` after the state was cleared.
    StateChanged(Option<ProcessingState>),
    /// A paused scan can be resumed; hosts may bring the analyzer view forward.
    NavigateToAnalyzer { file_hash: String, progress: f64 },
}

/// Trait for handling scan events.
pub trait ScanEventHandler: Send + Sync {
    fn handle(&self, event: &ScanEvent) -> Result<(), ScanError>;

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        "listener"
    }
}

impl<F> ScanEventHandler for F
where
    F: Fn(&ScanEvent) + Send + Sync,
{
    fn handle(&self, event: &ScanEvent) -> Result<(), ScanError> {
        self(event);
        Ok(())
    }
}

type HandlerEntry = (u64, Arc<dyn ScanEventHandler>);

/// Event dispatcher that manages registered listeners.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Mutex<Vec<HandlerEntry>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays registered until the returned
    /// `Subscription` is dropped or unsubscribed.
    pub fn register_handler(self: &Arc<Self>, handler: Arc<dyn ScanEventHandler>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.handlers).push((id, handler));
        debug!("Registered scan listener {}", id);

        Subscription {
            id,
            dispatcher: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) {
        lock(&self.handlers).retain(|(handler_id, _)| *handler_id != id);
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.handlers).len()
    }

    /// Dispatch an event to all registered listeners.
    pub fn dispatch(&self, event: &ScanEvent) {
        // Snapshot so listeners may unsubscribe from inside `handle`.
        let handlers: Vec<HandlerEntry> = lock(&self.handlers).clone();
        for (_, handler) in &handlers {
            Self::deliver(handler.as_ref(), event);
        }
    }

    /// Deliver an event to a single listener with the same error isolation as
    /// `dispatch`.
    pub fn deliver(handler: &dyn ScanEventHandler, event: &ScanEvent) {
        match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Handler {} failed to process event: {}", handler.name(), e),
            Err(_) => error!("Handler {} panicked while processing event", handler.name()),
        }
    }
}

/// Handle for a registered listener.
#[must_use = "dropping a Subscription unregisters the listener"]
pub struct Subscription {
    id: u64,
    dispatcher: Weak<EventDispatcher>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }

    /// Keep the listener registered for the dispatcher's lifetime.
    pub fn detach(mut self) {
        self.dispatcher = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.remove(self.id);
        }
    }
}
