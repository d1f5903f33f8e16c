//! Event system shared by the data-access components.
//!
//! Each component (cache, pool, breaker, retry) defines its own event enum
//! and emits through an [`EventListeners`] collection. Listeners are
//! fire-and-forget observers; nothing in the layer depends on them for
//! correctness.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait implemented by every component's event type.
pub trait ComponentEvent: Send + Sync + fmt::Debug {
    /// A stable identifier for the event (e.g. "eviction", "state_transition").
    fn event_type(&self) -> &'static str;

    /// When the event occurred.
    fn timestamp(&self) -> Instant;

    /// The configured name of the component instance that emitted it.
    fn component(&self) -> &str;
}

/// Trait for receiving component events.
pub trait EventListener<E: ComponentEvent>: Send + Sync {
    /// Called for each emitted event.
    fn on_event(&self, event: &E);
}

/// Type alias for shared event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// An ordered collection of listeners for one component instance.
#[derive(Clone)]
pub struct EventListeners<E: ComponentEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: ComponentEvent> EventListeners<E> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Registers a listener.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to every registered listener.
    ///
    /// A panicking listener is isolated so the remaining listeners still run.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
        }
    }

    /// Returns `true` if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: ComponentEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapter turning a closure into an [`EventListener`].
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _marker: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Wraps the closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ComponentEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
