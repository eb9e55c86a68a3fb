//! Lifecycle notifications.

use std::sync::{Arc, PoisonError, RwLock};

use crate::engine::Engine;
use crate::entity::Entity;
use crate::error::Error;

/// Receives entity and engine lifecycle notifications.
///
/// Every method has a no-op default, so listeners implement only what
/// they care about.
pub trait LifecycleListener: Send + Sync {
    /// Called after an entity's backing node has been created.
    fn on_entity_created(&self, _entity: &Entity) -> Result<(), Error> {
        Ok(())
    }

    /// Called when the engine starts.
    fn on_engine_started(&self, _engine: &Engine) -> Result<(), Error> {
        Ok(())
    }

    /// Called when the engine stops.
    fn on_engine_stopped(&self, _engine: &Engine) -> Result<(), Error> {
        Ok(())
    }
}

/// Dispatches lifecycle notifications to registered listeners.
///
/// Dispatch works on a snapshot of the listener list, so a listener may
/// add or remove listeners (including itself) while being notified.
/// Listeners are notified in registration order; the first error stops
/// the dispatch and is returned.
#[derive(Default)]
pub struct EventHandler {
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
}

impl EventHandler {
    /// Creates a handler with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn add(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn remove(&self, listener: &Arc<dyn LifecycleListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    /// Returns `true` if `listener` is registered.
    pub fn contains(&self, listener: &Arc<dyn LifecycleListener>) -> bool {
        self.snapshot().iter().any(|l| same_listener(l, listener))
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notifies listeners that `entity` was created.
    pub fn entity_created(&self, entity: &Entity) -> Result<(), Error> {
        for listener in self.snapshot() {
            listener.on_entity_created(entity)?;
        }
        Ok(())
    }

    /// Notifies listeners that `engine` started.
    pub fn engine_started(&self, engine: &Engine) -> Result<(), Error> {
        for listener in self.snapshot() {
            listener.on_engine_started(engine)?;
        }
        Ok(())
    }

    /// Notifies listeners that `engine` stopped.
    pub fn engine_stopped(&self, engine: &Engine) -> Result<(), Error> {
        for listener in self.snapshot() {
            listener.on_engine_stopped(engine)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<Arc<dyn LifecycleListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn same_listener(a: &Arc<dyn LifecycleListener>, b: &Arc<dyn LifecycleListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
