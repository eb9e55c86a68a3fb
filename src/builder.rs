use std::sync::Arc;

use crate::engine::{Engine, EngineConfig};
use crate::registry::RegistryBootstrap;
use crate::store::GraphStore;
use crate::unit_of_work::UnitOfWork;

/// Builder for configuring an [`Engine`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use manifold_ogm::{Engine, MemoryStore};
///
/// let store = Arc::new(MemoryStore::new());
/// let engine = Engine::builder()
///     .registry_relationship("instances")
///     .build(store.clone(), store);
/// assert_eq!(engine.config().registry_relationship, "instances");
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Replaces the whole configuration, e.g. one loaded from a file.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Enables or disables the instance registry.
    ///
    /// Default: enabled
    #[must_use]
    pub fn instance_registry(mut self, enabled: bool) -> Self {
        self.config.instance_registry = enabled;
        self
    }

    /// Sets the node label of the registry entity.
    #[must_use]
    pub fn registry_label(mut self, label: impl Into<String>) -> Self {
        self.config.registry_label = label.into();
        self
    }

    /// Sets the edge label linking the reference node to the registry.
    #[must_use]
    pub fn registry_relationship(mut self, label: impl Into<String>) -> Self {
        self.config.registry_relationship = label.into();
        self
    }

    /// Builds the engine. It is not started.
    pub fn build(self, store: Arc<dyn GraphStore>, units: Arc<dyn UnitOfWork>) -> Arc<Engine> {
        let engine = Engine::new(self.config, store, units);
        if engine.config().instance_registry {
            engine.events().add(Arc::new(RegistryBootstrap));
        }
        Arc::new(engine)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
