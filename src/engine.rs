//! The engine: backing store, unit of work, lifecycle events and the
//! process-wide registry slot, bundled so they can be injected together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};

use crate::builder::EngineBuilder;
use crate::entity::{Entity, EntityType};
use crate::error::{Error, RegistryError};
use crate::events::EventHandler;
use crate::registry::{IndexUpdater, InstanceRegistry, SweepReport};
use crate::session::Session;
use crate::store::GraphStore;
use crate::unit_of_work::UnitOfWork;

/// Default node label of the registry entity.
pub const DEFAULT_REGISTRY_LABEL: &str = "IndexNode";

/// Default edge label from the reference node to the registry.
pub const DEFAULT_REGISTRY_RELATIONSHIP: &str = "index_node";

/// Engine configuration.
///
/// Deserializable so hosts can embed it in their own config files; any
/// field left out takes its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Install the instance registry on start.
    ///
    /// Default: true
    pub instance_registry: bool,

    /// Node label of the registry entity.
    ///
    /// Default: "IndexNode"
    pub registry_label: String,

    /// Edge label linking the reference node to the registry.
    ///
    /// Default: "index_node"
    pub registry_relationship: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instance_registry: true,
            registry_label: DEFAULT_REGISTRY_LABEL.to_string(),
            registry_relationship: DEFAULT_REGISTRY_RELATIONSHIP.to_string(),
        }
    }
}

/// Owns the collaborators shared by every session.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use manifold_ogm::{Engine, Entity, EntityType, MemoryStore};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(MemoryStore::new());
/// let engine = Engine::builder().build(store.clone(), store);
/// engine.start()?;
///
/// let person = EntityType::new("Person");
/// let mut session = engine.session();
/// let alice = Entity::new(person.clone());
/// let bob = Entity::new(person.clone());
/// session.relate(&alice, "friends", &bob);
/// session.save(&alice)?;
///
/// assert_eq!(engine.all_instances(&person)?.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn GraphStore>,
    units: Arc<dyn UnitOfWork>,
    events: EventHandler,
    registry: ArcSwapOption<InstanceRegistry>,
    running: AtomicBool,
}

impl Engine {
    /// Returns a builder for configuring an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn new(
        config: EngineConfig,
        store: Arc<dyn GraphStore>,
        units: Arc<dyn UnitOfWork>,
    ) -> Self {
        Self {
            config,
            store,
            units,
            events: EventHandler::new(),
            registry: ArcSwapOption::empty(),
            running: AtomicBool::new(false),
        }
    }

    /// Starts the engine and notifies listeners. Starting twice is a no-op.
    pub fn start(&self) -> Result<(), Error> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        #[cfg(feature = "logging")]
        log::info!("engine starting");
        if let Err(err) = self.events.engine_started(self) {
            self.running.store(false, Ordering::Release);
            return Err(err);
        }
        Ok(())
    }

    /// Stops the engine and notifies listeners. Stopping twice is a no-op.
    pub fn stop(&self) -> Result<(), Error> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        #[cfg(feature = "logging")]
        log::info!("engine stopping");
        self.events.engine_stopped(self)
    }

    /// Returns `true` between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Returns the unit-of-work manager.
    pub fn units(&self) -> &Arc<dyn UnitOfWork> {
        &self.units
    }

    /// Returns the lifecycle event handler.
    pub fn events(&self) -> &EventHandler {
        &self.events
    }

    /// Returns the instance registry, if one is installed.
    pub fn registry(&self) -> Option<Arc<InstanceRegistry>> {
        self.registry.load_full()
    }

    pub(crate) fn registry_slot(&self) -> &ArcSwapOption<InstanceRegistry> {
        &self.registry
    }

    /// Opens a session for one unit of work.
    pub fn session(self: &Arc<Self>) -> Session {
        Session::new(Arc::clone(self))
    }

    /// Returns every instance of `entity_type`, via the registry.
    pub fn all_instances(&self, entity_type: &EntityType) -> Result<Vec<Entity>, RegistryError> {
        self.registry()
            .ok_or(RegistryError::NotStarted)?
            .all(entity_type)
    }

    /// Re-indexes every instance of `entity_type`, via the registry.
    pub fn update_index(
        &self,
        entity_type: &EntityType,
        updater: &dyn IndexUpdater,
    ) -> Result<SweepReport, RegistryError> {
        self.registry()
            .ok_or(RegistryError::NotStarted)?
            .update_index(entity_type, updater)
    }
}
