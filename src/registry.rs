//! The instance registry: a graph node linked to every entity instance.
//!
//! When the engine starts, a registry node is created and linked from the
//! store's reference node. From then on every newly created entity is
//! connected to it with an edge typed by the entity's root label, which
//! makes "all instances of a type" an outgoing-edge scan.

use std::error::Error as StdError;
use std::sync::Arc;

use crate::engine::Engine;
use crate::entity::{Entity, EntityType};
use crate::error::{Error, RegistryError};
use crate::events::LifecycleListener;
use crate::store::GraphStore;
use crate::types::{Direction, NodeId, RawEdge};
use crate::unit_of_work::{UnitOfWork, transactional};

/// Error type returned by an [`IndexUpdater`].
pub type IndexError = Box<dyn StdError + Send + Sync>;

/// Refreshes the external index entries of one entity.
pub trait IndexUpdater {
    /// Re-indexes `entity`.
    fn update_index(&self, entity: &Entity) -> Result<(), IndexError>;
}

impl<F> IndexUpdater for F
where
    F: Fn(&Entity) -> Result<(), IndexError>,
{
    fn update_index(&self, entity: &Entity) -> Result<(), IndexError> {
        self(entity)
    }
}

/// Outcome of an [`InstanceRegistry::update_index`] sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Instances the sweep tried to update
    pub attempted: usize,
    /// Instances updated successfully
    pub updated: usize,
    /// Instances that failed, with the error message
    pub failures: Vec<(NodeId, String)>,
}

/// Registry node every entity instance is connected to.
pub struct InstanceRegistry {
    node: Entity,
    store: Arc<dyn GraphStore>,
    units: Arc<dyn UnitOfWork>,
}

impl InstanceRegistry {
    /// Creates a registry around an existing, persisted registry entity.
    ///
    /// Normally the engine does this on start; constructing one directly
    /// gives tests an isolated registry.
    pub fn new(node: Entity, store: Arc<dyn GraphStore>, units: Arc<dyn UnitOfWork>) -> Self {
        Self { node, store, units }
    }

    /// Returns the registry's own entity.
    pub fn entity(&self) -> &Entity {
        &self.node
    }

    /// Connects `entity` under its root label.
    ///
    /// See [`connect_as`](Self::connect_as).
    pub fn connect(&self, entity: &Entity) -> Result<Option<RawEdge>, RegistryError> {
        self.connect_as(entity, entity.entity_type().root_label())
    }

    /// Creates an edge of `rel_type` from the registry to `entity`.
    ///
    /// Never connects the registry to itself; that case returns `Ok(None)`.
    /// Runs inside the active unit of work, or opens and commits one.
    pub fn connect_as(
        &self,
        entity: &Entity,
        rel_type: &str,
    ) -> Result<Option<RawEdge>, RegistryError> {
        if *entity == self.node {
            return Ok(None);
        }
        let (Some(registry), Some(target)) = (self.node.id(), entity.id()) else {
            return Err(RegistryError::NotPersisted);
        };

        let raw = transactional(self.units.as_ref(), || {
            self.store
                .create_edge(registry, rel_type, target)
                .map_err(RegistryError::from)
        })?;

        #[cfg(feature = "logging")]
        log::trace!("registry connected {entity} as '{rel_type}'");

        Ok(Some(raw))
    }

    /// Connects a newly created entity unless it is the registry itself.
    pub fn on_entity_created(&self, entity: &Entity) -> Result<(), RegistryError> {
        if *entity != self.node {
            self.connect(entity)?;
        }
        Ok(())
    }

    /// Returns every registered instance of `entity_type` and its subtypes.
    ///
    /// Instances are typed from their node label and registered under the
    /// queried root, so a subtype instance keeps its root label.
    pub fn all(&self, entity_type: &EntityType) -> Result<Vec<Entity>, RegistryError> {
        let Some(registry) = self.node.id() else {
            return Err(RegistryError::NotPersisted);
        };
        let root = entity_type.root_label();
        let mut instances = Vec::new();
        for raw in self.store.edges(registry, root, Direction::Outgoing)? {
            if Some(raw.end) == self.node.id() {
                continue;
            }
            let label = self.store.node_label(raw.end)?;
            let instance_type = if label == root {
                EntityType::new(label)
            } else {
                EntityType::with_root(label, root)
            };
            instances.push(Entity::from_node(instance_type, raw.end));
        }
        Ok(instances)
    }

    /// Re-indexes every instance of `entity_type`.
    ///
    /// Each instance is updated independently: a failure is recorded and
    /// the sweep moves on. If anything failed the report is returned inside
    /// [`RegistryError::SweepFailed`].
    pub fn update_index(
        &self,
        entity_type: &EntityType,
        updater: &dyn IndexUpdater,
    ) -> Result<SweepReport, RegistryError> {
        let mut report = SweepReport::default();
        for entity in self.all(entity_type)? {
            report.attempted += 1;
            match updater.update_index(&entity) {
                Ok(()) => report.updated += 1,
                Err(err) => {
                    #[cfg(feature = "logging")]
                    log::warn!("index update failed for {entity}: {err}");
                    if let Some(id) = entity.id() {
                        report.failures.push((id, err.to_string()));
                    }
                }
            }
        }

        if report.failures.is_empty() {
            Ok(report)
        } else {
            Err(RegistryError::SweepFailed(report))
        }
    }

    /// Installs the registry for `engine`.
    ///
    /// Does nothing if the reference node already links to a registry that
    /// the engine holds. If the link exists but the engine holds no registry
    /// (a restart over existing data), the linked node is adopted. Otherwise
    /// a registry node is created and linked. In the last two cases the
    /// registry is cached on the engine and starts listening for entity
    /// creation.
    pub fn on_engine_started(engine: &Engine) -> Result<(), Error> {
        let store = engine.store();
        let reference = store.reference_node();
        let link = engine.config().registry_relationship.as_str();

        if let Some(existing) = store
            .edges(reference, link, Direction::Outgoing)?
            .into_iter()
            .next()
        {
            if engine.registry().is_none() {
                let node = store.wrap_node(existing.end)?;
                Self::install(engine, node);
            }
            return Ok(());
        }

        let node = Entity::new(EntityType::new(engine.config().registry_label.as_str()));
        transactional(engine.units().as_ref(), || {
            node.create_node(store.as_ref())?;
            if let Some(id) = node.id() {
                store.create_edge(reference, link, id)?;
            }
            Ok::<_, Error>(())
        })?;
        Self::install(engine, node);
        Ok(())
    }

    /// Stops listening for entity creation and drops the cached registry.
    pub fn on_engine_stopped(engine: &Engine) -> Result<(), Error> {
        if let Some(registry) = engine.registry_slot().swap(None) {
            let listener: Arc<dyn LifecycleListener> = registry;
            engine.events().remove(&listener);

            #[cfg(feature = "logging")]
            log::debug!("instance registry removed");
        }
        Ok(())
    }

    fn install(engine: &Engine, node: Entity) {
        let registry = Arc::new(InstanceRegistry::new(
            node,
            Arc::clone(engine.store()),
            Arc::clone(engine.units()),
        ));
        engine.registry_slot().store(Some(Arc::clone(&registry)));
        engine.events().add(registry);

        #[cfg(feature = "logging")]
        log::debug!("instance registry installed");
    }
}

impl LifecycleListener for InstanceRegistry {
    fn on_entity_created(&self, entity: &Entity) -> Result<(), Error> {
        InstanceRegistry::on_entity_created(self, entity).map_err(Error::from)
    }
}

/// Listener that installs and removes the [`InstanceRegistry`] with the engine.
pub struct RegistryBootstrap;

impl LifecycleListener for RegistryBootstrap {
    fn on_engine_started(&self, engine: &Engine) -> Result<(), Error> {
        InstanceRegistry::on_engine_started(engine)
    }

    fn on_engine_stopped(&self, engine: &Engine) -> Result<(), Error> {
        InstanceRegistry::on_engine_stopped(engine)
    }
}
