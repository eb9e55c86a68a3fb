//! Sessions: the relationship stores and identity map of one unit of work.

use std::collections::HashMap;
use std::sync::Arc;

use crate::edge::Edge;
use crate::engine::Engine;
use crate::entity::Entity;
use crate::error::Error;
use crate::identity_map::IdentityMap;
use crate::relationships::{PendingEdges, RelationshipDsl, RelationshipStore};
use crate::types::{Direction, NodeId};
use crate::unit_of_work::transactional;

type StoreKey = (u64, String);

// Nodes and edges written by one save, so a rolled-back save can undo them.
#[derive(Default)]
struct SaveJournal {
    nodes: Vec<Entity>,
    edges: Vec<Edge>,
}

/// Front door for mutating entities and their relationships.
///
/// A session lazily creates one [`RelationshipStore`] per entity instance
/// and relationship type, and shares one [`IdentityMap`] between them.
/// Sessions are single-writer: use one per thread of work.
pub struct Session {
    engine: Arc<Engine>,
    identity_map: IdentityMap,
    stores: HashMap<StoreKey, RelationshipStore>,
}

impl Session {
    /// Opens a session on `engine`.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            identity_map: IdentityMap::new(),
            stores: HashMap::new(),
        }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Returns the identity map shared by this session's stores.
    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity_map
    }

    /// Returns `entity`'s relationship store for `rel_type`, creating it on first use.
    pub fn rels(&mut self, entity: &Entity, rel_type: &str) -> &mut RelationshipStore {
        self.rels_with(entity, RelationshipDsl::new(rel_type))
    }

    /// Like [`rels`](Self::rels), declaring the target type on creation.
    ///
    /// If the store already exists its first declaration is kept.
    pub fn rels_with(&mut self, entity: &Entity, dsl: RelationshipDsl) -> &mut RelationshipStore {
        let key = (entity.instance(), dsl.rel_type().to_string());
        let store = self.engine.store();
        let identity_map = &self.identity_map;
        self.stores.entry(key).or_insert_with(|| {
            RelationshipStore::new(entity.clone(), dsl, Arc::clone(store), identity_map.clone())
        })
    }

    /// Creates a pending edge from `from` to `to`.
    ///
    /// The edge is added to `from`'s outgoing and `to`'s incoming pending
    /// sequences; it is written once, by whichever side is saved first.
    pub fn relate(&mut self, from: &Entity, rel_type: &str, to: &Entity) -> Edge {
        let edge = self.rels(from, rel_type).create_relationship_to(to, Direction::Outgoing);
        self.rels(from, rel_type).add_outgoing_rel(edge.clone());
        self.rels(to, rel_type).add_incoming_rel(edge.clone());
        edge
    }

    /// Builds an entity of the relationship's target type, saves it and
    /// relates `owner` to it.
    pub fn create_related(&mut self, owner: &Entity, rel_type: &str) -> Result<Entity, Error> {
        let target = self.rels(owner, rel_type).build();
        self.save(&target)?;
        self.relate(owner, rel_type, &target);
        Ok(target)
    }

    /// Saves `entity` and flushes its pending relationships.
    ///
    /// Creates the entity's node if it is transient, then the nodes of any
    /// transient neighbours on its live pending edges, then persists each of its
    /// relationship stores. Newly created nodes are announced to lifecycle
    /// listeners. Everything runs in the active unit of work, or a new one.
    ///
    /// If the save opened its own unit of work and fails, the unit is
    /// rolled back and the session is restored: entities and edges written
    /// by the save become transient again and pending edges are put back,
    /// so the save can be retried. When the save joins a unit of work opened
    /// by the caller, rolling that unit back is the caller's business and
    /// the session should be discarded with it.
    pub fn save(&mut self, entity: &Entity) -> Result<(), Error> {
        let engine = Arc::clone(&self.engine);
        let owns_unit = !engine.units().is_active();
        let before: Vec<(StoreKey, PendingEdges)> = if owns_unit {
            self.stores
                .iter()
                .map(|(key, store)| (key.clone(), store.pending()))
                .collect()
        } else {
            Vec::new()
        };

        let mut journal = SaveJournal::default();
        let result = transactional(engine.units().as_ref(), || {
            self.save_in_unit(&engine, entity, &mut journal)
        });
        if result.is_err() && owns_unit {
            self.undo_save(before, &journal);
        }
        result
    }

    fn save_in_unit(
        &mut self,
        engine: &Engine,
        entity: &Entity,
        journal: &mut SaveJournal,
    ) -> Result<(), Error> {
        self.create_node(engine, entity, journal)?;

        let keys: Vec<StoreKey> = self
            .stores
            .keys()
            .filter(|(instance, _)| *instance == entity.instance())
            .cloned()
            .collect();

        for key in keys {
            let Some(store) = self.stores.get(&key) else {
                continue;
            };
            for edge in store.relationships(Direction::Both) {
                if edge.is_destroyed() {
                    continue;
                }
                let neighbor = edge.other_node(entity).clone();
                self.create_node(engine, &neighbor, journal)?;
            }

            let Some(store) = self.stores.get_mut(&key) else {
                continue;
            };
            let saved = store.persist()?;
            for edge in &saved {
                self.forget_counterpart(&key, entity, edge);
            }
            journal.edges.extend(saved);
        }
        Ok(())
    }

    fn undo_save(&mut self, before: Vec<(StoreKey, PendingEdges)>, journal: &SaveJournal) {
        for edge in &journal.edges {
            self.identity_map.remove_edge(edge);
            edge.clear_id();
        }
        for entity in &journal.nodes {
            self.identity_map.remove_node(entity);
            entity.clear_id();
        }
        for (key, pending) in before {
            if let Some(store) = self.stores.get_mut(&key) {
                store.restore_pending(pending);
            }
        }

        #[cfg(feature = "logging")]
        log::debug!(
            "save rolled back, {} nodes and {} edges made transient",
            journal.nodes.len(),
            journal.edges.len()
        );
    }

    // The same edge sits in the far endpoint's store as a pending edge of
    // the opposite direction; drop it there so it is not flushed again.
    fn forget_counterpart(&mut self, key: &StoreKey, entity: &Entity, edge: &Edge) {
        let outgoing = Entity::ptr_eq(edge.start_node(), entity);
        let far = if outgoing {
            edge.end_node()
        } else {
            edge.start_node()
        };
        let far_key = (far.instance(), key.1.clone());
        if far_key == *key {
            return;
        }
        if let Some(far_store) = self.stores.get_mut(&far_key) {
            if outgoing {
                far_store.rm_incoming_rel(edge);
            } else {
                far_store.rm_outgoing_rel(edge);
            }
        }
    }

    fn create_node(
        &mut self,
        engine: &Engine,
        entity: &Entity,
        journal: &mut SaveJournal,
    ) -> Result<(), Error> {
        if entity.create_node(engine.store().as_ref())? {
            journal.nodes.push(entity.clone());
            self.identity_map.register_node(entity);
            #[cfg(feature = "logging")]
            log::trace!("created {entity}");
            engine.events().entity_created(entity)?;
        }
        Ok(())
    }

    /// Destroys `entity`'s relationships of `rel_type` to `targets`.
    ///
    /// Unlike calling [`RelationshipStore::destroy_rels`] directly, this
    /// also drops the destroyed edges still pending in the targets' stores.
    pub fn destroy_rels(
        &mut self,
        entity: &Entity,
        rel_type: &str,
        direction: Direction,
        targets: &[Entity],
    ) -> Result<usize, Error> {
        let destroyed = self.rels(entity, rel_type).destroy_rels(direction, targets)?;
        if destroyed > 0 {
            self.prune_destroyed(rel_type);
        }
        Ok(destroyed)
    }

    /// Destroys `entity`'s single relationship of `rel_type`, on both sides.
    pub fn destroy_single_relationship(
        &mut self,
        entity: &Entity,
        rel_type: &str,
        direction: Direction,
    ) -> Result<bool, Error> {
        let destroyed = self
            .rels(entity, rel_type)
            .destroy_single_relationship(direction)?;
        if destroyed {
            self.prune_destroyed(rel_type);
        }
        Ok(destroyed)
    }

    fn prune_destroyed(&mut self, rel_type: &str) {
        for ((_, store_type), store) in &mut self.stores {
            if store_type == rel_type {
                store.prune_destroyed();
            }
        }
    }

    /// Wraps a stored node, reusing this session's handle if it has one.
    pub fn load(&mut self, id: NodeId) -> Result<Entity, Error> {
        Ok(self.identity_map.wrap_node(self.engine.store().as_ref(), id)?)
    }

    /// Drops every pending relationship of `entity`.
    ///
    /// Used when the entity reverts to a transient, not-yet-saved state.
    pub fn reset(&mut self, entity: &Entity) {
        for ((instance, _), store) in &mut self.stores {
            if *instance == entity.instance() {
                store.clear_unpersisted();
            }
        }
    }

    /// Closes the unit of work: evicts every store's pending edges from the
    /// identity map, invalidates cached persisted edges, then clears the map.
    pub fn end_unit_of_work(&mut self) {
        for store in self.stores.values_mut() {
            store.remove_from_identity_map();
        }
        self.identity_map.clear();

        #[cfg(feature = "logging")]
        log::debug!("unit of work ended, {} relationship stores evicted", self.stores.len());
    }
}
