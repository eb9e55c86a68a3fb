//! Per-unit-of-work deduplication of wrapped store handles.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::edge::Edge;
use crate::entity::Entity;
use crate::error::StoreError;
use crate::store::GraphStore;
use crate::types::{EdgeId, NodeId, RawEdge};

#[derive(Default)]
struct IdentityState {
    nodes: HashMap<NodeId, Entity>,
    edges: HashMap<EdgeId, Edge>,
}

/// Maps store ids to the single in-memory handle used for them.
///
/// Within one unit of work, wrapping the same store edge or node twice
/// yields the same [`Edge`] or [`Entity`] instance. Clones share state.
#[derive(Clone, Default)]
pub struct IdentityMap {
    state: Arc<RwLock<IdentityState>>,
}

impl IdentityMap {
    /// Creates an empty identity map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached handle for a stored edge.
    pub fn get_edge(&self, id: EdgeId) -> Option<Edge> {
        self.read().edges.get(&id).cloned()
    }

    /// Returns the cached handle for a stored node.
    pub fn get_node(&self, id: NodeId) -> Option<Entity> {
        self.read().nodes.get(&id).cloned()
    }

    /// Registers a persisted edge. Pending edges are ignored.
    pub fn register_edge(&self, edge: &Edge) {
        if let Some(id) = edge.id() {
            self.write().edges.insert(id, edge.clone());
        }
    }

    /// Registers a persisted entity. Transient entities are ignored.
    pub fn register_node(&self, entity: &Entity) {
        if let Some(id) = entity.id() {
            self.write().nodes.insert(id, entity.clone());
        }
    }

    /// Forgets an edge. Returns `true` if it was registered.
    pub fn remove_edge(&self, edge: &Edge) -> bool {
        match edge.id() {
            Some(id) => self.write().edges.remove(&id).is_some(),
            None => false,
        }
    }

    /// Forgets an entity. Returns `true` if it was registered.
    pub fn remove_node(&self, entity: &Entity) -> bool {
        match entity.id() {
            Some(id) => self.write().nodes.remove(&id).is_some(),
            None => false,
        }
    }

    /// Forgets everything.
    pub fn clear(&self) {
        let mut state = self.write();
        state.nodes.clear();
        state.edges.clear();
    }

    /// Number of registered edges.
    pub fn edge_count(&self) -> usize {
        self.read().edges.len()
    }

    /// Number of registered entities.
    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    /// Wraps a stored node, reusing the registered handle if there is one.
    pub fn wrap_node(&self, store: &dyn GraphStore, id: NodeId) -> Result<Entity, StoreError> {
        if let Some(entity) = self.get_node(id) {
            return Ok(entity);
        }
        let entity = store.wrap_node(id)?;
        self.register_node(&entity);
        Ok(entity)
    }

    /// Wraps a stored edge, reusing registered handles for it and its endpoints.
    pub fn wrap_edge(&self, store: &dyn GraphStore, raw: &RawEdge) -> Result<Edge, StoreError> {
        if let Some(edge) = self.get_edge(raw.id) {
            return Ok(edge);
        }
        let start = self.wrap_node(store, raw.start)?;
        let end = self.wrap_node(store, raw.end)?;
        let edge = Edge::from_raw(raw, start, end);
        self.register_edge(&edge);
        Ok(edge)
    }

    fn read(&self) -> RwLockReadGuard<'_, IdentityState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IdentityState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_wrap_edge_is_deduplicated() {
        let store = MemoryStore::new();
        let a = store.create_node("Person").unwrap();
        let b = store.create_node("Person").unwrap();
        let raw = store.create_edge(a, "friends", b).unwrap();

        let map = IdentityMap::new();
        let first = map.wrap_edge(&store, &raw).unwrap();
        let second = map.wrap_edge(&store, &raw).unwrap();
        assert!(Edge::ptr_eq(&first, &second));
        assert!(Entity::ptr_eq(first.start_node(), second.start_node()));
        assert_eq!(map.edge_count(), 1);
        assert_eq!(map.node_count(), 2);
    }

    #[test]
    fn test_remove_edge_forces_rewrap() {
        let store = MemoryStore::new();
        let a = store.create_node("Person").unwrap();
        let b = store.create_node("Person").unwrap();
        let raw = store.create_edge(a, "friends", b).unwrap();

        let map = IdentityMap::new();
        let first = map.wrap_edge(&store, &raw).unwrap();
        assert!(map.remove_edge(&first));
        assert!(!map.remove_edge(&first));

        let second = map.wrap_edge(&store, &raw).unwrap();
        assert!(!Edge::ptr_eq(&first, &second));
        assert_eq!(first, second);
    }
}
