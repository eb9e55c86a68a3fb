//! In-process graph store with bidirectional adjacency indexes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::GraphStore;
use crate::error::StoreError;
use crate::types::{Direction, EdgeId, NodeId, RawEdge};
use crate::unit_of_work::UnitOfWork;

/// Label of the reference node every store starts with.
pub const REFERENCE_LABEL: &str = "ReferenceNode";

type AdjacencyKey = (NodeId, String, u64);

#[derive(Clone, Default)]
struct MemoryState {
    nodes: HashMap<NodeId, String>,
    edges: HashMap<EdgeId, (RawEdge, u64)>,
    // (start, rel_type, seq) -> edge
    forward: BTreeMap<AdjacencyKey, EdgeId>,
    // (end, rel_type, seq) -> edge
    reverse: BTreeMap<AdjacencyKey, EdgeId>,
    next_seq: u64,
}

impl MemoryState {
    fn scan(
        &self,
        index: &BTreeMap<AdjacencyKey, EdgeId>,
        node: NodeId,
        rel_type: &str,
        out: &mut Vec<RawEdge>,
    ) {
        let start = (node, rel_type.to_string(), 0);
        let end = (node, rel_type.to_string(), u64::MAX);
        for edge_id in index.range(start..=end).map(|(_, id)| id) {
            if let Some((raw, _)) = self.edges.get(edge_id) {
                if !out.iter().any(|e| e.id == raw.id) {
                    out.push(raw.clone());
                }
            }
        }
    }
}

/// A [`GraphStore`] held entirely in memory.
///
/// Edges are indexed twice, by `(start, type)` and by `(end, type)`, so
/// both outgoing and incoming queries are range scans. Scans return edges
/// in creation order.
///
/// The store also acts as its own [`UnitOfWork`]: `begin` snapshots the
/// graph, `commit` discards the snapshot and `rollback` restores it.
pub struct MemoryStore {
    reference: NodeId,
    state: RwLock<MemoryState>,
    snapshot: Mutex<Option<MemoryState>>,
    commits: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store containing only the reference node.
    pub fn new() -> Self {
        let reference = NodeId::new_v4();
        let mut state = MemoryState::default();
        state.nodes.insert(reference, REFERENCE_LABEL.to_string());
        Self {
            reference,
            state: RwLock::new(state),
            snapshot: Mutex::new(None),
            commits: AtomicU64::new(0),
        }
    }

    /// Returns the number of nodes, including the reference node.
    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    /// Returns the number of edges.
    pub fn edge_count(&self) -> usize {
        self.read().edges.len()
    }

    /// Returns every edge of `rel_type`, in creation order.
    pub fn edges_of_type(&self, rel_type: &str) -> Vec<RawEdge> {
        let state = self.read();
        let mut edges: Vec<&(RawEdge, u64)> = state
            .edges
            .values()
            .filter(|(raw, _)| raw.rel_type == rel_type)
            .collect();
        edges.sort_by_key(|(_, seq)| *seq);
        edges.into_iter().map(|(raw, _)| raw.clone()).collect()
    }

    /// Returns how many units of work have been committed.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> MutexGuard<'_, Option<MemoryState>> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore for MemoryStore {
    fn reference_node(&self) -> NodeId {
        self.reference
    }

    fn create_node(&self, label: &str) -> Result<NodeId, StoreError> {
        let id = NodeId::new_v4();
        self.write().nodes.insert(id, label.to_string());
        Ok(id)
    }

    fn node_label(&self, node: NodeId) -> Result<String, StoreError> {
        self.read()
            .nodes
            .get(&node)
            .cloned()
            .ok_or(StoreError::NodeNotFound(node))
    }

    fn node_exists(&self, node: NodeId) -> Result<bool, StoreError> {
        Ok(self.read().nodes.contains_key(&node))
    }

    fn create_edge(
        &self,
        start: NodeId,
        rel_type: &str,
        end: NodeId,
    ) -> Result<RawEdge, StoreError> {
        let mut state = self.write();
        for node in [start, end] {
            if !state.nodes.contains_key(&node) {
                return Err(StoreError::NodeNotFound(node));
            }
        }

        let raw = RawEdge::new(EdgeId::new_v4(), start, rel_type, end);
        let seq = state.next_seq;
        state.next_seq += 1;

        // Both indexes are updated under the same write lock
        state
            .forward
            .insert((start, rel_type.to_string(), seq), raw.id);
        state
            .reverse
            .insert((end, rel_type.to_string(), seq), raw.id);
        state.edges.insert(raw.id, (raw.clone(), seq));

        Ok(raw)
    }

    fn delete_edge(&self, edge: EdgeId) -> Result<(), StoreError> {
        let mut state = self.write();
        let (raw, seq) = state
            .edges
            .remove(&edge)
            .ok_or(StoreError::EdgeNotFound(edge))?;
        state.forward.remove(&(raw.start, raw.rel_type.clone(), seq));
        state.reverse.remove(&(raw.end, raw.rel_type, seq));
        Ok(())
    }

    fn edge_exists(&self, edge: EdgeId) -> Result<bool, StoreError> {
        Ok(self.read().edges.contains_key(&edge))
    }

    fn edges(
        &self,
        node: NodeId,
        rel_type: &str,
        direction: Direction,
    ) -> Result<Vec<RawEdge>, StoreError> {
        let state = self.read();
        if !state.nodes.contains_key(&node) {
            return Err(StoreError::NodeNotFound(node));
        }

        let mut out = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            state.scan(&state.forward, node, rel_type, &mut out);
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            state.scan(&state.reverse, node, rel_type, &mut out);
        }
        Ok(out)
    }
}

impl UnitOfWork for MemoryStore {
    fn is_active(&self) -> bool {
        self.snapshot().is_some()
    }

    fn begin(&self) -> Result<(), StoreError> {
        let mut snapshot = self.snapshot();
        if snapshot.is_some() {
            return Err(StoreError::UnitOfWorkActive);
        }
        *snapshot = Some(self.read().clone());
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.snapshot()
            .take()
            .ok_or(StoreError::NoActiveUnitOfWork)?;
        self.commits.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        let saved = self
            .snapshot()
            .take()
            .ok_or(StoreError::NoActiveUnitOfWork)?;
        *self.write() = saved;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_node_exists() {
        let store = MemoryStore::new();
        let reference = store.reference_node();
        assert!(store.node_exists(reference).unwrap());
        assert_eq!(store.node_label(reference).unwrap(), REFERENCE_LABEL);
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_bidirectional_indexes() {
        let store = MemoryStore::new();
        let a = store.create_node("Person").unwrap();
        let b = store.create_node("Person").unwrap();
        let c = store.create_node("Person").unwrap();

        store.create_edge(a, "follows", b).unwrap();
        store.create_edge(a, "follows", c).unwrap();
        store.create_edge(a, "knows", c).unwrap();

        let outgoing = store.edges(a, "follows", Direction::Outgoing).unwrap();
        assert_eq!(outgoing.len(), 2);
        assert_eq!(outgoing[0].end, b);
        assert_eq!(outgoing[1].end, c);

        let incoming = store.edges(c, "follows", Direction::Incoming).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].start, a);

        assert_eq!(store.count_edges(c, "follows", Direction::Both).unwrap(), 1);
        assert_eq!(store.count_edges(a, "follows", Direction::Incoming).unwrap(), 0);
    }

    #[test]
    fn test_delete_edge_updates_both_indexes() {
        let store = MemoryStore::new();
        let a = store.create_node("Person").unwrap();
        let b = store.create_node("Person").unwrap();
        let edge = store.create_edge(a, "follows", b).unwrap();

        store.delete_edge(edge.id).unwrap();
        assert!(!store.edge_exists(edge.id).unwrap());
        assert!(store.edges(a, "follows", Direction::Outgoing).unwrap().is_empty());
        assert!(store.edges(b, "follows", Direction::Incoming).unwrap().is_empty());
        assert_eq!(
            store.delete_edge(edge.id),
            Err(StoreError::EdgeNotFound(edge.id))
        );
    }

    #[test]
    fn test_single_edge() {
        let store = MemoryStore::new();
        let a = store.create_node("Person").unwrap();
        let b = store.create_node("Person").unwrap();

        assert!(store.single_edge(a, "spouse", Direction::Outgoing).unwrap().is_none());
        store.create_edge(a, "spouse", b).unwrap();
        assert!(store.single_edge(a, "spouse", Direction::Outgoing).unwrap().is_some());
        store.create_edge(a, "spouse", b).unwrap();
        assert!(matches!(
            store.single_edge(a, "spouse", Direction::Outgoing),
            Err(StoreError::MultipleRelationships { count: 2, .. })
        ));
    }

    #[test]
    fn test_self_loop_listed_once_for_both() {
        let store = MemoryStore::new();
        let a = store.create_node("Person").unwrap();
        store.create_edge(a, "likes", a).unwrap();
        assert_eq!(store.edges(a, "likes", Direction::Both).unwrap().len(), 1);
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let store = MemoryStore::new();
        store.begin().unwrap();
        assert!(store.is_active());
        store.create_node("Person").unwrap();
        store.rollback().unwrap();

        assert!(!store.is_active());
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.commit_count(), 0);
        assert_eq!(store.commit(), Err(StoreError::NoActiveUnitOfWork));
    }

    #[test]
    fn test_create_edge_to_missing_node() {
        let store = MemoryStore::new();
        let a = store.create_node("Person").unwrap();
        let missing = NodeId::new_v4();
        assert_eq!(
            store.create_edge(a, "follows", missing),
            Err(StoreError::NodeNotFound(missing))
        );
    }
}
