//! Edge handles: directed, typed connections between entities.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use crate::entity::Entity;
use crate::error::StoreError;
use crate::store::GraphStore;
use crate::types::{EdgeId, RawEdge};

struct EdgeInner {
    rel_type: Arc<str>,
    start: Entity,
    end: Entity,
    id: RwLock<Option<EdgeId>>,
    destroyed: AtomicBool,
}

/// A directed, typed connection between two entities.
///
/// An edge is either pending (in memory only) or persisted (backed by a
/// store edge). Like [`Entity`], it is a shared handle: saving one clone
/// persists them all.
#[derive(Clone)]
pub struct Edge {
    inner: Arc<EdgeInner>,
}

impl Edge {
    /// Creates a pending edge from `start` to `end`.
    pub fn new(rel_type: impl Into<Arc<str>>, start: Entity, end: Entity) -> Self {
        Self {
            inner: Arc::new(EdgeInner {
                rel_type: rel_type.into(),
                start,
                end,
                id: RwLock::new(None),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates an edge wrapping a stored edge whose endpoints are already wrapped.
    pub fn from_raw(raw: &RawEdge, start: Entity, end: Entity) -> Self {
        let edge = Self::new(raw.rel_type.as_str(), start, end);
        *edge.id_slot() = Some(raw.id);
        edge
    }

    /// Returns the backing edge id, if persisted.
    pub fn id(&self) -> Option<EdgeId> {
        *self.inner.id.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if this edge has been written to the store.
    pub fn is_persisted(&self) -> bool {
        self.id().is_some()
    }

    /// Returns `true` once [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Returns the relationship type.
    pub fn rel_type(&self) -> &str {
        &self.inner.rel_type
    }

    /// Returns the start entity.
    pub fn start_node(&self) -> &Entity {
        &self.inner.start
    }

    /// Returns the end entity.
    pub fn end_node(&self) -> &Entity {
        &self.inner.end
    }

    /// Returns the endpoint that is not `node`.
    pub fn other_node(&self, node: &Entity) -> &Entity {
        if self.inner.start == *node {
            &self.inner.end
        } else {
            &self.inner.start
        }
    }

    /// Returns `true` if both handles refer to the same in-memory edge.
    pub fn ptr_eq(a: &Edge, b: &Edge) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Returns the reasons this edge cannot be saved, empty if it can.
    pub fn validate(&self) -> Vec<String> {
        let mut diagnostics = Vec::new();
        if self.is_destroyed() {
            diagnostics.push("edge has been destroyed".to_string());
        }
        if !self.inner.start.is_persisted() {
            diagnostics.push(format!("start node {} is not persisted", self.inner.start));
        }
        if !self.inner.end.is_persisted() {
            diagnostics.push(format!("end node {} is not persisted", self.inner.end));
        }
        diagnostics
    }

    /// Writes this edge to the store.
    ///
    /// Returns `Ok(false)` without touching the store if the edge fails
    /// validation; [`Edge::validate`] reports why. Saving an already
    /// persisted edge is a no-op that returns `Ok(true)`.
    pub fn save(&self, store: &dyn GraphStore) -> Result<bool, StoreError> {
        let mut slot = self.id_slot();
        if slot.is_some() {
            return Ok(true);
        }
        let (Some(start), Some(end)) = (self.inner.start.id(), self.inner.end.id()) else {
            return Ok(false);
        };
        if self.is_destroyed() {
            return Ok(false);
        }
        *slot = Some(store.create_edge(start, &self.inner.rel_type, end)?.id);
        Ok(true)
    }

    /// Makes this edge pending again after its store edge was rolled back.
    pub(crate) fn clear_id(&self) {
        *self.id_slot() = None;
    }

    fn id_slot(&self) -> RwLockWriteGuard<'_, Option<EdgeId>> {
        self.inner.id.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deletes the backing store edge, if any, and marks this edge destroyed.
    ///
    /// Deleting an edge that is already gone from the store is not an error.
    pub fn destroy(&self, store: &dyn GraphStore) -> Result<(), StoreError> {
        self.inner.destroyed.store(true, Ordering::Release);
        match self.id() {
            Some(id) => match store.delete_edge(id) {
                Ok(()) | Err(StoreError::EdgeNotFound(_)) => Ok(()),
                Err(e) => Err(e),
            },
            None => Ok(()),
        }
    }

    /// Returns `true` if the backing store edge still exists.
    ///
    /// Always `false` for pending or destroyed edges.
    pub fn exists(&self, store: &dyn GraphStore) -> Result<bool, StoreError> {
        if self.is_destroyed() {
            return Ok(false);
        }
        match self.id() {
            Some(id) => store.edge_exists(id),
            None => Ok(false),
        }
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        if Edge::ptr_eq(self, other) {
            return true;
        }
        match (self.id(), other.id()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("rel_type", &self.rel_type())
            .field("start", &self.inner.start)
            .field("end", &self.inner.end)
            .field("id", &self.id())
            .finish()
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -[{}]-> {}",
            self.inner.start, self.inner.rel_type, self.inner.end
        )
    }
}
