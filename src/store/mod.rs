//! The backing graph store seam.
//!
//! Everything above this module depends only on [`GraphStore`], never on a
//! store's native handle types. [`MemoryStore`] is the in-process adapter.

mod memory;

pub use memory::{MemoryStore, REFERENCE_LABEL};

use crate::edge::Edge;
use crate::entity::{Entity, EntityType};
use crate::error::StoreError;
use crate::types::{Direction, EdgeId, Handle, NodeId, RawEdge, Wrapped};

/// Node and edge storage consumed by the relationship layer.
///
/// Implementations must be safe to share between threads; mutation of a
/// given node's relationships is serialized by the caller's unit of work.
pub trait GraphStore: Send + Sync {
    /// Returns the well-known reference node that exists in every store.
    fn reference_node(&self) -> NodeId;

    /// Creates a node with the given label.
    fn create_node(&self, label: &str) -> Result<NodeId, StoreError>;

    /// Returns the label of a node.
    fn node_label(&self, node: NodeId) -> Result<String, StoreError>;

    /// Returns `true` if the node exists.
    fn node_exists(&self, node: NodeId) -> Result<bool, StoreError>;

    /// Creates a directed, typed edge from `start` to `end`.
    fn create_edge(&self, start: NodeId, rel_type: &str, end: NodeId)
    -> Result<RawEdge, StoreError>;

    /// Deletes an edge. Fails with [`StoreError::EdgeNotFound`] if it is gone.
    fn delete_edge(&self, edge: EdgeId) -> Result<(), StoreError>;

    /// Returns `true` if the edge still exists.
    fn edge_exists(&self, edge: EdgeId) -> Result<bool, StoreError>;

    /// Returns all edges of `rel_type` touching `node` in `direction`.
    fn edges(
        &self,
        node: NodeId,
        rel_type: &str,
        direction: Direction,
    ) -> Result<Vec<RawEdge>, StoreError>;

    /// Returns the only edge of `rel_type` touching `node` in `direction`.
    ///
    /// Fails with [`StoreError::MultipleRelationships`] if there is more than one.
    fn single_edge(
        &self,
        node: NodeId,
        rel_type: &str,
        direction: Direction,
    ) -> Result<Option<RawEdge>, StoreError> {
        let mut edges = self.edges(node, rel_type, direction)?;
        match edges.len() {
            0 | 1 => Ok(edges.pop()),
            count => Err(StoreError::MultipleRelationships {
                node,
                rel_type: rel_type.to_string(),
                direction,
                count,
            }),
        }
    }

    /// Counts edges of `rel_type` touching `node` in `direction`.
    fn count_edges(
        &self,
        node: NodeId,
        rel_type: &str,
        direction: Direction,
    ) -> Result<usize, StoreError> {
        Ok(self.edges(node, rel_type, direction)?.len())
    }

    /// Returns `true` if `node` has at least one such edge.
    fn has_edge(&self, node: NodeId, rel_type: &str, direction: Direction) -> Result<bool, StoreError> {
        Ok(self.count_edges(node, rel_type, direction)? > 0)
    }

    /// Wraps a raw handle into the domain [`Entity`] or [`Edge`] type.
    ///
    /// Every call produces fresh handles; deduplication is the job of the
    /// [`IdentityMap`](crate::IdentityMap). Only the node label is stored,
    /// so wrapped entities are typed as their own root.
    fn wrap(&self, handle: Handle) -> Result<Wrapped, StoreError> {
        match handle {
            Handle::Node(id) => {
                let label = self.node_label(id)?;
                Ok(Wrapped::Entity(Entity::from_node(EntityType::new(label), id)))
            }
            Handle::Edge(raw) => {
                let start = Entity::from_node(EntityType::new(self.node_label(raw.start)?), raw.start);
                let end = Entity::from_node(EntityType::new(self.node_label(raw.end)?), raw.end);
                Ok(Wrapped::Edge(Edge::from_raw(&raw, start, end)))
            }
        }
    }

    /// Wraps a stored node.
    fn wrap_node(&self, node: NodeId) -> Result<Entity, StoreError> {
        match self.wrap(Handle::Node(node))? {
            Wrapped::Entity(entity) => Ok(entity),
            Wrapped::Edge(_) => Err(StoreError::NodeNotFound(node)),
        }
    }

    /// Wraps a stored edge.
    fn wrap_edge(&self, raw: RawEdge) -> Result<Edge, StoreError> {
        let id = raw.id;
        match self.wrap(Handle::Edge(raw))? {
            Wrapped::Edge(edge) => Ok(edge),
            Wrapped::Entity(_) => Err(StoreError::EdgeNotFound(id)),
        }
    }
}
