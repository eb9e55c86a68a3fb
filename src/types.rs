//! Identifiers and raw store handles shared by every layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a node in the backing graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generates a fresh random node id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Identifier of an edge in the backing graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub Uuid);

impl EdgeId {
    /// Generates a fresh random edge id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge:{}", self.0)
    }
}

/// Direction of a relationship relative to the node it is queried from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The node is the start of the edge.
    Outgoing,
    /// The node is the end of the edge.
    Incoming,
    /// Either end.
    Both,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outgoing => f.write_str("outgoing"),
            Direction::Incoming => f.write_str("incoming"),
            Direction::Both => f.write_str("both"),
        }
    }
}

/// An edge as the backing store sees it: ids only, no domain wrapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawEdge {
    /// Store-assigned edge id
    pub id: EdgeId,
    /// Start node
    pub start: NodeId,
    /// Relationship type (e.g., "friends", "index_node")
    pub rel_type: String,
    /// End node
    pub end: NodeId,
}

impl RawEdge {
    /// Creates a new raw edge.
    pub fn new(id: EdgeId, start: NodeId, rel_type: impl Into<String>, end: NodeId) -> Self {
        Self {
            id,
            start,
            rel_type: rel_type.into(),
            end,
        }
    }

    /// Returns the endpoint that is not `node`.
    ///
    /// For a self-loop both endpoints are `node`, so `node` is returned.
    pub fn other_node(&self, node: NodeId) -> NodeId {
        if self.start == node {
            self.end
        } else {
            self.start
        }
    }
}

/// A raw store handle awaiting wrapping into a domain object.
#[derive(Debug, Clone)]
pub enum Handle {
    /// A stored node
    Node(NodeId),
    /// A stored edge
    Edge(RawEdge),
}

/// The domain object produced by wrapping a [`Handle`].
#[derive(Debug, Clone)]
pub enum Wrapped {
    /// Wrapped node
    Entity(crate::Entity),
    /// Wrapped edge
    Edge(crate::Edge),
}
