//! Error types for the store, relationship and registry layers.

use std::fmt;

use crate::registry::SweepReport;
use crate::types::{Direction, EdgeId, NodeId};

/// Errors reported by a [`GraphStore`](crate::GraphStore) or [`UnitOfWork`](crate::UnitOfWork).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The node does not exist in the store.
    NodeNotFound(NodeId),
    /// The edge does not exist in the store.
    EdgeNotFound(EdgeId),
    /// A single-edge query matched more than one edge.
    MultipleRelationships {
        /// Node the query started from
        node: NodeId,
        /// Relationship type queried
        rel_type: String,
        /// Direction queried
        direction: Direction,
        /// Number of matching edges
        count: usize,
    },
    /// `commit` was called without a matching `begin`.
    NoActiveUnitOfWork,
    /// `begin` was called while a unit of work was already open.
    UnitOfWorkActive,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NodeNotFound(id) => write!(f, "{id} not found"),
            StoreError::EdgeNotFound(id) => write!(f, "{id} not found"),
            StoreError::MultipleRelationships {
                node,
                rel_type,
                direction,
                count,
            } => write!(
                f,
                "expected at most one {direction} '{rel_type}' relationship on {node}, found {count}"
            ),
            StoreError::NoActiveUnitOfWork => write!(f, "no active unit of work"),
            StoreError::UnitOfWorkActive => write!(f, "a unit of work is already active"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors raised by a [`RelationshipStore`](crate::RelationshipStore).
#[derive(Debug)]
pub enum RelationshipError {
    /// A traversal was requested on an owner that has no backing node.
    NotPersisted(&'static str),
    /// A pending edge failed to save during `persist`.
    ///
    /// Edges are validated before they reach `persist`, so this is an
    /// invariant violation and is never retried.
    SaveFailed {
        /// Which pending sequence the edge came from
        direction: Direction,
        /// Description of the edge
        edge: String,
        /// Validation diagnostics of the edge
        diagnostics: Vec<String>,
    },
    /// An underlying store error occurred.
    Store(StoreError),
}

impl fmt::Display for RelationshipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipError::NotPersisted(op) => {
                write!(f, "{op} not allowed on a node that is not persisted")
            }
            RelationshipError::SaveFailed {
                direction,
                edge,
                diagnostics,
            } => write!(
                f,
                "can't save {direction} {edge}, validation errors: {diagnostics:?}"
            ),
            RelationshipError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for RelationshipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelationshipError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for RelationshipError {
    fn from(err: StoreError) -> Self {
        RelationshipError::Store(err)
    }
}

/// Errors raised by the [`InstanceRegistry`](crate::InstanceRegistry).
#[derive(Debug)]
pub enum RegistryError {
    /// The entity has no backing node and cannot be connected.
    NotPersisted,
    /// The engine has not been started, so no registry exists.
    NotStarted,
    /// At least one instance failed to re-index.
    SweepFailed(SweepReport),
    /// An underlying store error occurred.
    Store(StoreError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotPersisted => {
                write!(f, "only persisted entities can be connected to the registry")
            }
            RegistryError::NotStarted => write!(f, "instance registry is not running"),
            RegistryError::SweepFailed(report) => write!(
                f,
                "index update failed for {} of {} instances",
                report.failures.len(),
                report.attempted
            ),
            RegistryError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        RegistryError::Store(err)
    }
}

/// Top-level error for engine, session and lifecycle operations.
#[derive(Debug)]
pub enum Error {
    /// A store error occurred.
    Store(StoreError),
    /// A relationship store error occurred.
    Relationship(RelationshipError),
    /// A registry error occurred.
    Registry(RegistryError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(e) => e.fmt(f),
            Error::Relationship(e) => e.fmt(f),
            Error::Registry(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => Some(e),
            Error::Relationship(e) => Some(e),
            Error::Registry(e) => Some(e),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

impl From<RelationshipError> for Error {
    fn from(err: RelationshipError) -> Self {
        Error::Relationship(err)
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        Error::Registry(err)
    }
}
