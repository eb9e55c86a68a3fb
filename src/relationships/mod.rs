//! Relationship caching and reconciliation.
//!
//! A [`RelationshipStore`] presents the relationships of one entity and one
//! relationship type as a single view over two sources: pending edges held
//! in memory and persisted edges fetched lazily from the [`GraphStore`](crate::GraphStore).

mod cache;
mod storage;

pub use cache::{CacheState, CacheStatus, PerDirection};
pub(crate) use storage::PendingEdges;
pub use storage::{RelationshipDsl, RelationshipStore, SingleRelationship};
