//! # manifold-ogm
//!
//! Relationship caching and an instance registry for an object-graph mapper
//! backed by a graph store.
//!
//! Entities see their relationships as ordinary collections, even before
//! either side exists in the store. A [`RelationshipStore`] merges edges
//! added in memory (pending) with edges fetched lazily from the
//! [`GraphStore`] (persisted), reflects deletions made through either path,
//! and flushes pending edges exactly once per save.
//!
//! The [`InstanceRegistry`] is a node linked to every entity at creation,
//! so all instances of a type can be enumerated and re-indexed.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use manifold_ogm::{Direction, Engine, Entity, EntityType, MemoryStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let engine = Engine::builder().build(store.clone(), store.clone());
//! engine.start()?;
//!
//! let person = EntityType::new("Person");
//! let alice = Entity::new(person.clone());
//! let bob = Entity::new(person.clone());
//!
//! let mut session = engine.session();
//! session.relate(&alice, "friends", &bob);
//!
//! // Visible before anything is written
//! assert_eq!(session.rels(&alice, "friends").size(Direction::Outgoing)?, 1);
//! assert_eq!(store.edges_of_type("friends").len(), 0);
//!
//! session.save(&alice)?;
//! assert_eq!(store.edges_of_type("friends").len(), 1);
//! assert!(session.rels(&alice, "friends").is_persisted());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! This crate does **not** implement a storage engine, property mapping or
//! attribute indexes. Those are collaborators reached through three seams:
//!
//! - [`GraphStore`]: node and edge storage, including wrapping raw handles
//!   into [`Entity`] and [`Edge`]
//! - [`UnitOfWork`]: transaction demarcation
//! - [`LifecycleListener`]: entity-created and engine start/stop events
//!
//! [`MemoryStore`] implements the first two in process.

#![warn(missing_docs)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

mod builder;
pub mod edge;
pub mod engine;
pub mod entity;
pub mod error;
pub mod events;
pub mod identity_map;
pub mod registry;
pub mod relationships;
pub mod session;
pub mod store;
pub mod types;
pub mod unit_of_work;

pub use builder::EngineBuilder;
pub use edge::Edge;
pub use engine::{Engine, EngineConfig};
pub use entity::{Entity, EntityType};
pub use error::{Error, RegistryError, RelationshipError, StoreError};
pub use events::{EventHandler, LifecycleListener};
pub use identity_map::IdentityMap;
pub use registry::{IndexError, IndexUpdater, InstanceRegistry, RegistryBootstrap, SweepReport};
pub use relationships::{
    CacheState, CacheStatus, RelationshipDsl, RelationshipStore, SingleRelationship,
};
pub use session::Session;
pub use store::{GraphStore, MemoryStore};
pub use types::{Direction, EdgeId, Handle, NodeId, RawEdge, Wrapped};
pub use unit_of_work::{UnitOfWork, transactional};
