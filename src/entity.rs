//! Entity handles and their declared types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use crate::error::StoreError;
use crate::store::GraphStore;
use crate::types::NodeId;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// The declared type of an entity.
///
/// A type may name a root type; instances are registered and enumerated
/// under the root's label so that subtypes show up when listing the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityType {
    name: Arc<str>,
    root: Option<Arc<str>>,
}

impl EntityType {
    /// Creates a type that is its own root.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            root: None,
        }
    }

    /// Creates a subtype registered under `root`.
    pub fn with_root(name: impl Into<Arc<str>>, root: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            root: Some(root.into()),
        }
    }

    /// Returns the type name, which is also the node label in the store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the label instances of this type are registered under.
    pub fn root_label(&self) -> &str {
        self.root.as_deref().unwrap_or(&self.name)
    }
}

struct EntityInner {
    instance: u64,
    entity_type: EntityType,
    id: RwLock<Option<NodeId>>,
}

/// A domain object optionally backed by a node in the graph store.
///
/// `Entity` is a cheap, clonable handle. Clones share the same backing id,
/// so once one clone is saved every clone reports itself as persisted.
///
/// Two entities are equal when they are the same instance, or when both
/// are persisted and share a backing id.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

impl Entity {
    /// Creates a transient entity with no backing node.
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
                entity_type,
                id: RwLock::new(None),
            }),
        }
    }

    /// Creates an entity wrapping an existing stored node.
    pub fn from_node(entity_type: EntityType, id: NodeId) -> Self {
        let entity = Self::new(entity_type);
        *entity.id_slot() = Some(id);
        entity
    }

    /// Returns the backing node id, if persisted.
    pub fn id(&self) -> Option<NodeId> {
        *self.inner.id.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if this entity is backed by a stored node.
    pub fn is_persisted(&self) -> bool {
        self.id().is_some()
    }

    /// Returns the declared type.
    pub fn entity_type(&self) -> &EntityType {
        &self.inner.entity_type
    }

    /// Returns `true` if both handles refer to the same in-memory instance.
    pub fn ptr_eq(a: &Entity, b: &Entity) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Process-unique key of this in-memory instance.
    pub(crate) fn instance(&self) -> u64 {
        self.inner.instance
    }

    /// Creates the backing node if this entity is transient.
    ///
    /// Returns `true` if a node was created.
    pub(crate) fn create_node(&self, store: &dyn GraphStore) -> Result<bool, StoreError> {
        let mut slot = self.id_slot();
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(store.create_node(self.inner.entity_type.name())?);
        Ok(true)
    }

    /// Makes this entity transient again after its node was rolled back.
    pub(crate) fn clear_id(&self) {
        *self.id_slot() = None;
    }

    fn id_slot(&self) -> RwLockWriteGuard<'_, Option<NodeId>> {
        self.inner.id.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        if Entity::ptr_eq(self, other) {
            return true;
        }
        match (self.id(), other.id()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.inner.entity_type.name())
            .field("id", &self.id())
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}({id})", self.inner.entity_type.name()),
            None => write!(f, "{}(new #{})", self.inner.entity_type.name(), self.instance()),
        }
    }
}
