use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::cache::{CacheState, PerDirection};
use crate::edge::Edge;
use crate::entity::{Entity, EntityType};
use crate::error::{RelationshipError, StoreError};
use crate::identity_map::IdentityMap;
use crate::store::GraphStore;
use crate::types::{Direction, EdgeId, NodeId, RawEdge};

/// Declares a relationship type and the type of entity at its far end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDsl {
    rel_type: Arc<str>,
    target: Option<EntityType>,
}

impl RelationshipDsl {
    /// Declares `rel_type` with no particular target type.
    pub fn new(rel_type: impl Into<Arc<str>>) -> Self {
        Self {
            rel_type: rel_type.into(),
            target: None,
        }
    }

    /// Sets the type of entity [`RelationshipStore::build`] constructs.
    #[must_use]
    pub fn with_target(mut self, target: EntityType) -> Self {
        self.target = Some(target);
        self
    }

    /// Returns the relationship type.
    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    /// Returns the declared target type.
    pub fn target(&self) -> Option<&EntityType> {
        self.target.as_ref()
    }
}

/// Result of a single-relationship lookup.
#[derive(Debug, Clone)]
pub enum SingleRelationship {
    /// The first pending edge.
    Pending(Edge),
    /// The only matching edge in the store, unwrapped.
    Stored(RawEdge),
}

// Main pending sequences of one store, captured before a save.
pub(crate) struct PendingEdges {
    outgoing: Vec<Edge>,
    incoming: Vec<Edge>,
}

#[derive(Default)]
struct NeighborCache {
    neighbors: Vec<(Entity, EdgeId)>,
    edge_by_node: HashMap<NodeId, EdgeId>,
}

impl NeighborCache {
    fn is_deleted(&self, store: &dyn GraphStore, node: &Entity) -> Result<bool, StoreError> {
        let edge = node.id().and_then(|id| self.edge_by_node.get(&id));
        match edge {
            Some(edge) => Ok(!store.edge_exists(*edge)?),
            None => Ok(true),
        }
    }
}

/// Pending and persisted relationships of one type for one entity.
///
/// Pending edges live in ordered per-direction sequences until
/// [`persist`](Self::persist) writes them. Persisted edges are fetched
/// from the store at most once per direction and kept until invalidated
/// by `persist` or [`remove_from_identity_map`](Self::remove_from_identity_map).
///
/// Besides the main pending sequences there is a second, optional
/// "unpersisted" sequence per direction. It makes edges that are still
/// being saved visible to callback code without counting them as pending
/// work; while it exists, [`relationships`](Self::relationships) returns it
/// instead of the main sequence.
pub struct RelationshipStore {
    owner: Entity,
    dsl: RelationshipDsl,
    store: Arc<dyn GraphStore>,
    identity_map: IdentityMap,
    outgoing: Vec<Edge>,
    incoming: Vec<Edge>,
    unpersisted_outgoing: Option<Vec<Edge>>,
    unpersisted_incoming: Option<Vec<Edge>>,
    persisted_relationships: PerDirection<CacheState<Vec<Edge>>>,
    persisted_neighbors: PerDirection<CacheState<NeighborCache>>,
}

impl RelationshipStore {
    /// Creates an empty store for `owner`'s relationships of `dsl`'s type.
    pub fn new(
        owner: Entity,
        dsl: RelationshipDsl,
        store: Arc<dyn GraphStore>,
        identity_map: IdentityMap,
    ) -> Self {
        Self {
            owner,
            dsl,
            store,
            identity_map,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            unpersisted_outgoing: None,
            unpersisted_incoming: None,
            persisted_relationships: PerDirection::default(),
            persisted_neighbors: PerDirection::default(),
        }
    }

    /// Returns the owning entity.
    pub fn owner(&self) -> &Entity {
        &self.owner
    }

    /// Returns the relationship type.
    pub fn rel_type(&self) -> &str {
        self.dsl.rel_type()
    }

    /// Returns the relationship declaration.
    pub fn dsl(&self) -> &RelationshipDsl {
        &self.dsl
    }

    /// Returns the pending edges for `direction`.
    ///
    /// For `Outgoing` and `Incoming` this is the "unpersisted" sequence if
    /// one exists, otherwise the main pending sequence. `Both` is incoming
    /// followed by outgoing from the main sequences only. Persisted edges
    /// are never included; use [`each_rel`](Self::each_rel) for those.
    pub fn relationships(&self, direction: Direction) -> Vec<Edge> {
        match direction {
            Direction::Outgoing => self
                .unpersisted_outgoing
                .as_ref()
                .unwrap_or(&self.outgoing)
                .clone(),
            Direction::Incoming => self
                .unpersisted_incoming
                .as_ref()
                .unwrap_or(&self.incoming)
                .clone(),
            Direction::Both => self
                .incoming
                .iter()
                .chain(self.outgoing.iter())
                .cloned()
                .collect(),
        }
    }

    /// Visits every edge for `direction`: pending first, then persisted.
    ///
    /// Persisted edges are fetched once per direction and re-checked for
    /// existence on every visit, so edges deleted directly in the store are
    /// skipped even though the cache still holds them. A persisted edge that
    /// is also pending is visited only once.
    pub fn each_rel(
        &mut self,
        direction: Direction,
        mut visit: impl FnMut(&Edge),
    ) -> Result<(), RelationshipError> {
        let pending = self.relationships(direction);
        let mut seen = HashSet::new();
        for edge in &pending {
            if let Some(id) = edge.id() {
                seen.insert(id);
            }
            visit(edge);
        }

        let Some(node) = self.owner.id() else {
            return Ok(());
        };

        let store = self.store.as_ref();
        let identity_map = &self.identity_map;
        let rel_type = self.dsl.rel_type();
        let cached = self
            .persisted_relationships
            .get_mut(direction)
            .get_or_try_load(|| {
                store
                    .edges(node, rel_type, direction)?
                    .iter()
                    .map(|raw| identity_map.wrap_edge(store, raw))
                    .collect::<Result<Vec<_>, StoreError>>()
            })?;

        for edge in cached {
            if edge.id().is_some_and(|id| seen.contains(&id)) {
                continue;
            }
            if edge.exists(store)? {
                visit(edge);
            }
        }
        Ok(())
    }

    /// Visits every neighbour for `direction`: pending first, then persisted.
    ///
    /// A persisted neighbour is skipped when
    /// [`relationship_deleted`](Self::relationship_deleted) holds for it.
    pub fn each_node(
        &mut self,
        direction: Direction,
        mut visit: impl FnMut(&Entity),
    ) -> Result<(), RelationshipError> {
        let pending = self.relationships(direction);
        let mut seen = HashSet::new();
        for edge in &pending {
            if let Some(id) = edge.id() {
                seen.insert(id);
            }
            visit(edge.other_node(&self.owner));
        }

        let Some(node) = self.owner.id() else {
            return Ok(());
        };

        let store = Arc::clone(&self.store);
        let cache = self.neighbor_cache(node, direction)?;
        for (neighbor, edge) in &cache.neighbors {
            if seen.contains(edge) {
                continue;
            }
            if !cache.is_deleted(store.as_ref(), neighbor)? {
                visit(neighbor);
            }
        }
        Ok(())
    }

    /// Returns `true` if the persisted edge to `node` is gone.
    ///
    /// That is the case when the neighbour cache has no edge for `node` or
    /// the edge it references no longer exists in the store. The cache is
    /// built on first use; existence is checked live on every call.
    pub fn relationship_deleted(
        &mut self,
        direction: Direction,
        node: &Entity,
    ) -> Result<bool, RelationshipError> {
        let Some(owner) = self.owner.id() else {
            return Ok(true);
        };
        let store = Arc::clone(&self.store);
        let cache = self.neighbor_cache(owner, direction)?;
        Ok(cache.is_deleted(store.as_ref(), node)?)
    }

    fn neighbor_cache(
        &mut self,
        node: NodeId,
        direction: Direction,
    ) -> Result<&NeighborCache, StoreError> {
        let store = self.store.as_ref();
        let identity_map = &self.identity_map;
        let rel_type = self.dsl.rel_type();
        self.persisted_neighbors
            .get_mut(direction)
            .get_or_try_load(|| {
                let mut cache = NeighborCache::default();
                for raw in store.edges(node, rel_type, direction)? {
                    let other = raw.other_node(node);
                    let neighbor = identity_map.wrap_node(store, other)?;
                    cache.neighbors.push((neighbor, raw.id));
                    cache.edge_by_node.insert(other, raw.id);
                }
                Ok(cache)
            })
    }

    /// Collects [`each_rel`](Self::each_rel).
    pub fn all_relationships(&mut self, direction: Direction) -> Result<Vec<Edge>, RelationshipError> {
        let mut edges = Vec::new();
        self.each_rel(direction, |edge| edges.push(edge.clone()))?;
        Ok(edges)
    }

    /// Collects [`each_node`](Self::each_node).
    pub fn nodes(&mut self, direction: Direction) -> Result<Vec<Entity>, RelationshipError> {
        let mut nodes = Vec::new();
        self.each_node(direction, |node| nodes.push(node.clone()))?;
        Ok(nodes)
    }

    /// Counts persisted plus pending edges for `direction`.
    ///
    /// The persisted part is always queried live from the store.
    pub fn size(&self, direction: Direction) -> Result<usize, RelationshipError> {
        let persisted = match self.owner.id() {
            Some(node) => self
                .store
                .count_edges(node, self.dsl.rel_type(), direction)?,
            None => 0,
        };
        Ok(persisted + self.relationships(direction).len())
    }

    /// Finds the first pending edge, or else the only stored edge, unwrapped.
    ///
    /// Fails with [`StoreError::MultipleRelationships`] if the store holds
    /// more than one matching edge.
    pub fn single_raw(
        &self,
        direction: Direction,
    ) -> Result<Option<SingleRelationship>, RelationshipError> {
        if let Some(edge) = self.relationships(direction).into_iter().next() {
            return Ok(Some(SingleRelationship::Pending(edge)));
        }
        match self.owner.id() {
            Some(node) => Ok(self
                .store
                .single_edge(node, self.dsl.rel_type(), direction)?
                .map(SingleRelationship::Stored)),
            None => Ok(None),
        }
    }

    /// Like [`single_raw`](Self::single_raw), wrapping a stored edge.
    pub fn single_relationship(&self, direction: Direction) -> Result<Option<Edge>, RelationshipError> {
        match self.single_raw(direction)? {
            Some(SingleRelationship::Pending(edge)) => Ok(Some(edge)),
            Some(SingleRelationship::Stored(raw)) => {
                Ok(Some(self.identity_map.wrap_edge(self.store.as_ref(), &raw)?))
            }
            None => Ok(None),
        }
    }

    /// Returns the neighbour across the single relationship, if any.
    pub fn single_node(&self, direction: Direction) -> Result<Option<Entity>, RelationshipError> {
        match self.single_raw(direction)? {
            Some(SingleRelationship::Pending(edge)) => Ok(Some(edge.other_node(&self.owner).clone())),
            Some(SingleRelationship::Stored(raw)) => {
                let Some(node) = self.owner.id() else {
                    return Ok(None);
                };
                let other = raw.other_node(node);
                Ok(Some(self.identity_map.wrap_node(self.store.as_ref(), other)?))
            }
            None => Ok(None),
        }
    }

    /// Destroys the single relationship for `direction`.
    ///
    /// Returns `false` if there was none.
    pub fn destroy_single_relationship(&mut self, direction: Direction) -> Result<bool, RelationshipError> {
        let Some(edge) = self.single_relationship(direction)? else {
            return Ok(false);
        };
        edge.destroy(self.store.as_ref())?;
        match direction {
            Direction::Outgoing => {
                if !self.rm_unpersisted_outgoing_rel(&edge) {
                    self.rm_outgoing_rel(&edge);
                }
            }
            Direction::Incoming => {
                if !self.rm_unpersisted_incoming_rel(&edge) {
                    self.rm_incoming_rel(&edge);
                }
            }
            Direction::Both => {
                self.rm_incoming_rel(&edge);
                self.rm_outgoing_rel(&edge);
            }
        }
        Ok(true)
    }

    /// Destroys every relationship for `direction` whose neighbour is in `targets`.
    ///
    /// Matching edges are dropped from the pending sequences and, if
    /// persisted, deleted from the store. Returns how many were destroyed.
    pub fn destroy_rels(
        &mut self,
        direction: Direction,
        targets: &[Entity],
    ) -> Result<usize, RelationshipError> {
        let edges = self.all_relationships(direction)?;
        let mut destroyed = 0;
        for edge in edges {
            let neighbor = match direction {
                Direction::Outgoing => edge.end_node(),
                Direction::Incoming => edge.start_node(),
                Direction::Both => edge.other_node(&self.owner),
            };
            if !targets.contains(neighbor) {
                continue;
            }
            if matches!(direction, Direction::Outgoing | Direction::Both) {
                self.rm_outgoing_rel(&edge);
                self.rm_unpersisted_outgoing_rel(&edge);
            }
            if matches!(direction, Direction::Incoming | Direction::Both) {
                self.rm_incoming_rel(&edge);
                self.rm_unpersisted_incoming_rel(&edge);
            }
            edge.destroy(self.store.as_ref())?;
            destroyed += 1;
        }
        Ok(destroyed)
    }

    /// Returns the persisted outgoing edges from the owner to `other`.
    pub fn to_other(&self, other: &Entity) -> Result<Vec<Edge>, RelationshipError> {
        let Some(node) = self.owner.id() else {
            return Err(RelationshipError::NotPersisted("to_other"));
        };
        let Some(other) = other.id() else {
            return Ok(Vec::new());
        };
        let store = self.store.as_ref();
        let mut edges = Vec::new();
        for raw in store.edges(node, self.dsl.rel_type(), Direction::Outgoing)? {
            if raw.end == other {
                edges.push(self.identity_map.wrap_edge(store, &raw)?);
            }
        }
        Ok(edges)
    }

    /// Constructs a transient entity of the declared target type.
    ///
    /// Without a declared target the owner's type is used.
    pub fn build(&self) -> Entity {
        let ty = self
            .dsl
            .target()
            .cloned()
            .unwrap_or_else(|| self.owner.entity_type().clone());
        Entity::new(ty)
    }

    /// Creates a pending edge between the owner and `to`, without adding it.
    ///
    /// `Outgoing` makes the owner the start; anything else makes it the end.
    pub fn create_relationship_to(&self, to: &Entity, direction: Direction) -> Edge {
        match direction {
            Direction::Outgoing => Edge::new(self.dsl.rel_type(), self.owner.clone(), to.clone()),
            Direction::Incoming | Direction::Both => {
                Edge::new(self.dsl.rel_type(), to.clone(), self.owner.clone())
            }
        }
    }

    /// Appends to the incoming pending sequence.
    pub fn add_incoming_rel(&mut self, edge: Edge) {
        self.incoming.push(edge);
    }

    /// Appends to the outgoing pending sequence.
    pub fn add_outgoing_rel(&mut self, edge: Edge) {
        self.outgoing.push(edge);
    }

    /// Makes `edge` visible as incoming to callback code.
    pub fn add_unpersisted_incoming_rel(&mut self, edge: Edge) {
        self.unpersisted_incoming.get_or_insert_with(Vec::new).push(edge);
    }

    /// Makes `edge` visible as outgoing to callback code.
    pub fn add_unpersisted_outgoing_rel(&mut self, edge: Edge) {
        self.unpersisted_outgoing.get_or_insert_with(Vec::new).push(edge);
    }

    /// Removes `edge` from the incoming pending sequence.
    pub fn rm_incoming_rel(&mut self, edge: &Edge) -> bool {
        remove_edge(&mut self.incoming, edge)
    }

    /// Removes `edge` from the outgoing pending sequence.
    pub fn rm_outgoing_rel(&mut self, edge: &Edge) -> bool {
        remove_edge(&mut self.outgoing, edge)
    }

    /// Removes `edge` from the unpersisted incoming sequence.
    ///
    /// Once the sequence is empty it is dropped, so reads fall back to the
    /// main pending sequence.
    pub fn rm_unpersisted_incoming_rel(&mut self, edge: &Edge) -> bool {
        remove_unpersisted(&mut self.unpersisted_incoming, edge)
    }

    /// Removes `edge` from the unpersisted outgoing sequence.
    pub fn rm_unpersisted_outgoing_rel(&mut self, edge: &Edge) -> bool {
        remove_unpersisted(&mut self.unpersisted_outgoing, edge)
    }

    /// Returns `true` if there is nothing left to flush.
    ///
    /// This describes pending work, not whether the owner is persisted.
    pub fn is_persisted(&self) -> bool {
        self.outgoing.is_empty() && self.incoming.is_empty()
    }

    /// Returns `true` if persisted edges for `direction` are cached.
    pub fn is_cached(&self, direction: Direction) -> bool {
        self.persisted_relationships.get(direction).is_loaded()
    }

    /// Writes every pending edge to the store, outgoing first.
    ///
    /// Both pending sequences and all caches are cleared before anything
    /// is saved. Edges that are already persisted are skipped, and destroyed
    /// edges are dropped. Returns the edges written by this call.
    ///
    /// A failed save aborts the flush with [`RelationshipError::SaveFailed`].
    /// The pending sequences stay empty; [`Session::save`](crate::Session::save)
    /// puts them back when it rolls back its own unit of work.
    pub fn persist(&mut self) -> Result<Vec<Edge>, RelationshipError> {
        let outgoing = std::mem::take(&mut self.outgoing);
        let incoming = std::mem::take(&mut self.incoming);
        self.invalidate_caches();

        let store = self.store.as_ref();
        let mut saved = Vec::new();
        for (direction, edges) in [(Direction::Outgoing, outgoing), (Direction::Incoming, incoming)] {
            for edge in edges {
                if edge.is_persisted() || edge.is_destroyed() {
                    continue;
                }
                if !edge.save(store)? {
                    return Err(RelationshipError::SaveFailed {
                        direction,
                        edge: edge.to_string(),
                        diagnostics: edge.validate(),
                    });
                }
                self.identity_map.register_edge(&edge);
                saved.push(edge);
            }
        }

        #[cfg(feature = "logging")]
        if !saved.is_empty() {
            log::debug!("{self}: persisted {} edges", saved.len());
        }

        Ok(saved)
    }

    /// Evicts pending edges from the identity map and drops cached state.
    ///
    /// Called at the end of a unit of work so the next one re-reads the
    /// store instead of reusing stale edge handles. Both unpersisted
    /// sequences are dropped and the persisted caches invalidated.
    pub fn remove_from_identity_map(&mut self) {
        for edge in self.outgoing.iter().chain(self.incoming.iter()) {
            self.identity_map.remove_edge(edge);
        }
        self.unpersisted_outgoing = None;
        self.unpersisted_incoming = None;
        self.invalidate_caches();
    }

    /// Drops destroyed edges from every pending sequence.
    ///
    /// An edge created with both endpoints in view sits in two stores;
    /// destroying it through one leaves a dead copy in the other until it
    /// is pruned. Returns how many copies were dropped.
    pub fn prune_destroyed(&mut self) -> usize {
        let mut pruned = 0;
        for seq in [&mut self.outgoing, &mut self.incoming] {
            let before = seq.len();
            seq.retain(|e| !e.is_destroyed());
            pruned += before - seq.len();
        }
        for seq in [&mut self.unpersisted_outgoing, &mut self.unpersisted_incoming] {
            if let Some(edges) = seq.as_mut() {
                let before = edges.len();
                edges.retain(|e| !e.is_destroyed());
                pruned += before - edges.len();
                if edges.is_empty() {
                    *seq = None;
                }
            }
        }
        pruned
    }

    pub(crate) fn pending(&self) -> PendingEdges {
        PendingEdges {
            outgoing: self.outgoing.clone(),
            incoming: self.incoming.clone(),
        }
    }

    // Puts back the main pending sequences captured before a failed flush.
    pub(crate) fn restore_pending(&mut self, pending: PendingEdges) {
        self.outgoing = pending.outgoing;
        self.incoming = pending.incoming;
        self.invalidate_caches();
    }

    /// Drops all pending edges, leaving the persisted caches alone.
    ///
    /// Used when the owner reverts to a transient state.
    pub fn clear_unpersisted(&mut self) {
        self.outgoing.clear();
        self.incoming.clear();
        self.unpersisted_outgoing = None;
        self.unpersisted_incoming = None;
    }

    fn invalidate_caches(&mut self) {
        self.persisted_relationships.for_each_mut(CacheState::invalidate);
        self.persisted_neighbors.for_each_mut(CacheState::invalidate);
    }
}

fn remove_edge(seq: &mut Vec<Edge>, edge: &Edge) -> bool {
    let before = seq.len();
    seq.retain(|e| e != edge);
    seq.len() != before
}

fn remove_unpersisted(seq: &mut Option<Vec<Edge>>, edge: &Edge) -> bool {
    let Some(edges) = seq.as_mut() else {
        return false;
    };
    let removed = remove_edge(edges, edge);
    if edges.is_empty() {
        *seq = None;
    }
    removed
}

impl fmt::Display for RelationshipStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unpersisted = |seq: &Option<Vec<Edge>>| seq.as_ref().map_or(0, Vec::len);
        write!(
            f,
            "RelationshipStore node: {} rel_type: {} outgoing {}/{} incoming {}/{}",
            self.owner,
            self.dsl.rel_type(),
            self.outgoing.len(),
            unpersisted(&self.unpersisted_outgoing),
            self.incoming.len(),
            unpersisted(&self.unpersisted_incoming),
        )
    }
}
