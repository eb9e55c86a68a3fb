use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use manifold_ogm::{
    Direction, Engine, Entity, EntityType, Error, GraphStore, LifecycleListener, MemoryStore,
    RegistryError, RelationshipDsl, UnitOfWork,
};

fn engine(registry: bool) -> (Arc<MemoryStore>, Arc<Engine>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::builder()
        .instance_registry(registry)
        .build(store.clone(), store.clone());
    engine.start().unwrap();
    (store, engine)
}

fn person() -> EntityType {
    EntityType::new("Person")
}

#[test]
fn test_pending_friends_survive_save_and_reload() {
    let (store, engine) = engine(true);
    let a = Entity::new(person());
    let b = Entity::new(person());
    let c = Entity::new(person());

    let mut session = engine.session();
    session.relate(&a, "friends", &b);
    session.relate(&a, "friends", &c);
    assert_eq!(session.rels(&a, "friends").size(Direction::Outgoing).unwrap(), 2);

    session.save(&a).unwrap();
    assert!(a.is_persisted() && b.is_persisted() && c.is_persisted());
    assert_eq!(store.edges_of_type("friends").len(), 2);
    assert_eq!(store.commit_count(), 1);

    let mut fresh = engine.session();
    let loaded = fresh.load(a.id().unwrap()).unwrap();
    assert!(!Entity::ptr_eq(&loaded, &a));

    let friends = fresh.rels(&loaded, "friends").nodes(Direction::Outgoing).unwrap();
    assert_eq!(friends.len(), 2);
    assert!(friends.contains(&b));
    assert!(friends.contains(&c));

    let edges = fresh
        .rels(&loaded, "friends")
        .all_relationships(Direction::Outgoing)
        .unwrap();
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.start_node() == &a));
}

#[test]
fn test_edge_written_once_from_either_side() {
    for start_first in [true, false] {
        let (store, engine) = engine(false);
        let a = Entity::new(person());
        let b = Entity::new(person());

        let mut session = engine.session();
        let edge = session.relate(&a, "friends", &b);
        assert_eq!(session.rels(&b, "friends").size(Direction::Incoming).unwrap(), 1);

        let (first, second) = if start_first { (&a, &b) } else { (&b, &a) };
        session.save(first).unwrap();
        session.save(second).unwrap();

        assert!(edge.is_persisted());
        assert_eq!(store.edges_of_type("friends").len(), 1);
        assert_eq!(session.rels(&a, "friends").size(Direction::Outgoing).unwrap(), 1);
        assert_eq!(session.rels(&b, "friends").size(Direction::Incoming).unwrap(), 1);
        assert!(session.rels(&a, "friends").is_persisted());
        assert!(session.rels(&b, "friends").is_persisted());
    }
}

#[test]
fn test_save_registers_every_new_node() {
    let (_store, engine) = engine(true);
    let a = Entity::new(person());
    let b = Entity::new(EntityType::new("Company"));

    let mut session = engine.session();
    session.relate(&a, "employer", &b);
    session.save(&a).unwrap();

    assert_eq!(engine.all_instances(&person()).unwrap(), vec![a.clone()]);
    assert_eq!(
        engine.all_instances(&EntityType::new("Company")).unwrap(),
        vec![b.clone()]
    );
    assert!(Entity::ptr_eq(
        &session.identity_map().get_node(a.id().unwrap()).unwrap(),
        &a
    ));
}

#[test]
fn test_save_joins_open_unit_of_work() {
    let (store, engine) = engine(true);
    let a = Entity::new(person());
    let b = Entity::new(person());

    store.begin().unwrap();
    let mut session = engine.session();
    session.relate(&a, "friends", &b);
    session.save(&a).unwrap();
    assert!(store.is_active());
    assert_eq!(store.commit_count(), 0);

    store.commit().unwrap();
    assert_eq!(store.commit_count(), 1);
    assert_eq!(store.edges_of_type("friends").len(), 1);
}

// Fails the nth entity creation it sees.
struct FailNth {
    nth: usize,
    seen: AtomicUsize,
}

impl FailNth {
    fn new(nth: usize) -> Arc<dyn LifecycleListener> {
        Arc::new(Self {
            nth,
            seen: AtomicUsize::new(0),
        })
    }
}

impl LifecycleListener for FailNth {
    fn on_entity_created(&self, _entity: &Entity) -> Result<(), Error> {
        if self.seen.fetch_add(1, Ordering::SeqCst) == self.nth {
            return Err(Error::Registry(RegistryError::NotPersisted));
        }
        Ok(())
    }
}

#[test]
fn test_failed_save_rolls_back() {
    let (store, engine) = engine(false);
    let a = Entity::new(person());
    let b = Entity::new(person());
    let c = Entity::new(person());

    let mut session = engine.session();
    let friend = session.relate(&a, "friends", &b);
    let rival = session.relate(&a, "rivals", &c);

    // a and the first neighbour are created and one edge is written first
    let failing = FailNth::new(2);
    engine.events().add(Arc::clone(&failing));
    assert!(matches!(
        session.save(&a),
        Err(Error::Registry(RegistryError::NotPersisted))
    ));

    assert!(!store.is_active());
    assert_eq!(store.commit_count(), 0);
    // Only the reference node is left
    assert_eq!(store.node_count(), 1);
    assert_eq!(store.edge_count(), 0);

    for entity in [&a, &b, &c] {
        assert!(!entity.is_persisted());
    }
    assert!(!friend.is_persisted() && !rival.is_persisted());
    assert_eq!(session.identity_map().node_count(), 0);
    assert_eq!(session.identity_map().edge_count(), 0);
    assert_eq!(
        session.rels(&a, "friends").relationships(Direction::Outgoing),
        vec![friend.clone()]
    );
    assert_eq!(
        session.rels(&a, "rivals").relationships(Direction::Outgoing),
        vec![rival.clone()]
    );
    assert_eq!(
        session.rels(&b, "friends").relationships(Direction::Incoming),
        vec![friend.clone()]
    );

    assert!(engine.events().remove(&failing));
    session.save(&a).unwrap();
    assert!(a.is_persisted() && b.is_persisted() && c.is_persisted());
    assert!(friend.is_persisted() && rival.is_persisted());
    assert_eq!(store.edge_count(), 2);
    assert_eq!(store.commit_count(), 1);

    session.save(&b).unwrap();
    assert_eq!(store.edges_of_type("friends").len(), 1);
}

#[test]
fn test_failed_save_in_open_unit_leaves_rollback_to_caller() {
    let (store, engine) = engine(false);
    let a = Entity::new(person());
    let b = Entity::new(person());

    let mut session = engine.session();
    session.relate(&a, "friends", &b);
    engine.events().add(FailNth::new(1));

    store.begin().unwrap();
    assert!(session.save(&a).is_err());
    assert!(store.is_active());
    assert!(a.is_persisted());
    store.rollback().unwrap();
    assert_eq!(store.node_count(), 1);
}

#[test]
fn test_destroyed_edge_is_not_saved_from_counterpart() {
    let (store, engine) = engine(false);
    let a = Entity::new(person());
    let b = Entity::new(person());

    let mut session = engine.session();
    let edge = session.relate(&a, "friends", &b);
    let destroyed = session
        .rels(&a, "friends")
        .destroy_rels(Direction::Outgoing, &[b.clone()])
        .unwrap();
    assert_eq!(destroyed, 1);
    assert!(edge.is_destroyed());

    session.save(&b).unwrap();
    assert!(b.is_persisted());
    assert!(!a.is_persisted());
    assert!(!edge.is_persisted());
    assert_eq!(store.edge_count(), 0);
}

#[test]
fn test_destroy_through_session_clears_counterpart() {
    let (store, engine) = engine(false);
    let a = Entity::new(person());
    let b = Entity::new(person());
    let c = Entity::new(person());

    let mut session = engine.session();
    session.relate(&a, "friends", &b);
    session.relate(&a, "friends", &c);
    let destroyed = session
        .destroy_rels(&a, "friends", Direction::Outgoing, &[b.clone()])
        .unwrap();
    assert_eq!(destroyed, 1);
    assert_eq!(session.rels(&b, "friends").size(Direction::Incoming).unwrap(), 0);
    assert!(session.rels(&b, "friends").is_persisted());
    assert_eq!(session.rels(&c, "friends").size(Direction::Incoming).unwrap(), 1);

    session.relate(&a, "employer", &c);
    assert!(
        session
            .destroy_single_relationship(&a, "employer", Direction::Outgoing)
            .unwrap()
    );
    assert!(session.rels(&c, "employer").is_persisted());
    assert!(
        !session
            .destroy_single_relationship(&c, "employer", Direction::Incoming)
            .unwrap()
    );

    session.save(&b).unwrap();
    assert!(!a.is_persisted());
    assert_eq!(store.edge_count(), 0);

    session.save(&a).unwrap();
    assert_eq!(store.edges_of_type("friends").len(), 1);
    assert_eq!(store.edges_of_type("employer").len(), 0);
}

#[test]
fn test_reset_drops_pending_edges() {
    let (store, engine) = engine(false);
    let a = Entity::new(person());
    let b = Entity::new(person());

    let mut session = engine.session();
    session.relate(&a, "friends", &b);
    session.relate(&a, "rivals", &b);
    session.reset(&a);

    assert!(session.rels(&a, "friends").is_persisted());
    assert!(session.rels(&a, "rivals").is_persisted());
    assert_eq!(session.rels(&a, "friends").size(Direction::Outgoing).unwrap(), 0);

    session.save(&a).unwrap();
    assert_eq!(store.edge_count(), 0);
    assert!(!b.is_persisted());
}

#[test]
fn test_end_unit_of_work_invalidates_caches() {
    let (store, engine) = engine(false);
    let a = Entity::new(person());
    let b = Entity::new(person());
    let c = Entity::new(person());

    let mut session = engine.session();
    session.relate(&a, "friends", &b);
    session.save(&a).unwrap();
    session.save(&c).unwrap();

    let edges = session
        .rels(&a, "friends")
        .all_relationships(Direction::Outgoing)
        .unwrap();
    assert_eq!(edges.len(), 1);
    assert!(session.rels(&a, "friends").is_cached(Direction::Outgoing));

    store
        .create_edge(a.id().unwrap(), "friends", c.id().unwrap())
        .unwrap();
    session.end_unit_of_work();

    assert!(!session.rels(&a, "friends").is_cached(Direction::Outgoing));
    assert_eq!(session.identity_map().node_count(), 0);
    assert_eq!(session.identity_map().edge_count(), 0);

    let edges = session
        .rels(&a, "friends")
        .all_relationships(Direction::Outgoing)
        .unwrap();
    assert_eq!(edges.len(), 2);
}

#[test]
fn test_create_related_builds_declared_target() {
    let (store, engine) = engine(true);
    let a = Entity::new(person());

    let mut session = engine.session();
    session.save(&a).unwrap();
    session.rels_with(
        &a,
        RelationshipDsl::new("employer").with_target(EntityType::new("Company")),
    );

    let company = session.create_related(&a, "employer").unwrap();
    assert!(company.is_persisted());
    assert_eq!(company.entity_type().name(), "Company");
    assert_eq!(
        session.rels(&a, "employer").single_node(Direction::Outgoing).unwrap(),
        Some(company.clone())
    );
    assert_eq!(store.edges_of_type("employer").len(), 0);

    session.save(&a).unwrap();
    assert_eq!(store.edges_of_type("employer").len(), 1);
    assert_eq!(
        engine.all_instances(&EntityType::new("Company")).unwrap(),
        vec![company]
    );
}

#[test]
fn test_load_reuses_handles() {
    let (_store, engine) = engine(false);
    let a = Entity::new(person());
    let mut session = engine.session();
    session.save(&a).unwrap();

    let mut other = engine.session();
    let first = other.load(a.id().unwrap()).unwrap();
    let second = other.load(a.id().unwrap()).unwrap();
    assert!(Entity::ptr_eq(&first, &second));
    assert_eq!(first, a);
}

#[test]
fn test_rels_with_keeps_first_declaration() {
    let (_store, engine) = engine(false);
    let a = Entity::new(person());
    let mut session = engine.session();

    session.rels(&a, "employer");
    let rels = session.rels_with(
        &a,
        RelationshipDsl::new("employer").with_target(EntityType::new("Company")),
    );
    assert!(rels.dsl().target().is_none());
    assert_eq!(rels.rel_type(), "employer");
}
