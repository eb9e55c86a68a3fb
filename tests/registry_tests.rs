use std::cell::Cell;
use std::sync::Arc;

use manifold_ogm::{
    Direction, Engine, EngineConfig, Entity, EntityType, GraphStore, IndexError, InstanceRegistry,
    MemoryStore, RegistryError, SweepReport,
};

fn started() -> (Arc<MemoryStore>, Arc<Engine>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::builder().build(store.clone(), store.clone());
    engine.start().unwrap();
    (store, engine)
}

fn registry_links(store: &MemoryStore, rel_type: &str) -> usize {
    store
        .edges(store.reference_node(), rel_type, Direction::Outgoing)
        .unwrap()
        .len()
}

fn create(engine: &Arc<Engine>, entity_type: &EntityType, count: usize) -> Vec<Entity> {
    let mut session = engine.session();
    (0..count)
        .map(|_| {
            let entity = Entity::new(entity_type.clone());
            session.save(&entity).unwrap();
            entity
        })
        .collect()
}

#[test]
fn test_all_returns_every_created_instance() {
    let (_store, engine) = started();
    let person = EntityType::new("Person");
    let created = create(&engine, &person, 4);

    let registry = engine.registry().unwrap();
    let all = registry.all(&person).unwrap();
    assert_eq!(all.len(), 4);
    for entity in &created {
        assert!(all.contains(entity));
    }
    assert!(!all.contains(registry.entity()));
    assert_eq!(engine.all_instances(&person).unwrap(), all);
}

#[test]
fn test_registry_node_is_never_its_own_instance() {
    let (store, engine) = started();
    let registry = engine.registry().unwrap();
    let own = registry.entity().clone();

    registry.on_entity_created(&own).unwrap();
    assert!(registry.connect(&own).unwrap().is_none());

    let label = EntityType::new(engine.config().registry_label.as_str());
    assert!(registry.all(&label).unwrap().is_empty());
    // Only the reference -> registry link exists
    assert_eq!(store.edge_count(), 1);
}

#[test]
fn test_start_twice_keeps_one_registry() {
    let (store, engine) = started();
    let first = engine.registry().unwrap();

    InstanceRegistry::on_engine_started(&engine).unwrap();
    engine.start().unwrap();

    assert_eq!(registry_links(&store, "index_node"), 1);
    assert!(Arc::ptr_eq(&first, &engine.registry().unwrap()));
}

#[test]
fn test_stop_clears_instance() {
    let (store, engine) = started();
    let person = EntityType::new("Person");
    create(&engine, &person, 2);

    engine.stop().unwrap();
    assert!(engine.registry().is_none());
    assert!(matches!(
        engine.all_instances(&person),
        Err(RegistryError::NotStarted)
    ));

    // Entities created while stopped are not registered
    let edges_before = store.edge_count();
    create(&engine, &person, 1);
    assert_eq!(store.edge_count(), edges_before);
}

#[test]
fn test_restart_adopts_existing_registry() {
    let (store, engine) = started();
    let person = EntityType::new("Person");
    create(&engine, &person, 3);
    let registry_id = engine.registry().unwrap().entity().id();

    engine.stop().unwrap();
    engine.start().unwrap();

    let registry = engine.registry().unwrap();
    assert_eq!(registry.entity().id(), registry_id);
    assert_eq!(registry_links(&store, "index_node"), 1);

    create(&engine, &person, 1);
    assert_eq!(engine.all_instances(&person).unwrap().len(), 4);
}

#[test]
fn test_second_engine_on_same_store_shares_registry() {
    let (store, engine) = started();
    let person = EntityType::new("Person");
    create(&engine, &person, 2);

    let other = Engine::builder().build(store.clone(), store.clone());
    other.start().unwrap();
    assert_eq!(
        other.registry().unwrap().entity().id(),
        engine.registry().unwrap().entity().id()
    );
    assert_eq!(other.all_instances(&person).unwrap().len(), 2);
    assert_eq!(registry_links(&store, "index_node"), 1);
}

#[test]
fn test_instances_grouped_by_root_type() {
    let (_store, engine) = started();
    let person = EntityType::new("Person");
    let employee = EntityType::with_root("Employee", "Person");
    let company = EntityType::new("Company");
    create(&engine, &person, 2);
    create(&engine, &employee, 1);
    create(&engine, &company, 3);

    assert_eq!(engine.all_instances(&person).unwrap().len(), 3);
    assert_eq!(engine.all_instances(&employee).unwrap().len(), 3);
    assert_eq!(engine.all_instances(&company).unwrap().len(), 3);
    assert!(
        engine
            .all_instances(&EntityType::new("Robot"))
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_custom_registry_labels() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::builder()
        .registry_label("Registry")
        .registry_relationship("instances")
        .build(store.clone(), store.clone());
    engine.start().unwrap();

    assert_eq!(registry_links(&store, "instances"), 1);
    assert_eq!(registry_links(&store, "index_node"), 0);

    let registry = engine.registry().unwrap();
    assert_eq!(registry.entity().entity_type().name(), "Registry");
    let id = registry.entity().id().unwrap();
    assert_eq!(store.node_label(id).unwrap(), "Registry");
}

#[test]
fn test_config_roundtrip_through_builder() {
    let config = EngineConfig {
        instance_registry: false,
        ..EngineConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::builder().config(config.clone()).build(store.clone(), store);
    engine.start().unwrap();

    assert_eq!(engine.config(), &config);
    assert!(engine.registry().is_none());
}

#[test]
fn test_update_index_visits_every_instance() {
    let (_store, engine) = started();
    let person = EntityType::new("Person");
    create(&engine, &person, 5);

    let visited = Cell::new(0);
    let updater = |_: &Entity| -> Result<(), IndexError> {
        visited.set(visited.get() + 1);
        Ok(())
    };
    let report = engine.update_index(&person, &updater).unwrap();

    assert_eq!(visited.get(), 5);
    assert_eq!(
        report,
        SweepReport {
            attempted: 5,
            updated: 5,
            failures: Vec::new(),
        }
    );
}

#[test]
fn test_update_index_continues_past_failures() {
    let (_store, engine) = started();
    let person = EntityType::new("Person");
    let created = create(&engine, &person, 4);
    let broken = created[1].clone();

    let visited = Cell::new(0);
    let updater = |entity: &Entity| -> Result<(), IndexError> {
        visited.set(visited.get() + 1);
        if *entity == broken {
            return Err("index unavailable".into());
        }
        Ok(())
    };

    match engine.update_index(&person, &updater) {
        Err(RegistryError::SweepFailed(report)) => {
            assert_eq!(report.attempted, 4);
            assert_eq!(report.updated, 3);
            assert_eq!(report.failures.len(), 1);
            assert_eq!(Some(report.failures[0].0), broken.id());
            assert_eq!(report.failures[0].1, "index unavailable");
        }
        other => panic!("expected SweepFailed, got {other:?}"),
    }
    assert_eq!(visited.get(), 4);
}
