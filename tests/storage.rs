use colonnade::engine::error::{AccessError, ECSError, ECSResult, RegistryError};
use colonnade::engine::storage::Storage;
use colonnade::Entity;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Position {
    x: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Velocity {
    v: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Tag(u32);

#[derive(Debug, PartialEq)]
struct Name(String);

fn collect<F: FnOnce(&mut dyn FnMut(Entity))>(scan: F) -> Vec<Entity> {
    let mut visited = Vec::new();
    scan(&mut |entity| visited.push(entity));
    visited
}

#[test]
fn spawn_and_read_back() -> ECSResult<()> {
    let mut storage = Storage::new();
    let a = storage.new_entity((Position { x: 1.0 }, Velocity { v: 2.0 }))?;
    let b = storage.new_entity((Position { x: 3.0 },))?;

    assert_eq!(a.index(), 0);
    assert_eq!(b.index(), 1);
    assert_eq!(storage.get_size(), 2);
    assert_eq!(storage.active_count(), 2);

    assert_eq!(storage.get_component::<Position>(a), &Position { x: 1.0 });
    assert_eq!(storage.get_component::<Velocity>(a), &Velocity { v: 2.0 });
    assert!(storage.has_component::<Velocity>(a));
    assert!(!storage.has_component::<Velocity>(b));

    storage.get_component_mut::<Position>(b).x = 10.0;
    assert_eq!(storage.try_get_component::<Position>(b)?.x, 10.0);
    Ok(())
}

#[test]
fn filter_visits_exactly_the_matching_live_entities() -> ECSResult<()> {
    let mut storage = Storage::new();
    let mut expected = Vec::new();
    for i in 0..100u32 {
        let entity = if i % 3 == 0 {
            storage.new_entity((Position { x: i as f64 }, Velocity { v: 1.0 }))?
        } else {
            storage.new_entity((Position { x: i as f64 },))?
        };
        if i % 3 == 0 && i % 2 == 1 {
            expected.push(entity);
        }
    }
    for entity in storage.entities().collect::<Vec<_>>() {
        if entity.index() % 2 == 0 {
            storage.remove_entity(entity);
        }
    }

    let visited = collect(|f| storage.for_entities_with::<(Position, Velocity), _>(f));
    assert_eq!(visited, expected);

    let positions = collect(|f| storage.for_entities_with::<(Position,), _>(f));
    assert_eq!(positions.len(), 50);
    Ok(())
}

#[test]
fn empty_filter_fires_once_with_sentinel() -> ECSResult<()> {
    let mut storage = Storage::new();
    assert_eq!(collect(|f| storage.for_entities_with::<(), _>(f)), vec![Entity::SENTINEL]);

    for _ in 0..10 {
        storage.new_entity((Tag(0),))?;
    }
    assert_eq!(collect(|f| storage.for_entities_with::<(), _>(f)), vec![Entity::SENTINEL]);
    Ok(())
}

#[test]
fn unregistered_component_matches_nothing() -> ECSResult<()> {
    let mut storage = Storage::new();
    storage.new_entity((Position { x: 0.0 },))?;
    assert!(collect(|f| storage.for_entities_with::<(Position, Name), _>(f)).is_empty());
    Ok(())
}

#[test]
fn removing_half_then_refresh_compacts() -> ECSResult<()> {
    let mut storage = Storage::new();
    for i in 0..1000u32 {
        storage.new_entity((Tag(i),))?;
    }
    for i in (0..1000u32).step_by(2) {
        storage.remove_entity(Entity::from_raw(i));
    }
    assert_eq!(storage.get_size(), 1000);
    assert_eq!(storage.active_count(), 500);
    assert_eq!(storage.fragmentation(), 500);

    assert_eq!(storage.refresh(), 500);
    assert_eq!(storage.get_size(), 500);
    assert_eq!(storage.fragmentation(), 0);
    assert_eq!(collect(|f| storage.for_entities_with::<(), _>(f)), vec![Entity::SENTINEL]);

    let mut tags: Vec<u32> = storage.entities().map(|e| storage.get_component::<Tag>(e).0).collect();
    tags.sort_unstable();
    assert_eq!(tags, (1..1000).step_by(2).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn refresh_keeps_components_with_their_rows() -> ECSResult<()> {
    let mut storage = Storage::new();
    let mut handles = Vec::new();
    for i in 0..8u32 {
        let entity = if i % 2 == 0 {
            storage.new_entity((Tag(i), Name(format!("agent-{i}"))))?
        } else {
            storage.new_entity((Tag(i),))?
        };
        handles.push(entity);
    }
    for &i in &[0usize, 1, 5] {
        storage.remove_entity(handles[i]);
    }
    assert_eq!(storage.layout(), "__EEE_EE");

    assert_eq!(storage.refresh(), 5);
    assert_eq!(storage.layout(), "EEEEE");

    for entity in storage.entities() {
        let tag = storage.get_component::<Tag>(entity).0;
        match storage.try_get_component::<Name>(entity) {
            Ok(name) => assert_eq!(name.0, format!("agent-{tag}")),
            Err(_) => assert_eq!(tag % 2, 1),
        }
    }
    Ok(())
}

#[test]
fn refresh_without_removals_is_a_no_op() -> ECSResult<()> {
    let mut storage = Storage::new();
    let a = storage.new_entity((Tag(7),))?;
    storage.new_entity((Tag(8),))?;
    assert_eq!(storage.refresh(), 2);
    assert_eq!(storage.get_component::<Tag>(a), &Tag(7));

    let mut empty = Storage::new();
    assert_eq!(empty.refresh(), 0);
    Ok(())
}

#[test]
fn removing_everything_empties_storage() -> ECSResult<()> {
    let mut storage = Storage::new();
    for i in 0..16u32 {
        storage.new_entity((Tag(i),))?;
    }
    for entity in storage.entities().collect::<Vec<_>>() {
        storage.remove_entity(entity);
    }
    assert_eq!(storage.refresh(), 0);
    assert_eq!(storage.get_size(), 0);

    let again = storage.new_entity((Tag(99),))?;
    assert_eq!(again.index(), 0);
    assert_eq!(storage.get_component::<Tag>(again), &Tag(99));
    Ok(())
}

#[test]
fn remove_is_idempotent() -> ECSResult<()> {
    let mut storage = Storage::new();
    let entity = storage.new_entity((Tag(1),))?;
    storage.remove_entity(entity);
    storage.remove_entity(entity);
    assert_eq!(storage.active_count(), 0);
    assert_eq!(storage.fragmentation(), 1);

    assert!(matches!(
        storage.try_remove_entity(entity),
        Err(ECSError::Access(AccessError::Stale(_)))
    ));
    Ok(())
}

#[test]
fn attach_and_detach_update_signature() -> ECSResult<()> {
    let mut storage = Storage::new();
    let entity = storage.new_entity((Position { x: 0.0 },))?;

    storage.attach_component(entity, Velocity { v: 4.0 })?;
    assert!(storage.has_component::<Velocity>(entity));
    assert_eq!(collect(|f| storage.for_entities_with::<(Position, Velocity), _>(f)), vec![entity]);

    storage.attach_component(entity, Velocity { v: 6.0 })?;
    assert_eq!(storage.get_component::<Velocity>(entity).v, 6.0);

    storage.detach_component::<Velocity>(entity)?;
    assert!(!storage.has_component::<Velocity>(entity));
    assert!(collect(|f| storage.for_entities_with::<(Velocity,), _>(f)).is_empty());

    storage.detach_component::<Velocity>(entity)?;
    storage.detach_component::<Name>(entity)?;
    Ok(())
}

#[test]
fn checked_access_reports_errors() -> ECSResult<()> {
    let mut storage = Storage::new();
    let entity = storage.new_entity((Position { x: 0.0 },))?;

    assert!(matches!(
        storage.try_get_component::<Velocity>(entity),
        Err(ECSError::Access(AccessError::UnregisteredComponent(_)))
    ));

    storage.register::<Velocity>()?;
    assert!(matches!(
        storage.try_get_component::<Velocity>(entity),
        Err(ECSError::Access(AccessError::MissingComponent { .. }))
    ));

    assert!(matches!(
        storage.try_get_component::<Position>(Entity::from_raw(42)),
        Err(ECSError::Access(AccessError::Stale(_)))
    ));

    storage.remove_entity(entity);
    assert!(matches!(
        storage.try_get_component::<Position>(entity),
        Err(ECSError::Access(AccessError::Stale(_)))
    ));
    assert!(matches!(
        storage.attach_component(entity, Tag(0)),
        Err(ECSError::Access(AccessError::Stale(_)))
    ));
    Ok(())
}

#[test]
#[should_panic(expected = "get_component")]
fn unchecked_access_panics_on_missing_component() {
    let mut storage = Storage::new();
    let entity = storage.new_entity((Position { x: 0.0 },)).unwrap();
    storage.register::<Velocity>().unwrap();
    let _ = storage.get_component::<Velocity>(entity);
}

#[test]
fn frozen_registry_rejects_new_types() -> ECSResult<()> {
    let mut storage = Storage::new();
    storage.register::<Position>()?;
    storage.freeze();
    assert!(storage.is_frozen());

    storage.new_entity((Position { x: 1.0 },))?;
    let before = storage.get_size();
    assert!(matches!(
        storage.new_entity((Position { x: 1.0 }, Tag(3))),
        Err(ECSError::Registry(RegistryError::Frozen { .. }))
    ));
    assert_eq!(storage.get_size(), before);
    assert_eq!(storage.registry().len(), 1);
    Ok(())
}

#[test]
fn frozen_registry_accepts_registered_types() -> ECSResult<()> {
    let mut storage = Storage::new();
    storage.register::<Position>()?;
    storage.register::<Tag>()?;
    storage.freeze();

    let first = storage.new_entity((Position { x: 1.0 }, Tag(1)))?;
    let second = storage.new_entity((Tag(2), Position { x: 2.0 }))?;

    assert_eq!(storage.registry().len(), 2);
    assert_eq!(storage.get_component::<Position>(first), &Position { x: 1.0 });
    assert_eq!(storage.get_component::<Tag>(second), &Tag(2));
    Ok(())
}

#[test]
fn registry_describes_registered_types() -> ECSResult<()> {
    let mut storage = Storage::new();
    let position = storage.register::<Position>()?;
    let tag = storage.register::<Tag>()?;
    assert_eq!(storage.register::<Position>()?, position);

    let registry = storage.registry();
    let desc = registry.description_by_component_id(tag).unwrap();
    assert!(desc.matches_type::<Tag>());
    assert!(!desc.matches_type::<Position>());
    assert_eq!(desc.size, std::mem::size_of::<Tag>());
    assert!(registry.description_by_component_id(tag + 1).is_none());

    let ids: Vec<_> = registry.descriptions().map(|desc| desc.component_id).collect();
    assert_eq!(ids, vec![position, tag]);
    Ok(())
}

#[test]
fn late_registration_backfills_existing_rows() -> ECSResult<()> {
    let mut storage = Storage::new();
    let first = storage.new_entity((Position { x: 0.0 },))?;
    let second = storage.new_entity((Position { x: 1.0 }, Tag(5)))?;

    assert_eq!(storage.column::<Tag>().map(|column| column.len()), Some(2));
    assert!(!storage.has_component::<Tag>(first));
    assert_eq!(storage.get_component::<Tag>(second), &Tag(5));

    storage.attach_component(first, Tag(9))?;
    assert_eq!(storage.get_component::<Tag>(first), &Tag(9));
    Ok(())
}

#[test]
fn parallel_scan_visits_each_match_once() -> ECSResult<()> {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let mut storage = Storage::new();
    for i in 0..5000u32 {
        if i % 4 == 0 {
            storage.new_entity((Tag(i), Velocity { v: 0.0 }))?;
        } else {
            storage.new_entity((Tag(i),))?;
        }
    }
    let hits: Vec<AtomicUsize> = (0..5000).map(|_| AtomicUsize::new(0)).collect();
    storage.for_entities_with_parallel::<(Tag, Velocity), _>(|entity| {
        hits[entity.index()].fetch_add(1, Ordering::Relaxed);
    });

    for (row, hit) in hits.iter().enumerate() {
        let expected = usize::from(row % 4 == 0);
        assert_eq!(hit.load(Ordering::Relaxed), expected, "row {row}");
    }
    Ok(())
}
