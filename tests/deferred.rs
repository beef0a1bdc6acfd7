use std::sync::Arc;

use parking_lot::Mutex;

use colonnade::engine::commands::{Command, CommandQueue};
use colonnade::engine::component::Bundle;
use colonnade::engine::config::RuntimeConfig;
use colonnade::engine::error::{AccessError, ECSError, ECSResult};
use colonnade::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Energy(i32);

#[derive(Clone, Copy, Debug, PartialEq)]
struct Dead;

fn scheduler_with<S: System>(system: S) -> ECSResult<Scheduler> {
    Scheduler::builder()
        .config(RuntimeConfig::sequential().with_fixed_delta(1.0))
        .component::<Energy>()
        .component::<Dead>()
        .system(system)
        .build()
}

#[test]
fn queue_is_fifo_and_take_empties_it() {
    let queue = CommandQueue::new();
    assert!(queue.is_empty());

    queue.push(Command::despawn(Entity::from_raw(3)));
    queue.push(Command::spawn((Energy(1),)));
    queue.push(Command::detach::<Energy>(Entity::from_raw(1)));
    assert_eq!(queue.len(), 3);

    let kinds: Vec<&str> = queue.take().iter().map(Command::kind).collect();
    assert_eq!(kinds, vec!["despawn", "spawn", "detach"]);
    assert!(queue.is_empty());
}

#[test]
fn queue_accepts_pushes_from_many_threads() {
    let queue = CommandQueue::new();
    std::thread::scope(|scope| {
        for worker in 0..8 {
            let queue = &queue;
            scope.spawn(move || {
                for i in 0..100 {
                    queue.push(Command::despawn(Entity::from_raw(worker * 100 + i)));
                }
            });
        }
    });
    assert_eq!(queue.len(), 800);
}

#[test]
fn bundles_replace_duplicate_types() {
    let bundle = Bundle::new().with(Energy(1)).with(Energy(2));
    assert_eq!(bundle.len(), 1);
    assert!(bundle.contains::<Energy>());
    assert!(!bundle.contains::<Dead>());
}

#[test]
fn attach_and_detach_commands_change_signatures_after_the_tick() -> ECSResult<()> {
    let mark = FnSystem::new(
        SystemDescriptor::new("mark").reads::<Energy>().takes_entity().returns_deferred(),
        |ctx| {
            let entity = ctx.entity();
            assert!(!ctx.manager().has_component::<Dead>(entity));
            (ctx.get::<Energy>().0 <= 0).then(|| Command::attach(entity, Dead))
        },
    );

    let mut scheduler = scheduler_with(mark)?;
    let (alive, dying) = scheduler.with_exclusive(|m| -> ECSResult<(Entity, Entity)> {
        Ok((m.new_entity((Energy(5),))?, m.new_entity((Energy(0),))?))
    })?;

    let stats = scheduler.tick()?;
    assert_eq!(stats.commands_applied, 1);

    let storage = scheduler.storage();
    assert!(!storage.has_component::<Dead>(alive));
    assert!(storage.has_component::<Dead>(dying));

    scheduler.with_exclusive(|m| m.detach_component::<Dead>(dying))?;
    assert!(!scheduler.storage().has_component::<Dead>(dying));
    Ok(())
}

#[test]
fn custom_commands_see_the_results_of_earlier_ones() -> ECSResult<()> {
    let observed = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&observed);
    let system = FnSystem::new(SystemDescriptor::new("spawn_then_count"), move |ctx| {
        let manager = ctx.manager();
        manager.new_entity((Energy(1),));
        manager.new_entity((Energy(2),));
        let sink = Arc::clone(&sink);
        manager.defer_fn(move |m| {
            *sink.lock() = Some(m.active_entity_count());
            Ok(())
        });
        None
    });

    let mut scheduler = scheduler_with(system)?;
    scheduler.tick()?;
    assert_eq!(*observed.lock(), Some(2));
    Ok(())
}

#[test]
fn custom_command_errors_are_counted_without_stopping_the_drain() -> ECSResult<()> {
    let system = FnSystem::new(SystemDescriptor::new("faulty"), |ctx| {
        let manager = ctx.manager();
        manager.defer_fn(|m| {
            m.get_component::<Energy>(Entity::from_raw(77))?;
            Ok(())
        });
        manager.new_entity((Energy(9),));
        None
    });

    let mut scheduler = scheduler_with(system)?;
    let stats = scheduler.tick()?;
    assert_eq!(stats.failed_commands, 1);
    assert_eq!(stats.commands_applied, 1);
    assert_eq!(scheduler.storage().active_count(), 1);
    Ok(())
}

#[test]
fn deferred_manager_mutates_immediately() -> ECSResult<()> {
    let mut scheduler = scheduler_with(FnSystem::new(SystemDescriptor::new("noop").reads::<Energy>(), |_| None))?;

    scheduler.with_exclusive(|m| -> ECSResult<()> {
        let entity = m.new_entity((Energy(10),))?;
        assert_eq!(m.get_entity_count(), 1);

        m.get_component_mut::<Energy>(entity)?.0 -= 3;
        assert_eq!(m.get_component::<Energy>(entity)?, &Energy(7));

        m.attach_component(entity, Dead)?;
        assert!(m.storage().has_component::<Dead>(entity));

        m.remove_entity(entity)?;
        assert!(!m.is_active(entity));
        assert!(matches!(
            m.remove_entity(entity),
            Err(ECSError::Access(AccessError::Stale(_)))
        ));
        Ok(())
    })?;

    assert_eq!(scheduler.storage().fragmentation(), 1);
    let stats = scheduler.tick()?;
    assert_eq!(stats.rows_after_compaction, Some(0));
    Ok(())
}

#[test]
fn stale_handles_in_commands_fail_softly() -> ECSResult<()> {
    let system = FnSystem::new(SystemDescriptor::new("stale"), |ctx| {
        let manager = ctx.manager();
        manager.remove_entity(Entity::from_raw(1_000));
        manager.attach_component(Entity::from_raw(1_000), Energy(0));
        manager.detach_component::<Energy>(Entity::from_raw(1_000));
        None
    });

    let mut scheduler = scheduler_with(system)?;
    let stats = scheduler.tick()?;
    assert_eq!(stats.failed_commands, 3);
    assert_eq!(stats.commands_applied, 0);
    Ok(())
}
