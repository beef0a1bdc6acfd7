//! # Managers
//!
//! Capability handles handed to user code.
//!
//! ## Purpose
//! Two handle types form a capability ladder over the same storage:
//!
//! - [`RuntimeManager`]: read-only queries plus deferral. Given to systems
//!   while a tick iterates; `Copy`, `Send` and `Sync`, so it can be used from
//!   inner parallel iteration. Structural requests made through it are only
//!   recorded as [`Command`]s.
//! - [`DeferredManager`]: exclusive access to storage. Only exists after the
//!   tick's iteration is over (while the queue drains) or outside ticks via
//!   [`Scheduler::with_exclusive`](crate::engine::scheduler::Scheduler::with_exclusive).
//!   Every operation is applied immediately.
//!
//! ## Invariants
//! - While any `RuntimeManager` exists, storage structure does not change.
//! - A `DeferredManager` is never shared across threads.

use std::collections::VecDeque;

use crate::engine::commands::{Command, CommandQueue};
use crate::engine::component::{BundleEntry, Component, ComponentKey, IntoBundle};
use crate::engine::entity::Entity;
use crate::engine::error::ECSResult;
use crate::engine::storage::Storage;


/// Read-only, defer-capable view of storage used during a tick.
#[derive(Clone, Copy)]
pub struct RuntimeManager<'a> {
    storage: &'a Storage,
    queue: &'a CommandQueue,
}

impl<'a> RuntimeManager<'a> {
    pub(crate) fn new(storage: &'a Storage, queue: &'a CommandQueue) -> Self {
        Self { storage, queue }
    }

    /// Number of rows in storage, removed-but-not-compacted ones included.
    pub fn get_entity_count(&self) -> usize {
        self.storage.get_size()
    }

    /// Number of live entities.
    pub fn active_entity_count(&self) -> usize {
        self.storage.active_count()
    }

    /// Returns `true` if `entity` is live.
    pub fn is_active(&self, entity: Entity) -> bool {
        self.storage.is_active(entity)
    }

    /// Returns `true` if `entity` is live and owns a `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.storage.has_component::<T>(entity)
    }

    /// Queues `command` for the end of the tick.
    pub fn defer(&self, command: Command) {
        self.queue.push(command);
    }

    /// Queues a closure to run against the deferred manager at the end of the tick.
    pub fn defer_fn<F>(&self, f: F)
    where
        F: FnOnce(&mut DeferredManager<'_>) -> ECSResult<()> + Send + 'static,
    {
        self.defer(Command::custom(f));
    }

    /// Queues creation of an entity owning `components`.
    pub fn new_entity<B: IntoBundle>(&self, components: B) {
        self.defer(Command::spawn(components));
    }

    /// Queues removal of `entity`.
    pub fn remove_entity(&self, entity: Entity) {
        self.defer(Command::despawn(entity));
    }

    /// Queues attaching `value` to `entity`.
    pub fn attach_component<T: Component>(&self, entity: Entity, value: T) {
        self.defer(Command::attach(entity, value));
    }

    /// Queues detaching `T` from `entity`.
    pub fn detach_component<T: Component>(&self, entity: Entity) {
        self.defer(Command::detach::<T>(entity));
    }
}

/// Privileged handle with exclusive access to storage.
///
/// Everything a [`RuntimeManager`] offers, applied immediately, plus checked
/// component access.
pub struct DeferredManager<'a> {
    storage: &'a mut Storage,
    follow_up: &'a mut VecDeque<Command>,
}

impl<'a> DeferredManager<'a> {
    pub(crate) fn new(storage: &'a mut Storage, follow_up: &'a mut VecDeque<Command>) -> Self {
        Self { storage, follow_up }
    }

    /// Number of rows in storage, removed-but-not-compacted ones included.
    pub fn get_entity_count(&self) -> usize {
        self.storage.get_size()
    }

    /// Number of live entities.
    pub fn active_entity_count(&self) -> usize {
        self.storage.active_count()
    }

    /// Returns `true` if `entity` is live.
    pub fn is_active(&self, entity: Entity) -> bool {
        self.storage.is_active(entity)
    }

    /// Returns `true` if `entity` is live and owns a `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.storage.has_component::<T>(entity)
    }

    /// Queues `command` to run after the commands already pending in this drain.
    pub fn defer(&mut self, command: Command) {
        self.follow_up.push_back(command);
    }

    /// Creates an entity owning `components` immediately.
    pub fn new_entity<B: IntoBundle>(&mut self, components: B) -> ECSResult<Entity> {
        self.storage.new_entity(components)
    }

    /// Removes `entity` immediately.
    ///
    /// ## Errors
    /// [`AccessError::Stale`](crate::engine::error::AccessError::Stale) if the
    /// entity is out of range or already removed.
    pub fn remove_entity(&mut self, entity: Entity) -> ECSResult<()> {
        self.storage.try_remove_entity(entity)
    }

    /// Attaches `value` to `entity` immediately.
    pub fn attach_component<T: Component>(&mut self, entity: Entity, value: T) -> ECSResult<()> {
        self.storage.attach_component(entity, value)
    }

    /// Detaches `T` from `entity` immediately.
    pub fn detach_component<T: Component>(&mut self, entity: Entity) -> ECSResult<()> {
        self.storage.detach_component::<T>(entity)
    }

    /// Checked shared access to `entity`'s `T`.
    pub fn get_component<T: Component>(&self, entity: Entity) -> ECSResult<&T> {
        self.storage.try_get_component::<T>(entity)
    }

    /// Checked exclusive access to `entity`'s `T`.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> ECSResult<&mut T> {
        self.storage.try_get_component_mut::<T>(entity)
    }

    /// Read-only view of the whole storage.
    pub fn storage(&self) -> &Storage {
        self.storage
    }

    pub(crate) fn attach_entry(&mut self, entity: Entity, entry: BundleEntry) -> ECSResult<()> {
        self.storage.attach_entry(entity, entry)
    }

    pub(crate) fn detach_key(&mut self, entity: Entity, key: &ComponentKey) -> ECSResult<()> {
        self.storage.detach_key(entity, key)
    }
}

/// Applies `commands` in FIFO order, including any they defer in turn.
///
/// Failures are logged and counted; the drain always runs to the end.
/// Returns `(applied, failed)`.
pub(crate) fn drain_commands(storage: &mut Storage, mut pending: VecDeque<Command>) -> (usize, usize) {
    let mut applied = 0usize;
    let mut failed = 0usize;

    while let Some(command) = pending.pop_front() {
        let kind = command.kind();
        let mut manager = DeferredManager::new(storage, &mut pending);
        match command.apply(&mut manager) {
            Ok(()) => applied += 1,
            Err(error) => {
                failed += 1;
                tracing::warn!(command = kind, %error, "deferred command failed");
            }
        }
    }

    (applied, failed)
}
