//! # Commands
//!
//! This module defines deferred commands used to mutate storage structure.
//!
//! ## Purpose
//! Commands provide an explicit, ordered representation of structural
//! mutations: entity creation and removal, and component attach and detach.
//!
//! Rather than mutating storage while systems iterate it, systems return or
//! queue `Command` values that are applied after every system of the tick has
//! finished. Iteration state can therefore never be invalidated mid-tick.
//!
//! ## Design
//! - Commands are plain data describing *what* change should occur, not *how*.
//! - [`Command::Custom`] carries a closure for anything the tagged variants do
//!   not cover; it runs with the same privileged manager.
//! - During a tick, commands are funnelled into one [`CommandQueue`] guarded by
//!   a `parking_lot::Mutex`, the only lock on the tick path.
//!
//! ## Invariants
//! - Commands are applied in the order they were queued (FIFO).
//! - Commands queued while draining run later in the same drain.

use std::fmt;

use parking_lot::Mutex;

use crate::engine::component::{Bundle, BundleEntry, Component, ComponentKey, IntoBundle};
use crate::engine::entity::Entity;
use crate::engine::error::ECSResult;
use crate::engine::manager::DeferredManager;


/// Closure applied against the privileged manager after a tick.
pub type DeferredFn = Box<dyn FnOnce(&mut DeferredManager<'_>) -> ECSResult<()> + Send>;

/// Represents a deferred structural mutation.
///
/// ## Design
/// Commands are produced by systems (as their return value or through the
/// runtime manager) and consumed by the scheduler's drain step.

pub enum Command {
    /// Creates a new entity.
    Spawn {
        /// Data bundle for the new entity.
        bundle: Bundle
    },

    /// Removes an existing entity.
    Despawn {
        /// Entity to be removed.
        entity: Entity
    },

    /// Gives an entity a component, replacing any existing value.
    Attach {
        /// Target entity receiving the component.
        entity: Entity,
        /// Component value to write.
        component: BundleEntry,
    },

    /// Takes a component away from an entity.
    Detach {
        /// Target entity losing the component.
        entity: Entity,
        /// Type of the component to remove.
        component: ComponentKey,
    },

    /// Arbitrary work against the deferred manager.
    Custom(DeferredFn),
}

impl Command {
    /// Spawn command for `components`.
    pub fn spawn<B: IntoBundle>(components: B) -> Self {
        Command::Spawn { bundle: components.into_bundle() }
    }

    /// Despawn command for `entity`.
    pub fn despawn(entity: Entity) -> Self {
        Command::Despawn { entity }
    }

    /// Attach command writing `value` to `entity`.
    pub fn attach<T: Component>(entity: Entity, value: T) -> Self {
        Command::Attach { entity, component: BundleEntry::new(value) }
    }

    /// Detach command removing `T` from `entity`.
    pub fn detach<T: Component>(entity: Entity) -> Self {
        Command::Detach { entity, component: ComponentKey::of::<T>() }
    }

    /// Command running `f` with the deferred manager.
    pub fn custom<F>(f: F) -> Self
    where
        F: FnOnce(&mut DeferredManager<'_>) -> ECSResult<()> + Send + 'static,
    {
        Command::Custom(Box::new(f))
    }

    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Spawn { .. } => "spawn",
            Command::Despawn { .. } => "despawn",
            Command::Attach { .. } => "attach",
            Command::Detach { .. } => "detach",
            Command::Custom(_) => "custom",
        }
    }

    /// Applies the command.
    pub fn apply(self, manager: &mut DeferredManager<'_>) -> ECSResult<()> {
        match self {
            Command::Spawn { bundle } => manager.new_entity(bundle).map(|_| ()),
            Command::Despawn { entity } => manager.remove_entity(entity),
            Command::Attach { entity, component } => manager.attach_entry(entity, component),
            Command::Detach { entity, component } => manager.detach_key(entity, &component),
            Command::Custom(f) => f(manager),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Spawn { bundle } => f.debug_struct("Spawn").field("bundle", bundle).finish(),
            Command::Despawn { entity } => f.debug_struct("Despawn").field("entity", entity).finish(),
            Command::Attach { entity, component } => f
                .debug_struct("Attach")
                .field("entity", entity)
                .field("component", &component.key().name())
                .finish(),
            Command::Detach { entity, component } => f
                .debug_struct("Detach")
                .field("entity", entity)
                .field("component", &component.name())
                .finish(),
            Command::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Thread-safe FIFO of commands recorded during a tick.
#[derive(Default)]
pub struct CommandQueue {
    pending: Mutex<Vec<Command>>,
}

impl CommandQueue {
    /// Creates an empty queue.
    pub fn new() -> Self { Self::default() }

    /// Appends a command.
    #[inline]
    pub fn push(&self, command: Command) {
        self.pending.lock().push(command);
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize { self.pending.lock().len() }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool { self.pending.lock().is_empty() }

    /// Removes and returns every queued command, oldest first.
    pub fn take(&self) -> Vec<Command> {
        std::mem::take(&mut *self.pending.lock())
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue").field("pending", &self.len()).finish()
    }
}
