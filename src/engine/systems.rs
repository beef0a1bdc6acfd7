//! ECS System Abstractions
//!
//! This module defines the *system execution model* used by the schedulers.
//!
//! A **system** is a unit of per-tick logic. Systems:
//! - declare what they touch through a [`SystemDescriptor`],
//! - are invoked once per matching entity (or once per tick when they require
//!   no components),
//! - operate through a [`SystemContext`] rather than direct storage access,
//! - may return one deferred [`Command`] per invocation.
//!
//! ## System Trait
//!
//! [`System::update`] takes `&self`: a system may be invoked for many entities
//! concurrently when it is `parallel_safe`, and other systems may hold a
//! reference to it through [`SystemContext::system`]. State a system keeps
//! across invocations therefore uses interior mutability (atomics, locks).
//!
//! ## Function-backed Systems
//!
//! [`FnSystem`] wraps a closure and a descriptor, which avoids a dedicated
//! type for simple logic while remaining fully schedulable.
//!
//! ## Thread Safety
//!
//! All systems are `Send + Sync`. [`SystemContext`] only hands out component
//! references the descriptor declared, and mutable ones only for declared
//! writes; the scheduler guarantees no other system holds conflicting access
//! to the same column while it runs.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use crate::engine::commands::Command;
use crate::engine::component::Component;
use crate::engine::descriptor::{ResolvedDescriptor, SystemDescriptor};
use crate::engine::entity::Entity;
use crate::engine::manager::RuntimeManager;
use crate::engine::storage::Storage;
use crate::engine::types::{SystemID, Tick};


/// Upcast to `&dyn Any`, used to downcast trait objects to system types.
pub trait AsAny: Any {
    /// `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any { self }
}

/// A unit of executable logic.
///
/// Systems must be `Send + Sync` so they can be scheduled and executed
/// in parallel across threads.

pub trait System: AsAny + Send + Sync {
    /// Declared components, references and flags. Called once, at scheduler
    /// construction.
    fn descriptor(&self) -> SystemDescriptor;

    /// Runs the system for one entity (or once, for systems with no required
    /// components). A returned command is applied after the tick.
    fn update(&self, ctx: &mut SystemContext<'_>) -> Option<Command>;
}

/// A concrete [`System`] backed by a function or closure.
///
/// ## Example
/// ```ignore
/// let gravity = FnSystem::new(
///     SystemDescriptor::new("gravity").writes::<Velocity>().takes_delta_time(),
///     |ctx| {
///         let dt = ctx.delta_time();
///         ctx.get_mut::<Velocity>().v -= 9.81 * dt;
///         None
///     },
/// );
/// ```

pub struct FnSystem<F>
where
    F: Fn(&mut SystemContext<'_>) -> Option<Command> + Send + Sync + 'static,
{
    descriptor: SystemDescriptor,
    f: F,
}

impl<F> FnSystem<F>
where
    F: Fn(&mut SystemContext<'_>) -> Option<Command> + Send + Sync + 'static,
{
    /// Creates a new function-backed system.
    ///
    /// ## Parameters
    /// - `descriptor`: Declared inputs; its name identifies the system.
    /// - `f`: The function or closure executed per invocation.
    pub fn new(descriptor: SystemDescriptor, f: F) -> Self {
        Self { descriptor, f }
    }

    /// Returns the human-readable name of this system.
    pub fn name(&self) -> &'static str {
        self.descriptor.name()
    }
}

impl<F> System for FnSystem<F>
where
    F: Fn(&mut SystemContext<'_>) -> Option<Command> + Send + Sync + 'static,
{
    fn descriptor(&self) -> SystemDescriptor {
        self.descriptor.clone()
    }

    fn update(&self, ctx: &mut SystemContext<'_>) -> Option<Command> {
        (self.f)(ctx)
    }
}

/// Registered systems, indexed by [`SystemID`].
pub struct SystemTable {
    systems: Vec<Box<dyn System>>,
    by_type: HashMap<TypeId, SystemID>,
}

impl SystemTable {
    pub(crate) fn new(systems: Vec<Box<dyn System>>) -> Self {
        let mut by_type = HashMap::new();
        for (index, system) in systems.iter().enumerate() {
            by_type.entry(system_type_id(system.as_ref())).or_insert(index as SystemID);
        }
        Self { systems, by_type }
    }

    /// Number of systems.
    pub fn len(&self) -> usize { self.systems.len() }

    /// Returns `true` if no system is registered.
    pub fn is_empty(&self) -> bool { self.systems.is_empty() }

    /// Id of the first system of type `S`.
    pub fn id_of<S: System>(&self) -> Option<SystemID> {
        self.by_type.get(&TypeId::of::<S>()).copied()
    }

    /// The system registered as `S`.
    pub fn get<S: System>(&self) -> Option<&S> {
        let system_id = self.id_of::<S>()?;
        <dyn System as AsAny>::as_any(self.systems[system_id as usize].as_ref()).downcast_ref::<S>()
    }

    #[inline]
    pub(crate) fn by_id(&self, system_id: SystemID) -> &dyn System {
        self.systems[system_id as usize].as_ref()
    }
}

/// `TypeId` of the concrete type behind `system`.
pub(crate) fn system_type_id(system: &dyn System) -> TypeId {
    <dyn System as AsAny>::as_any(system).type_id()
}

/// Everything one system invocation may see.
///
/// Built by the scheduler per matching entity. Component accessors check the
/// descriptor and panic on undeclared access; those are programming errors,
/// not runtime conditions.
pub struct SystemContext<'a> {
    storage: &'a Storage,
    systems: &'a SystemTable,
    descriptor: &'a ResolvedDescriptor,
    manager: RuntimeManager<'a>,
    entity: Entity,
    delta_time: f64,
    tick: Tick,
}

impl<'a> SystemContext<'a> {
    pub(crate) fn new(
        storage: &'a Storage,
        systems: &'a SystemTable,
        descriptor: &'a ResolvedDescriptor,
        manager: RuntimeManager<'a>,
        entity: Entity,
        delta_time: f64,
        tick: Tick,
    ) -> Self {
        Self { storage, systems, descriptor, manager, entity, delta_time, tick }
    }

    /// Name of the running system.
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Entity being processed; [`Entity::SENTINEL`] for systems requiring no
    /// components.
    pub fn entity(&self) -> Entity {
        debug_assert!(self.descriptor.takes_entity, "system `{}` did not declare takes_entity", self.descriptor.name);
        self.entity
    }

    /// Seconds elapsed since the previous tick.
    pub fn delta_time(&self) -> f64 {
        debug_assert!(self.descriptor.takes_delta_time, "system `{}` did not declare takes_delta_time", self.descriptor.name);
        self.delta_time
    }

    /// Number of the running tick, starting at 0.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Read-only, defer-capable manager.
    pub fn manager(&self) -> RuntimeManager<'a> {
        self.manager
    }

    /// The current entity's `T`. `T` must be declared read or write.
    pub fn get<T: Component>(&self) -> &T {
        let slot = self.slot::<T>(false);
        // SAFETY: the entity owns `T` (row filtered by signature); no other
        // running system writes this column (graph order and borrow guard);
        // this context is the only one for this row in this system.
        match unsafe { (*slot).as_ref() } {
            Some(value) => value,
            None => self.vacant::<T>(),
        }
    }

    /// The current entity's `T`, mutably. `T` must be a declared write.
    pub fn get_mut<T: Component>(&mut self) -> &mut T {
        let slot = self.slot::<T>(true);
        // SAFETY: as in `get`, and `&mut self` rules out any other reference
        // handed out by this context.
        match unsafe { (*slot).as_mut() } {
            Some(value) => value,
            None => self.vacant::<T>(),
        }
    }

    /// Two distinct declared writes of the current entity at once.
    ///
    /// ## Panics
    /// If `A` and `B` are the same type, or either is not a declared write.
    pub fn get2_mut<A: Component, B: Component>(&mut self) -> (&mut A, &mut B) {
        assert_ne!(TypeId::of::<A>(), TypeId::of::<B>(), "get2_mut requires two distinct component types");
        let a = self.slot::<A>(true);
        let b = self.slot::<B>(true);
        // SAFETY: distinct types live in distinct columns, so the two slots
        // never alias; otherwise as in `get_mut`.
        match unsafe { ((*a).as_mut(), (*b).as_mut()) } {
            (Some(a), Some(b)) => (a, b),
            (None, _) => self.vacant::<A>(),
            (_, None) => self.vacant::<B>(),
        }
    }

    /// Another registered system. It must be declared with
    /// [`SystemDescriptor::requires_system`] or
    /// [`SystemDescriptor::requires_system_named`].
    pub fn system<S: System>(&self) -> &'a S {
        let systems = self.systems;
        let Some(system_id) = systems.id_of::<S>() else {
            panic!("system `{}` is not registered", type_name::<S>());
        };
        assert!(
            self.descriptor.required_systems.binary_search(&system_id).is_ok(),
            "system `{}` did not declare a dependency on `{}`",
            self.descriptor.name,
            type_name::<S>()
        );
        match <dyn System as AsAny>::as_any(systems.by_id(system_id)).downcast_ref::<S>() {
            Some(system) => system,
            None => panic!("system `{}` is not registered", type_name::<S>()),
        }
    }

    fn slot<T: Component>(&self, write: bool) -> *mut Option<T> {
        let Some(component_id) = self.descriptor.component_id(TypeId::of::<T>()) else {
            panic!("system `{}` did not declare component `{}`", self.descriptor.name, type_name::<T>());
        };
        if write && !self.descriptor.access.write.has(component_id) {
            panic!("system `{}` declared `{}` read-only", self.descriptor.name, type_name::<T>());
        }
        if self.entity.is_sentinel() {
            panic!("system `{}` has no entity to read `{}` from", self.descriptor.name, type_name::<T>());
        }
        match self.storage.slot_ptr::<T>(component_id, self.entity.index()) {
            Some(slot) => slot,
            None => panic!("{} has no row for `{}`", self.entity, type_name::<T>()),
        }
    }

    fn vacant<T>(&self) -> ! {
        panic!("{} does not own `{}` (system `{}`)", self.entity, type_name::<T>(), self.descriptor.name)
    }
}
