//! System descriptors: explicit declaration of what a system touches.
//!
//! Each system states up front which components it reads and writes, which
//! other systems it references, and which per-invocation inputs it wants.
//! [`SystemDescriptor`] is the builder users write; [`ResolvedDescriptor`] is
//! the immutable, id-based form the scheduler works from after
//! [`resolve_descriptors`] has validated the whole set.
//!
//! ## Resolution rules
//! - Writes imply the component is required; a component both read and
//!   written is treated as written.
//! - Components unknown to an unfrozen storage are registered; unknown to a
//!   frozen one they are a [`ConfigError::UnknownComponent`].
//! - Referenced systems must be registered, may not be the system itself,
//!   and each system type and name may appear only once.

use std::any::{type_name, TypeId};
use std::collections::HashMap;

use crate::engine::component::{Component, ComponentKey};
use crate::engine::error::{ConfigError, ECSError, ECSResult, RegistryError};
use crate::engine::graph::reference_order;
use crate::engine::storage::Storage;
use crate::engine::systems::System;
use crate::engine::types::{AccessSets, ComponentID, Signature, SystemID, SYSTEM_CAP};


/// Reference from one system to another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemRef {
    /// By concrete system type.
    Type {
        /// `TypeId` of the system type.
        type_id: TypeId,
        /// Type name, for diagnostics.
        name: &'static str,
    },
    /// By registered descriptor name.
    Named(&'static str),
}

impl SystemRef {
    /// Reference to system type `S`.
    pub fn of<S: System>() -> Self {
        SystemRef::Type { type_id: TypeId::of::<S>(), name: type_name::<S>() }
    }

    /// Human-readable form.
    pub fn label(&self) -> &'static str {
        match self {
            SystemRef::Type { name, .. } | SystemRef::Named(name) => *name,
        }
    }
}

/// Declared inputs and flags of one system.
///
/// ## Example
/// ```ignore
/// SystemDescriptor::new("move")
///     .reads::<Velocity>()
///     .writes::<Position>()
///     .takes_delta_time()
///     .parallel_safe()
/// ```
#[derive(Clone, Debug)]
pub struct SystemDescriptor {
    name: &'static str,
    reads: Vec<ComponentKey>,
    writes: Vec<ComponentKey>,
    required_systems: Vec<SystemRef>,
    takes_entity: bool,
    takes_delta_time: bool,
    returns_deferred: bool,
    parallel_safe: bool,
}

impl SystemDescriptor {
    /// Empty descriptor named `name`. Names must be unique per scheduler.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            reads: Vec::new(),
            writes: Vec::new(),
            required_systems: Vec::new(),
            takes_entity: false,
            takes_delta_time: false,
            returns_deferred: false,
            parallel_safe: false,
        }
    }

    /// Requires `T` and declares read access to it.
    pub fn reads<T: Component>(mut self) -> Self {
        push_unique(&mut self.reads, ComponentKey::of::<T>());
        self
    }

    /// Requires `T` and declares write access to it.
    pub fn writes<T: Component>(mut self) -> Self {
        push_unique(&mut self.writes, ComponentKey::of::<T>());
        self
    }

    /// References system type `S`; `S` runs first.
    pub fn requires_system<S: System>(mut self) -> Self {
        let reference = SystemRef::of::<S>();
        if !self.required_systems.contains(&reference) {
            self.required_systems.push(reference);
        }
        self
    }

    /// References the system registered under `name`; it runs first.
    pub fn requires_system_named(mut self, name: &'static str) -> Self {
        let reference = SystemRef::Named(name);
        if !self.required_systems.contains(&reference) {
            self.required_systems.push(reference);
        }
        self
    }

    /// The system reads its entity handle.
    pub fn takes_entity(mut self) -> Self {
        self.takes_entity = true;
        self
    }

    /// The system reads the tick's delta time.
    pub fn takes_delta_time(mut self) -> Self {
        self.takes_delta_time = true;
        self
    }

    /// The system may return a deferred command.
    pub fn returns_deferred(mut self) -> Self {
        self.returns_deferred = true;
        self
    }

    /// The system mutates neither itself nor any system it references, so its
    /// entities may be processed in parallel.
    pub fn parallel_safe(mut self) -> Self {
        self.parallel_safe = true;
        self
    }

    /// Descriptor name.
    pub fn name(&self) -> &'static str { self.name }

    /// Declared reads.
    pub fn read_keys(&self) -> &[ComponentKey] { &self.reads }

    /// Declared writes.
    pub fn write_keys(&self) -> &[ComponentKey] { &self.writes }

    /// Declared system references.
    pub fn required_systems(&self) -> &[SystemRef] { &self.required_systems }
}

fn push_unique(keys: &mut Vec<ComponentKey>, key: ComponentKey) {
    if !keys.contains(&key) {
        keys.push(key);
    }
}

/// Validated, id-based descriptor. Immutable for the scheduler's lifetime.
#[derive(Clone, Debug)]
pub struct ResolvedDescriptor {
    /// Registration position.
    pub system_id: SystemID,
    /// Descriptor name.
    pub name: &'static str,
    /// Components every matching entity must own.
    pub required: Signature,
    /// Read and write sets; disjoint.
    pub access: AccessSets,
    /// Systems that must run before this one, ascending.
    pub required_systems: Vec<SystemID>,
    /// See [`SystemDescriptor::takes_entity`].
    pub takes_entity: bool,
    /// See [`SystemDescriptor::takes_delta_time`].
    pub takes_delta_time: bool,
    /// See [`SystemDescriptor::returns_deferred`].
    pub returns_deferred: bool,
    /// See [`SystemDescriptor::parallel_safe`].
    pub parallel_safe: bool,
    pub(crate) components: Vec<(TypeId, ComponentID)>,
}

impl ResolvedDescriptor {
    /// Id of declared component type `type_id`.
    #[inline]
    pub(crate) fn component_id(&self, type_id: TypeId) -> Option<ComponentID> {
        self.components
            .iter()
            .find(|(declared, _)| *declared == type_id)
            .map(|&(_, component_id)| component_id)
    }
}

/// Validates `descriptors` (paired with their system's `TypeId`) against
/// `storage` and assigns system ids in order.
///
/// ## Errors
/// Any [`ConfigError`]; registry exhaustion surfaces as [`RegistryError`].
pub(crate) fn resolve_descriptors(
    descriptors: &[(TypeId, SystemDescriptor)],
    storage: &mut Storage,
) -> ECSResult<Vec<ResolvedDescriptor>> {
    if descriptors.len() > SYSTEM_CAP {
        return Err(ConfigError::TooManySystems(descriptors.len()).into());
    }

    let mut by_type: HashMap<TypeId, SystemID> = HashMap::new();
    let mut by_name: HashMap<&'static str, SystemID> = HashMap::new();
    for (index, (type_id, descriptor)) in descriptors.iter().enumerate() {
        let system_id = index as SystemID;
        if by_name.insert(descriptor.name, system_id).is_some() {
            return Err(ConfigError::DuplicateSystem(descriptor.name).into());
        }
        // Typed references resolve to the first system of that type.
        by_type.entry(*type_id).or_insert(system_id);
    }

    let mut resolved = Vec::with_capacity(descriptors.len());
    for (index, (_, descriptor)) in descriptors.iter().enumerate() {
        let system_id = index as SystemID;
        let mut access = AccessSets::default();
        let mut components = Vec::new();

        for (keys, write) in [(&descriptor.reads, false), (&descriptor.writes, true)] {
            for key in keys {
                let component_id = register_for(storage, descriptor.name, key)?;
                if write {
                    access.write.set(component_id);
                } else {
                    access.read.set(component_id);
                }
                if !components.iter().any(|&(type_id, _)| type_id == key.type_id()) {
                    components.push((key.type_id(), component_id));
                }
            }
        }
        access.read = access.read.difference(&access.write);

        let mut required_systems = Vec::with_capacity(descriptor.required_systems.len());
        for reference in &descriptor.required_systems {
            let found = match reference {
                SystemRef::Type { type_id, .. } => by_type.get(type_id),
                SystemRef::Named(name) => by_name.get(name),
            };
            let dependency = *found.ok_or(ConfigError::UnknownSystem {
                system: descriptor.name,
                dependency: reference.label(),
            })?;
            if dependency == system_id {
                return Err(ConfigError::SelfDependency(descriptor.name).into());
            }
            required_systems.push(dependency);
        }
        required_systems.sort_unstable();
        required_systems.dedup();

        resolved.push(ResolvedDescriptor {
            system_id,
            name: descriptor.name,
            required: access.all(),
            access,
            required_systems,
            takes_entity: descriptor.takes_entity,
            takes_delta_time: descriptor.takes_delta_time,
            returns_deferred: descriptor.returns_deferred,
            parallel_safe: descriptor.parallel_safe,
            components,
        });
    }

    reference_order(&resolved)?;
    Ok(resolved)
}

fn register_for(storage: &mut Storage, system: &'static str, key: &ComponentKey) -> ECSResult<ComponentID> {
    match storage.register_key(key) {
        Err(ECSError::Registry(RegistryError::Frozen { component })) => {
            Err(ConfigError::UnknownComponent { system, component }.into())
        }
        other => other,
    }
}
