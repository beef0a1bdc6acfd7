//! # Component Registry
//!
//! This module assigns compact `ComponentID` values to Rust component types and
//! carries the type-erased column factories storage needs to grow a new column.
//!
//! ## Purpose
//! The registry decouples component type information (`TypeId`, name, size,
//! alignment) from runtime storage, so that [`Storage`](crate::engine::storage::Storage)
//! can hold heterogeneous columns behind `TypeErasedColumn` and look them up
//! by a small integer instead of by type.
//!
//! ## Design
//! - Each storage owns its own registry; there is no process-global state.
//! - Components are registered once and assigned a compact `ComponentID` in
//!   `[0, COMPONENT_CAP)`, in registration order.
//! - A [`ComponentKey`] bundles a type's identity with its column factory, so
//!   bundles, descriptors and commands can register on demand.
//! - The registry is `freeze()`d when a scheduler is built; after that the
//!   component universe is fixed.
//!
//! ## Invariants
//! - `ComponentID` values are unique and stable for the lifetime of the storage.
//! - `by_id[id].component_id == id` for every registered id.
//! - When frozen, registration is disallowed.

use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    mem::{size_of, align_of},
};

use crate::engine::error::RegistryError;
use crate::engine::storage::{Column, TypeErasedColumn};
use crate::engine::types::{ComponentID, COMPONENT_CAP};


/// Marker for types storable as components.
///
/// Implemented for every `'static + Send + Sync` type.
pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

/// Factory function for constructing an empty type-erased component column.
pub(crate) type ColumnFactory = fn() -> Box<dyn TypeErasedColumn>;

fn new_column<T: Component>() -> Box<dyn TypeErasedColumn> {
    Box::new(Column::<T>::default())
}

/// Type identity of a component plus the factory for its column.
///
/// Keys compare and hash by `TypeId` only.

#[derive(Copy, Clone)]
pub struct ComponentKey {
    type_id: TypeId,
    name: &'static str,
    size: usize,
    align: usize,
    factory: ColumnFactory,
}

impl ComponentKey {
    /// Key for component type `T`.
    #[inline]
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            factory: new_column::<T>,
        }
    }

    /// Runtime `TypeId` of the component.
    #[inline]
    pub fn type_id(&self) -> TypeId { self.type_id }

    /// Rust type name of the component.
    #[inline]
    pub fn name(&self) -> &'static str { self.name }

    #[inline]
    pub(crate) fn make_column(&self) -> Box<dyn TypeErasedColumn> {
        (self.factory)()
    }
}

impl PartialEq for ComponentKey {
    fn eq(&self, other: &Self) -> bool { self.type_id == other.type_id }
}

impl Eq for ComponentKey {}

impl Hash for ComponentKey {
    fn hash<H: Hasher>(&self, state: &mut H) { self.type_id.hash(state); }
}

impl fmt::Debug for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentKey").field(&self.name).finish()
    }
}

/// Describes a registered component type.
///
/// ## Fields
/// - `component_id`: The runtime identifier assigned by the registry.
/// - `name`: The Rust type name (`type_name::<T>()`).
/// - `type_id`: The runtime `TypeId` for the component.
/// - `size`: `size_of::<T>()` in bytes.
/// - `align`: `align_of::<T>()` in bytes.

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentDesc {
    /// Runtime identifier assigned to this component type.
    pub component_id: ComponentID,

    /// Rust type name for diagnostics.
    pub name: &'static str,

    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,

    /// Size of the component type in bytes.
    pub size: usize,

    /// Alignment of the component type in bytes.
    pub align: usize
}

impl ComponentDesc {
    /// Builds the descriptor for `key` under `component_id`.
    #[inline]
    pub fn from_key(key: &ComponentKey, component_id: ComponentID) -> Self {
        Self {
            component_id,
            name: key.name,
            type_id: key.type_id,
            size: key.size,
            align: key.align,
        }
    }

    /// Returns `true` if this descriptor refers to type `T`.
    #[inline]
    pub fn matches_type<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for ComponentDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ComponentDesc {{ id: {}, name: {}, size: {}, align: {} }}",
            self.component_id, self.name, self.size, self.align
        )
    }
}

/// Mapping between Rust component types and compact `ComponentID` values.
///
/// ## Design
/// - `by_type` maps `TypeId -> ComponentID`.
/// - `by_id` stores `ComponentDesc` indexed by `ComponentID`.
/// - `frozen` prevents further registration once a scheduler owns the storage.

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentID>,
    by_id: Vec<ComponentDesc>,
    frozen: bool,
}

impl ComponentRegistry {
    /// Creates an empty, unfrozen registry.
    pub fn new() -> Self { Self::default() }

    /// Registers the component described by `key`.
    ///
    /// Returns the id and whether it was newly assigned. Registering a known
    /// type returns its existing id, even when frozen.
    ///
    /// ## Errors
    /// - [`RegistryError::Frozen`] for a new type after [`freeze`](Self::freeze).
    /// - [`RegistryError::Capacity`] once `COMPONENT_CAP` ids are in use.

    pub fn register_key(&mut self, key: &ComponentKey) -> Result<(ComponentID, bool), RegistryError> {
        if let Some(&existing) = self.by_type.get(&key.type_id) {
            return Ok((existing, false));
        }
        if self.frozen {
            return Err(RegistryError::Frozen { component: key.name });
        }
        if self.by_id.len() >= COMPONENT_CAP {
            return Err(RegistryError::Capacity { component: key.name, capacity: COMPONENT_CAP });
        }

        let id = self.by_id.len() as ComponentID;
        self.by_type.insert(key.type_id, id);
        self.by_id.push(ComponentDesc::from_key(key, id));
        Ok((id, true))
    }

    /// Freezes the registry, preventing further component registrations.
    pub fn freeze(&mut self) { self.frozen = true; }

    /// Returns `true` if the registry has been frozen.
    pub fn is_frozen(&self) -> bool { self.frozen }

    /// Number of registered components.
    pub fn len(&self) -> usize { self.by_id.len() }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool { self.by_id.is_empty() }

    /// Returns the `ComponentID` associated with a `TypeId`, if registered.
    pub fn component_id_of_type_id(&self, type_id: TypeId) -> Option<ComponentID> {
        self.by_type.get(&type_id).copied()
    }

    /// Returns the `ComponentID` for `T`, if registered.
    pub fn id_of<T: 'static>(&self) -> Option<ComponentID> {
        self.component_id_of_type_id(TypeId::of::<T>())
    }

    /// Returns the component descriptor for a `ComponentID`, if registered.
    pub fn description_by_component_id(&self, component_id: ComponentID) -> Option<&ComponentDesc> {
        self.by_id.get(component_id as usize)
    }

    /// All registered descriptors in id order.
    pub fn descriptions(&self) -> impl Iterator<Item = &ComponentDesc> + '_ {
        self.by_id.iter()
    }
}

/// One type-erased component value waiting to be written into a column.
pub struct BundleEntry {
    pub(crate) key: ComponentKey,
    pub(crate) value: Box<dyn Any + Send>,
}

impl BundleEntry {
    /// Wraps a component value.
    pub fn new<T: Component>(value: T) -> Self {
        Self { key: ComponentKey::of::<T>(), value: Box::new(value) }
    }

    /// Key of the wrapped component.
    pub fn key(&self) -> &ComponentKey { &self.key }
}

impl fmt::Debug for BundleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleEntry").field("component", &self.key.name).finish_non_exhaustive()
    }
}

/// Type-erased set of component values for one entity.
///
/// Inserting a type that is already present replaces the earlier value.
#[derive(Debug, Default)]
pub struct Bundle {
    entries: Vec<BundleEntry>,
}

impl Bundle {
    /// Creates an empty bundle.
    #[inline]
    pub fn new() -> Self { Self::default() }

    /// Inserts a component value into the bundle.
    pub fn insert<T: Component>(&mut self, value: T) {
        self.insert_entry(BundleEntry::new(value));
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<T: Component>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    pub(crate) fn insert_entry(&mut self, entry: BundleEntry) {
        match self.entries.iter_mut().find(|existing| existing.key == entry.key) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Returns `true` if a value of type `T` is present.
    pub fn contains<T: Component>(&self) -> bool {
        let key = ComponentKey::of::<T>();
        self.entries.iter().any(|entry| entry.key == key)
    }

    /// Number of component values.
    #[inline]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Returns `true` if the bundle holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Keys of the contained components, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &ComponentKey> + '_ {
        self.entries.iter().map(|entry| &entry.key)
    }

    pub(crate) fn into_entries(self) -> Vec<BundleEntry> { self.entries }
}

/// Conversion into a [`Bundle`].
///
/// Implemented for `Bundle` itself and for tuples of up to eight components,
/// so that `storage.new_entity((Position { x: 0.0 }, Velocity { v: 5.0 }))`
/// reads naturally.
pub trait IntoBundle {
    /// Performs the conversion.
    fn into_bundle(self) -> Bundle;
}

impl IntoBundle for Bundle {
    #[inline]
    fn into_bundle(self) -> Bundle { self }
}

macro_rules! impl_into_bundle {
    ($($name:ident),*) => {
        impl<$($name: Component),*> IntoBundle for ($($name,)*) {
            #[allow(non_snake_case, unused_mut)]
            fn into_bundle(self) -> Bundle {
                let ($($name,)*) = self;
                let mut bundle = Bundle::new();
                $(bundle.insert($name);)*
                bundle
            }
        }
    };
}

impl_into_bundle!();
impl_into_bundle!(A);
impl_into_bundle!(A, B);
impl_into_bundle!(A, B, C);
impl_into_bundle!(A, B, C, D);
impl_into_bundle!(A, B, C, D, E);
impl_into_bundle!(A, B, C, D, E, F);
impl_into_bundle!(A, B, C, D, E, F, G);
impl_into_bundle!(A, B, C, D, E, F, G, H);
