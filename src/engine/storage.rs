//! # Column Storage
//!
//! Dense, signature-indexed component storage with amortized compaction.
//!
//! ## Purpose
//! [`Storage`] owns one metadata array ([`EntityMetadata`]: signature bitset
//! plus active flag) and one type-erased [`Column`] per registered component.
//! All of them are indexed by the same dense row, the [`Entity`] handle.
//!
//! ## Design
//! - Creation pushes one metadata row and one slot in *every* column; slots of
//!   components the entity does not own stay vacant.
//! - Removal only clears `active` and bumps a fragmentation counter. Rows of
//!   other entities never move outside [`Storage::refresh`].
//! - [`Storage::refresh`] partitions live rows to the front with two
//!   converging cursors, swapping metadata and every column together, then
//!   truncates to the live count. Relative order of live rows is not kept.
//!
//! ## Invariants
//! - Every column has exactly `metadata.len()` slots outside a single grow or
//!   shrink step.
//! - A slot holds a value iff the row's signature bit for that column is set.
//! - Right after `refresh`, no inactive row precedes an active one. Scans also
//!   test `active`, so iteration never visits removed rows in between.
//!
//! ## Safety
//! Column slots are `UnsafeCell`s. Typed shared access goes through `&self`
//! and is only sound while no slot is written concurrently. The scheduler is
//! the only code writing through shared references, and it does so under a
//! [`BorrowGuard`](crate::engine::borrow::BorrowGuard) and on rows it owns for
//! the current system invocation.

use std::any::{Any, TypeId, type_name};
use std::cell::UnsafeCell;
use std::fmt;

use rayon::prelude::*;

use crate::engine::component::{BundleEntry, Component, ComponentKey, ComponentRegistry, IntoBundle};
use crate::engine::entity::{Entity, EntityMetadata};
use crate::engine::error::{AccessError, CapacityError, ECSResult, RegistryError, StaleEntityError, TypeMismatchError};
use crate::engine::query::{required_signature, ComponentSet};
use crate::engine::types::{build_signature, ComponentID, Signature, COMPONENT_CAP};


/// Minimum rows handed to one rayon task by the parallel scans.
const PARALLEL_MIN_ROWS: usize = 64;

/// Object-safe interface over a [`Column<T>`] of any element type.
///
/// Storage uses it for every row-structural operation so that metadata and
/// all columns move in lockstep regardless of their element types.
pub trait TypeErasedColumn: Any + Send + Sync {
    /// Returns an immutable `&dyn Any` reference to this column.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable `&dyn Any` reference to this column.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// `TypeId` of the element type.
    fn element_type_id(&self) -> TypeId;

    /// Human-readable name of the element type.
    fn element_type_name(&self) -> &'static str;

    /// Number of slots.
    fn len(&self) -> usize;

    /// Appends one vacant slot.
    fn push_vacant(&mut self);

    /// Grows with vacant slots until `len` slots exist.
    fn resize_vacant(&mut self, len: usize);

    /// Reserves room for `additional` more slots.
    fn reserve(&mut self, additional: usize);

    /// Swaps two slots.
    fn swap_rows(&mut self, a: usize, b: usize);

    /// Drops every slot at or beyond `len`.
    fn truncate(&mut self, len: usize);

    /// Moves a type-erased value into `row`, replacing any previous value.
    fn write_entry(&mut self, row: usize, entry: BundleEntry) -> Result<(), TypeMismatchError>;

    /// Drops the value in `row`, leaving it vacant.
    fn clear_row(&mut self, row: usize);
}

/// Dense column of one component type.
///
/// Slots are `Option<T>` so vacant rows (entities without the component) need
/// no placeholder value.
pub struct Column<T> {
    slots: Vec<UnsafeCell<Option<T>>>,
}

// SAFETY: shared access to slots is coordinated by the scheduler (see the
// module docs). Values only cross threads when `T: Send + Sync`.
unsafe impl<T: Send + Sync> Sync for Column<T> {}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Column<T> {
    /// Number of slots, vacant ones included.
    #[inline]
    pub fn len(&self) -> usize { self.slots.len() }

    /// Returns `true` if the column has no slots.
    #[inline]
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    /// Value in `row`, if present.
    #[inline]
    pub fn get(&self, row: usize) -> Option<&T> {
        let cell = self.slots.get(row)?;
        // SAFETY: no `&mut` to this slot exists while `&self` is observable
        // outside a system invocation.
        unsafe { (*cell.get()).as_ref() }
    }

    /// Mutable value in `row`, if present.
    #[inline]
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.slots.get_mut(row)?.get_mut().as_mut()
    }

    /// Raw pointer to the slot in `row`, for scheduler-coordinated access.
    #[inline]
    pub(crate) fn slot_ptr(&self, row: usize) -> Option<*mut Option<T>> {
        self.slots.get(row).map(UnsafeCell::get)
    }
}

impl<T: Component> TypeErasedColumn for Column<T> {
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn element_type_id(&self) -> TypeId { TypeId::of::<T>() }
    fn element_type_name(&self) -> &'static str { type_name::<T>() }

    fn len(&self) -> usize { self.slots.len() }

    fn push_vacant(&mut self) {
        self.slots.push(UnsafeCell::new(None));
    }

    fn resize_vacant(&mut self, len: usize) {
        self.slots.resize_with(len, || UnsafeCell::new(None));
    }

    fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        self.slots.swap(a, b);
    }

    fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    fn write_entry(&mut self, row: usize, entry: BundleEntry) -> Result<(), TypeMismatchError> {
        let actual = entry.key.name();
        let value = entry.value.downcast::<T>().map_err(|_| TypeMismatchError {
            expected: type_name::<T>(),
            actual,
        })?;
        if let Some(slot) = self.slots.get_mut(row) {
            *slot.get_mut() = Some(*value);
        }
        Ok(())
    }

    fn clear_row(&mut self, row: usize) {
        if let Some(slot) = self.slots.get_mut(row) {
            *slot.get_mut() = None;
        }
    }
}

/// Compacting, signature-indexed component store.
///
/// ## Example
/// ```ignore
/// let mut storage = Storage::new();
/// let e = storage.new_entity((Position { x: 0.0 }, Velocity { v: 5.0 }))?;
/// storage.get_component_mut::<Position>(e).x += 1.0;
/// storage.remove_entity(e);
/// assert_eq!(storage.refresh(), 0);
/// ```
#[derive(Default)]
pub struct Storage {
    registry: ComponentRegistry,
    metadata: Vec<EntityMetadata>,
    columns: Vec<Box<dyn TypeErasedColumn>>,
    active: usize,
    fragmentation: usize,
}

impl Storage {
    /// Creates empty storage.
    pub fn new() -> Self { Self::default() }

    /// Creates empty storage with room for `capacity` rows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { metadata: Vec::with_capacity(capacity), ..Self::default() }
    }

    // ── registration ────────────────────────────────────────────────────────

    /// Registers component type `T` and returns its id.
    ///
    /// Registering a known type returns the existing id. A new column is
    /// created with one vacant slot per existing row.
    ///
    /// ## Errors
    /// [`RegistryError`] if the registry is frozen or full.
    pub fn register<T: Component>(&mut self) -> ECSResult<ComponentID> {
        self.register_key(&ComponentKey::of::<T>())
    }

    pub(crate) fn register_key(&mut self, key: &ComponentKey) -> ECSResult<ComponentID> {
        let (component_id, newly_registered) = self.registry.register_key(key)?;
        if newly_registered {
            let mut column = key.make_column();
            column.resize_vacant(self.metadata.len());
            column.reserve(self.metadata.capacity().saturating_sub(self.metadata.len()));
            self.columns.push(column);
            debug_assert_eq!(self.columns.len(), self.registry.len());
        }
        Ok(component_id)
    }

    /// Registers every key or none of them.
    fn register_all(&mut self, keys: &[&ComponentKey]) -> ECSResult<Vec<ComponentID>> {
        let unknown: Vec<&ComponentKey> = keys
            .iter()
            .copied()
            .filter(|&key| self.registry.component_id_of_type_id(ComponentKey::type_id(key)).is_none())
            .collect();

        if let Some(first) = unknown.first() {
            if self.registry.is_frozen() {
                return Err(RegistryError::Frozen { component: first.name() }.into());
            }
            if self.registry.len() + unknown.len() > COMPONENT_CAP {
                return Err(RegistryError::Capacity { component: first.name(), capacity: COMPONENT_CAP }.into());
            }
        }

        keys.iter().map(|key| self.register_key(key)).collect()
    }

    /// Freezes the component universe. Called when a scheduler takes ownership.
    pub fn freeze(&mut self) { self.registry.freeze(); }

    /// Returns `true` once [`freeze`](Self::freeze) has been called.
    pub fn is_frozen(&self) -> bool { self.registry.is_frozen() }

    /// The component registry.
    pub fn registry(&self) -> &ComponentRegistry { &self.registry }

    /// Id of component `T`, if registered.
    pub fn component_id<T: Component>(&self) -> Option<ComponentID> {
        self.registry.id_of::<T>()
    }

    /// Typed view of the column holding `T`, if registered.
    pub fn column<T: Component>(&self) -> Option<&Column<T>> {
        let component_id = self.registry.id_of::<T>()?;
        self.columns[component_id as usize].as_any().downcast_ref::<Column<T>>()
    }

    // ── size ────────────────────────────────────────────────────────────────

    /// Number of rows, removed-but-not-compacted ones included.
    pub fn get_size(&self) -> usize { self.metadata.len() }

    /// Number of live rows.
    pub fn active_count(&self) -> usize { self.active }

    /// Removals since the last compaction.
    pub fn fragmentation(&self) -> usize { self.fragmentation }

    /// Reserves room for `additional` more rows in metadata and every column.
    pub fn reserve(&mut self, additional: usize) {
        self.metadata.reserve(additional);
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    // ── entities ────────────────────────────────────────────────────────────

    /// Creates an entity owning `components` and returns its handle.
    ///
    /// Unknown component types are registered on the fly unless the registry
    /// is frozen. On error no row is created and no component is registered.
    ///
    /// ## Errors
    /// - [`RegistryError`] for an unknown type in a frozen or full registry.
    /// - [`CapacityError`] when the row index space is exhausted.
    pub fn new_entity<B: IntoBundle>(&mut self, components: B) -> ECSResult<Entity> {
        let entries = components.into_bundle().into_entries();
        let row = self.metadata.len();
        if row >= Entity::MAX_ROWS {
            return Err(CapacityError {
                entities_needed: row as u64 + 1,
                capacity: Entity::MAX_ROWS as u64,
            }.into());
        }

        let keys: Vec<&ComponentKey> = entries.iter().map(BundleEntry::key).collect();
        let component_ids = self.register_all(&keys)?;

        self.metadata.push(EntityMetadata::live(build_signature(&component_ids)));
        for column in &mut self.columns {
            column.push_vacant();
        }
        for (entry, component_id) in entries.into_iter().zip(component_ids) {
            self.columns[component_id as usize].write_entry(row, entry)?;
        }

        self.active += 1;
        Ok(Entity::from_index(row))
    }

    /// Marks `entity` as removed. O(1); other handles stay valid.
    ///
    /// Removing an already-removed entity is a no-op. Column memory is kept
    /// until the next [`refresh`](Self::refresh).
    ///
    /// ## Panics
    /// In debug builds, if `entity` is out of range.
    pub fn remove_entity(&mut self, entity: Entity) {
        debug_assert!(
            entity.index() < self.metadata.len(),
            "remove_entity: {entity} out of range ({} rows)",
            self.metadata.len()
        );
        if let Some(metadata) = self.metadata.get_mut(entity.index()) {
            if metadata.active {
                metadata.active = false;
                self.active -= 1;
                self.fragmentation += 1;
            }
        }
    }

    /// Checked [`remove_entity`](Self::remove_entity).
    ///
    /// ## Errors
    /// [`AccessError::Stale`] if `entity` is out of range or already removed.
    pub fn try_remove_entity(&mut self, entity: Entity) -> ECSResult<()> {
        self.live_row(entity)?;
        self.remove_entity(entity);
        Ok(())
    }

    /// Returns `true` if `entity` names a live row.
    pub fn is_active(&self, entity: Entity) -> bool {
        self.metadata.get(entity.index()).is_some_and(|metadata| metadata.active)
    }

    /// Metadata of `entity`'s row, live or not.
    pub fn metadata(&self, entity: Entity) -> Option<&EntityMetadata> {
        self.metadata.get(entity.index())
    }

    /// Handles of all live rows, ascending.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.metadata
            .iter()
            .enumerate()
            .filter(|(_, metadata)| metadata.active)
            .map(|(row, _)| Entity::from_index(row))
    }

    fn live_row(&self, entity: Entity) -> Result<usize, AccessError> {
        if self.is_active(entity) {
            Ok(entity.index())
        } else {
            Err(StaleEntityError { entity }.into())
        }
    }

    // ── components ──────────────────────────────────────────────────────────

    /// Returns `true` if `entity` is live and owns a `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        match (self.metadata.get(entity.index()), self.registry.id_of::<T>()) {
            (Some(metadata), Some(component_id)) => metadata.active && metadata.signature.has(component_id),
            _ => false,
        }
    }

    fn typed_column<T: Component>(&self, component_id: ComponentID) -> Result<&Column<T>, AccessError> {
        let column = &self.columns[component_id as usize];
        column.as_any().downcast_ref::<Column<T>>().ok_or(AccessError::TypeMismatch(TypeMismatchError {
            expected: column.element_type_name(),
            actual: type_name::<T>(),
        }))
    }

    fn owned_component_id<T: Component>(&self, entity: Entity) -> Result<(usize, ComponentID), AccessError> {
        let row = self.live_row(entity)?;
        let component_id = self
            .registry
            .id_of::<T>()
            .ok_or(AccessError::UnregisteredComponent(type_name::<T>()))?;
        if !self.metadata[row].signature.has(component_id) {
            return Err(AccessError::MissingComponent { entity, component: type_name::<T>() });
        }
        Ok((row, component_id))
    }

    /// Checked shared access to `entity`'s `T`.
    ///
    /// ## Errors
    /// [`AccessError`] if the handle is stale, `T` is unregistered, or the
    /// entity does not own a `T`.
    pub fn try_get_component<T: Component>(&self, entity: Entity) -> ECSResult<&T> {
        let (row, component_id) = self.owned_component_id::<T>(entity)?;
        let column = self.typed_column::<T>(component_id)?;
        Ok(column
            .get(row)
            .ok_or(AccessError::MissingComponent { entity, component: type_name::<T>() })?)
    }

    /// Checked exclusive access to `entity`'s `T`.
    ///
    /// ## Errors
    /// Same as [`try_get_component`](Self::try_get_component).
    pub fn try_get_component_mut<T: Component>(&mut self, entity: Entity) -> ECSResult<&mut T> {
        let (row, component_id) = self.owned_component_id::<T>(entity)?;
        let column = &mut self.columns[component_id as usize];
        let expected = column.element_type_name();
        let column = column
            .as_any_mut()
            .downcast_mut::<Column<T>>()
            .ok_or(AccessError::TypeMismatch(TypeMismatchError { expected, actual: type_name::<T>() }))?;
        Ok(column
            .get_mut(row)
            .ok_or(AccessError::MissingComponent { entity, component: type_name::<T>() })?)
    }

    /// Shared access to `entity`'s `T`.
    ///
    /// ## Panics
    /// If the handle is stale or the entity does not own a `T`. Callers are
    /// expected to have filtered by signature first.
    pub fn get_component<T: Component>(&self, entity: Entity) -> &T {
        match self.try_get_component::<T>(entity) {
            Ok(value) => value,
            Err(error) => panic!("get_component: {error}"),
        }
    }

    /// Exclusive access to `entity`'s `T`.
    ///
    /// ## Panics
    /// Same as [`get_component`](Self::get_component).
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> &mut T {
        match self.try_get_component_mut::<T>(entity) {
            Ok(value) => value,
            Err(error) => panic!("get_component_mut: {error}"),
        }
    }

    /// Raw pointer to the slot of component `component_id` in `row`.
    ///
    /// The caller must have checked the signature bit and must ensure no
    /// conflicting access to the slot for as long as the pointer is used.
    pub(crate) fn slot_ptr<T: Component>(&self, component_id: ComponentID, row: usize) -> Option<*mut Option<T>> {
        self.columns
            .get(component_id as usize)?
            .as_any()
            .downcast_ref::<Column<T>>()?
            .slot_ptr(row)
    }

    /// Gives `entity` a `T`, replacing any existing value.
    ///
    /// ## Errors
    /// [`AccessError::Stale`] for a dead handle, [`RegistryError`] if `T` is
    /// new and the registry is frozen or full.
    pub fn attach_component<T: Component>(&mut self, entity: Entity, value: T) -> ECSResult<()> {
        self.attach_entry(entity, BundleEntry::new(value))
    }

    pub(crate) fn attach_entry(&mut self, entity: Entity, entry: BundleEntry) -> ECSResult<()> {
        let row = self.live_row(entity)?;
        let component_id = self.register_key(&entry.key)?;
        self.columns[component_id as usize].write_entry(row, entry)?;
        self.metadata[row].signature.set(component_id);
        Ok(())
    }

    /// Takes `T` away from `entity`, dropping the value. Idempotent.
    ///
    /// ## Errors
    /// [`AccessError::Stale`] for a dead handle.
    pub fn detach_component<T: Component>(&mut self, entity: Entity) -> ECSResult<()> {
        self.detach_key(entity, &ComponentKey::of::<T>())
    }

    pub(crate) fn detach_key(&mut self, entity: Entity, key: &ComponentKey) -> ECSResult<()> {
        let row = self.live_row(entity)?;
        if let Some(component_id) = self.registry.component_id_of_type_id(key.type_id()) {
            self.metadata[row].signature.clear(component_id);
            self.columns[component_id as usize].clear_row(row);
        }
        Ok(())
    }

    // ── iteration ───────────────────────────────────────────────────────────

    /// Calls `callable` for every live entity owning all components of `Q`.
    ///
    /// Rows are visited in ascending order. For `Q = ()` the callable fires
    /// exactly once with [`Entity::SENTINEL`]. A set naming an unregistered
    /// component matches nothing.
    pub fn for_entities_with<Q, F>(&self, callable: F)
    where
        Q: ComponentSet,
        F: FnMut(Entity),
    {
        if let Some(required) = required_signature(&self.registry, &Q::keys()) {
            self.for_entities_matching(&required, callable);
        }
    }

    /// Signature form of [`for_entities_with`](Self::for_entities_with).
    pub fn for_entities_matching<F: FnMut(Entity)>(&self, required: &Signature, mut callable: F) {
        if required.is_empty() {
            callable(Entity::SENTINEL);
            return;
        }
        for (row, metadata) in self.metadata.iter().enumerate() {
            if metadata.matches(required) {
                callable(Entity::from_index(row));
            }
        }
    }

    /// Parallel [`for_entities_with`](Self::for_entities_with) on the current rayon pool.
    ///
    /// Each matching row is visited exactly once, in no particular order.
    /// Cross-row shared state touched by `callable` needs its own
    /// synchronization.
    pub fn for_entities_with_parallel<Q, F>(&self, callable: F)
    where
        Q: ComponentSet,
        F: Fn(Entity) + Send + Sync,
    {
        if let Some(required) = required_signature(&self.registry, &Q::keys()) {
            self.for_entities_matching_parallel(&required, callable);
        }
    }

    /// Signature form of [`for_entities_with_parallel`](Self::for_entities_with_parallel).
    pub fn for_entities_matching_parallel<F>(&self, required: &Signature, callable: F)
    where
        F: Fn(Entity) + Send + Sync,
    {
        if required.is_empty() {
            callable(Entity::SENTINEL);
            return;
        }
        self.metadata
            .par_iter()
            .with_min_len(PARALLEL_MIN_ROWS)
            .enumerate()
            .filter(|(_, metadata)| metadata.matches(required))
            .for_each(|(row, _)| callable(Entity::from_index(row)));
    }

    // ── compaction ──────────────────────────────────────────────────────────

    /// Compacts storage and returns the new size.
    ///
    /// Live rows are packed to the front, then metadata and every column are
    /// truncated to the live count. Handles taken before the call are
    /// invalidated. No-op when nothing was removed since the last compaction.
    pub fn refresh(&mut self) -> usize {
        if self.fragmentation == 0 {
            return self.metadata.len();
        }

        let before = self.metadata.len();
        let size = self.shuffle();
        debug_assert_eq!(size, self.active);

        self.metadata.truncate(size);
        for column in &mut self.columns {
            column.truncate(size);
        }
        self.fragmentation = 0;

        tracing::debug!(rows_before = before, rows_after = size, "storage compacted");
        size
    }

    /// Two-cursor partition of live rows to the front. Returns the live count.
    fn shuffle(&mut self) -> usize {
        if self.metadata.is_empty() {
            return 0;
        }

        let mut left = 0usize;
        let mut right = self.metadata.len() - 1;

        loop {
            // left: first inactive row
            loop {
                if left > right {
                    return left;
                }
                if !self.metadata[left].active {
                    break;
                }
                left += 1;
            }

            // right: last active row
            loop {
                if self.metadata[right].active {
                    break;
                }
                if right <= left {
                    return left;
                }
                right -= 1;
            }

            self.swap_rows(left, right);
            left += 1;
            right -= 1;
        }
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        self.metadata.swap(a, b);
        for column in &mut self.columns {
            column.swap_rows(a, b);
        }
    }

    /// Debug rendering of row liveness: `E` per active row, `_` per removed one.
    pub fn layout(&self) -> String {
        self.metadata
            .iter()
            .map(|metadata| if metadata.active { 'E' } else { '_' })
            .collect()
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("size", &self.metadata.len())
            .field("active", &self.active)
            .field("fragmentation", &self.fragmentation)
            .field("components", &self.registry.descriptions().map(|desc| desc.name).collect::<Vec<_>>())
            .finish()
    }
}
