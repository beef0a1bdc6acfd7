//! Entity handles and per-row metadata.
//!
//! ## Purpose
//! An [`Entity`] is a dense row index shared by the metadata array and every
//! component column of a [`Storage`](crate::engine::storage::Storage). The
//! matching [`EntityMetadata`] row records which components the entity owns
//! and whether the row is still live.
//!
//! ## Invariants
//! - A handle is valid only while its row exists and is active.
//! - Handles carry no generation. Compaction moves rows, so a handle taken
//!   before [`Storage::refresh`](crate::engine::storage::Storage::refresh)
//!   may name a different logical entity afterwards. Checked accessors
//!   reject out-of-range and inactive rows but cannot detect reuse.
//! - [`Entity::SENTINEL`] never names a row. It is the handle passed to
//!   systems that require no components.

use std::fmt;

use crate::engine::types::{EntityID, Signature};


/// Opaque dense handle to one entity row.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Entity(EntityID);

impl Entity {
    /// Handle used when a system runs once per tick with no per-entity data.
    pub const SENTINEL: Entity = Entity(EntityID::MAX);

    /// Largest row count storage will hold; the last id is reserved for the sentinel.
    pub const MAX_ROWS: usize = EntityID::MAX as usize;

    /// Builds a handle from a raw row index.
    #[inline]
    pub const fn from_raw(id: EntityID) -> Self {
        Entity(id)
    }

    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(index < Self::MAX_ROWS);
        Entity(index as EntityID)
    }

    /// Raw id of the handle.
    #[inline]
    pub const fn id(self) -> EntityID {
        self.0
    }

    /// Row index of the handle.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns `true` for [`Entity::SENTINEL`].
    #[inline]
    pub const fn is_sentinel(self) -> bool {
        self.0 == EntityID::MAX
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            f.write_str("Entity(sentinel)")
        } else {
            write!(f, "Entity({})", self.0)
        }
    }
}

/// Per-row bookkeeping stored alongside the component columns.
///
/// `signature` bit *i* is set iff the row currently owns component *i*.
/// `active = false` marks a logically removed row awaiting compaction; its
/// signature is left untouched for inspection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityMetadata {
    /// Components owned by the row.
    pub signature: Signature,
    /// Whether the row is live.
    pub active: bool,
}

impl EntityMetadata {
    /// Metadata of a freshly created row.
    #[inline]
    pub fn live(signature: Signature) -> Self {
        Self { signature, active: true }
    }

    /// Returns `true` if the row is live and owns every component in `required`.
    #[inline]
    pub fn matches(&self, required: &Signature) -> bool {
        self.active && self.signature.contains_all(required)
    }
}
