//! Core ECS Types, Identifiers, and Bit-Level Layouts
//!
//! This module defines the **fundamental identifiers and signatures** shared
//! by storage, descriptors, the dependency graph and the schedulers.
//!
//! ## Design Philosophy
//!
//! The runtime is designed around:
//!
//! - **Dense storage**: one row per entity, one column per component type.
//! - **Bitset-based signatures** for filtering rows.
//! - **Small, copyable numeric identifiers** for components and systems.
//! - **Explicit access declaration** for scheduling.
//!
//! ## Signatures
//!
//! Components are identified by compact [`ComponentID`] values assigned at
//! registration. A [`Signature`] is a fixed-size bitset over those ids. Every
//! entity row carries one, and every system resolves its declared
//! requirements into one, so that filtering an entity is a handful of word
//! comparisons.
//!
//! ## Access Sets
//!
//! [`AccessSets`] split a system's required components into *read* and
//! *write* signatures. Two systems conflict when either writes a component
//! the other touches; the dependency graph orders such pairs.
//!
//! ## Safety
//!
//! This module contains **no unsafe code**, but its types sit on the unsafe
//! boundary of column access in the scheduler. A signature bit being set is
//! the only evidence the runtime uses that a column slot holds a value.

/// Dense entity index.
pub type EntityID = u32;

/// Unique identifier for a component type within one storage.
pub type ComponentID = u16;

/// Unique identifier for a system, equal to its registration position.
pub type SystemID = u16;

/// Simulation tick counter.
pub type Tick = u64;

/// Maximum number of registered component types.
pub const COMPONENT_CAP: usize = 256;

/// Number of `u64` words required to represent a full component signature.
pub const SIGNATURE_SIZE: usize = (COMPONENT_CAP + 63) / 64;

/// Maximum number of systems a scheduler accepts.
pub const SYSTEM_CAP: usize = SystemID::MAX as usize;

/// Bitset representing a set of components.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Packed component bitset.
    pub components: [u64; SIGNATURE_SIZE],
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            components: [0u64; SIGNATURE_SIZE],
        }
    }
}

impl Signature {
    /// Sets the bit corresponding to `component_id`.
    #[inline]
    pub fn set(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] |= 1u64 << bits;
    }

    /// Clears the bit corresponding to `component_id`.
    #[inline]
    pub fn clear(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] &= !(1u64 << bits);
    }

    /// Returns `true` if `component_id` is present in this signature.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        (self.components[index] >> bits) & 1 == 1
    }

    /// Returns `true` if all components in `signature` are present.
    #[inline]
    pub fn contains_all(&self, signature: &Signature) -> bool {
        for (component_a, component_b) in self.components.iter().zip(signature.components.iter()) {
            if (component_a & component_b) != *component_b { return false; }
        }
        true
    }

    /// Returns `true` if the two signatures share at least one component.
    #[inline]
    pub fn intersects(&self, other: &Signature) -> bool {
        self.components
            .iter()
            .zip(other.components.iter())
            .any(|(a, b)| (a & b) != 0)
    }

    /// Lowest component present in both signatures.
    #[inline]
    pub fn first_shared(&self, other: &Signature) -> Option<ComponentID> {
        self.components
            .iter()
            .zip(other.components.iter())
            .enumerate()
            .find_map(|(word_index, (a, b))| {
                let shared = a & b;
                (shared != 0).then(|| (word_index * 64 + shared.trailing_zeros() as usize) as ComponentID)
            })
    }

    /// Returns the union of both signatures.
    #[inline]
    pub fn union(&self, other: &Signature) -> Signature {
        let mut out = *self;
        for (word, other_word) in out.components.iter_mut().zip(other.components.iter()) {
            *word |= *other_word;
        }
        out
    }

    /// Returns `self` with every component of `other` removed.
    #[inline]
    pub fn difference(&self, other: &Signature) -> Signature {
        let mut out = *self;
        for (word, other_word) in out.components.iter_mut().zip(other.components.iter()) {
            *word &= !*other_word;
        }
        out
    }

    /// Returns `true` if no component bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.iter().all(|&word| word == 0)
    }

    /// Number of components present.
    #[inline]
    pub fn count(&self) -> usize {
        self.components.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Iterates over all component IDs set in this signature, ascending.
    pub fn iterate_over_components(&self) -> impl Iterator<Item = ComponentID> + '_ {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some((base + tz) as ComponentID)
                })
            })
    }
}

/// Builds a component signature from a list of component IDs.
pub fn build_signature(component_ids: &[ComponentID]) -> Signature {
    let mut signature = Signature::default();
    for &component_id in component_ids { signature.set(component_id); }
    signature
}

/// Access mode for a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access.
    Read,
    /// Exclusive write access.
    Write
}

/// Declares the component access set of a system.
///
/// `read` and `write` are kept disjoint: a component that is both read and
/// written is recorded only under `write`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessSets {
    /// Components read by the system.
    pub read: Signature,
    /// Components written by the system.
    pub write: Signature,
}

impl AccessSets {
    /// Every component touched, read or written.
    #[inline]
    pub fn all(&self) -> Signature {
        self.read.union(&self.write)
    }

    /// Returns `true` if this access set conflicts with another.
    #[inline]
    pub fn conflicts_with(&self, other: &AccessSets) -> bool {
        // Conflicts if: (W ∩ W) or (W ∩ R) or (R ∩ W)
        for ((a_w, a_r), (b_w, b_r)) in self.write.components.iter().zip(self.read.components.iter())
            .zip(other.write.components.iter().zip(other.read.components.iter()))
        {
            if (a_w & b_w) != 0 || (a_w & b_r) != 0 || (a_r & b_w) != 0 {
                return true;
            }
        }
        false
    }
}
