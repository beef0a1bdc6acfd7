//! # Borrow Tracking Module
//!
//! This module implements a **per-component read/write borrow tracker** used
//! by the schedulers around every system invocation.
//!
//! ## Purpose
//!
//! The dependency graph orders systems whose component access conflicts, but
//! it can be told not to (`conflict_detection = false`) and it cannot see
//! mistakes in hand-written descriptors. The tracker enforces Rust-like
//! borrowing rules *at runtime* as a backstop:
//!
//! - Multiple systems may **read** the same component type concurrently.
//! - Only one system may **write** to a component type at a time.
//! - No system may read a component type while another system writes it.
//!
//! A conflicting system therefore waits for the holder instead of racing it.
//!
//! ## State Encoding
//!
//! Each component ID maps to one `AtomicUsize` with the following meaning:
//!
//! | State | Meaning |
//! |------:|--------|
//! | `0` | Unlocked |
//! | `1` | Write-locked (exclusive writer) |
//! | `>= 2` | Read-locked (`state - 1` active readers) |
//!
//! ## Synchronization Strategy
//!
//! - Uses atomic operations with acquire/release.
//! - Guards take their borrows all-or-nothing. A guard that cannot take every
//!   borrow releases the ones it got and lets its rayon worker run other
//!   pending jobs before retrying, so a waiting system never holds a borrow
//!   and never starves the job it waits for, even on a single worker.
//! - The same thread re-acquiring the same component will deadlock.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::error::{ExecutionError, InvalidAccessReason};
use crate::engine::types::{AccessMode, AccessSets, ComponentID, COMPONENT_CAP};


/// Spins briefly, then yields to the OS scheduler.
#[inline]
fn backoff(spins: &mut u32) {
    *spins = spins.wrapping_add(1);
    if *spins % 64 == 0 {
        std::thread::yield_now();
    } else {
        std::hint::spin_loop();
    }
}

/// Tracks runtime read/write borrows for each component type.
///
/// Each component has an associated atomic state encoding whether it is:
/// - Unborrowed
/// - Borrowed mutably (write)
/// - Borrowed immutably by one or more readers

pub struct BorrowTracker {
    /// Per-component atomic borrow state.
    states: [AtomicUsize; COMPONENT_CAP],
}

impl Default for BorrowTracker {
    fn default() -> Self { Self::new() }
}

impl BorrowTracker {
    /// Creates a new `BorrowTracker` with all components unlocked.
    pub fn new() -> Self {
        Self { states: std::array::from_fn(|_| AtomicUsize::new(0)) }
    }

    /// Returns `true` if no component is borrowed.
    pub fn is_idle(&self) -> bool {
        self.states.iter().all(|state| state.load(Ordering::Acquire) == 0)
    }

    /// Tries to take a **shared (read) borrow** for the given component.
    /// Fails only while a writer holds the component.
    ///
    /// ## State Transitions
    ///
    /// - `0 → 2` : first reader
    /// - `N → N+1` : additional reader
    pub fn try_acquire_read(&self, component_id: ComponentID) -> bool {
        let state = &self.states[component_id as usize];
        let mut current_state = state.load(Ordering::Acquire);

        while current_state != 1 {
            let next = if current_state == 0 { 2 } else { current_state + 1 };
            match state.compare_exchange_weak(current_state, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(observed) => current_state = observed,
            }
        }
        false
    }

    /// Releases a previously acquired **shared (read) borrow**.
    ///
    /// The last reader unlocks the component (`2 → 0`).

    pub fn release_read(&self, component_id: ComponentID) {
        let state = &self.states[component_id as usize];
        let mut current_state = state.load(Ordering::Acquire);

        loop {
            debug_assert!(current_state >= 2);
            let next = if current_state == 2 { 0 } else { current_state - 1 };
            match state.compare_exchange_weak(current_state, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return,
                Err(observed) => current_state = observed,
            }
        }
    }

    /// Tries to take an **exclusive (write) borrow** for the given component.
    /// Fails while any reader or writer is present (`0 → 1`).
    pub fn try_acquire_write(&self, component_id: ComponentID) -> bool {
        self.states[component_id as usize]
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases a previously acquired **exclusive (write) borrow**.

    pub fn release_write(&self, component_id: ComponentID) {
        let previous_state = self.states[component_id as usize].swap(0, Ordering::AcqRel);
        debug_assert!(previous_state == 1);
    }
}

/// RAII guard holding one system invocation's component borrows.
///
/// Created from the system's [`AccessSets`]; all borrows are released on drop.
///
/// ## Ordering
///
/// Reads and writes are merged and acquired in ascending component id order.
/// Release happens in reverse.

pub struct BorrowGuard<'a> {
    tracker: &'a BorrowTracker,
    held: Vec<(ComponentID, AccessMode)>,
}

impl<'a> BorrowGuard<'a> {

    /// Creates a new `BorrowGuard` and acquires all requested borrows.
    ///
    /// ## Parameters
    ///
    /// - `tracker`: Shared borrow tracker
    /// - `access`: Declared component access of the system
    ///
    /// ## Errors
    ///
    /// [`ExecutionError::InvalidQueryAccess`] if a component is in both sets.

    pub fn new(tracker: &'a BorrowTracker, access: &AccessSets) -> Result<Self, ExecutionError> {
        if let Some(component_id) = access.read.first_shared(&access.write) {
            return Err(ExecutionError::InvalidQueryAccess {
                component_id,
                reason: InvalidAccessReason::ReadAndWrite,
            });
        }

        let held: Vec<(ComponentID, AccessMode)> = access
            .all()
            .iterate_over_components()
            .map(|component_id| {
                let mode = if access.write.has(component_id) { AccessMode::Write } else { AccessMode::Read };
                (component_id, mode)
            })
            .collect();

        let mut spins = 0u32;
        while !try_acquire_all(tracker, &held) {
            match rayon::yield_now() {
                Some(rayon::Yield::Executed) => {}
                _ => backoff(&mut spins),
            }
        }

        Ok(Self { tracker, held })
    }
}

/// Takes every borrow in `held`, or none of them.
fn try_acquire_all(tracker: &BorrowTracker, held: &[(ComponentID, AccessMode)]) -> bool {
    for (taken, &(component_id, mode)) in held.iter().enumerate() {
        let acquired = match mode {
            AccessMode::Read => tracker.try_acquire_read(component_id),
            AccessMode::Write => tracker.try_acquire_write(component_id),
        };
        if !acquired {
            for &(component_id, mode) in held[..taken].iter().rev() {
                release(tracker, component_id, mode);
            }
            return false;
        }
    }
    true
}

fn release(tracker: &BorrowTracker, component_id: ComponentID, mode: AccessMode) {
    match mode {
        AccessMode::Read => tracker.release_read(component_id),
        AccessMode::Write => tracker.release_write(component_id),
    }
}

impl Drop for BorrowGuard<'_> {
    fn drop(&mut self) {
        for &(component_id, mode) in self.held.iter().rev() {
            release(self.tracker, component_id, mode);
        }
    }
}
