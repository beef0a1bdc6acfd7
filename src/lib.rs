//! # Colonnade
//!
//! Entity-Component-System runtime with a compacting, signature-indexed
//! column store and a dependency-aware parallel scheduler.
//!
//! ## Design Goals
//! - Dense, index-addressed entities over one column per component type
//! - Systems declared up front, validated once, then trusted
//! - Deterministic sequential execution; graph-ordered parallel execution
//! - Structural changes deferred until every system of a tick has finished
//!
//! ## Quick start
//! ```rust
//! use colonnade::prelude::*;
//!
//! struct Position(f64);
//! struct Velocity(f64);
//!
//! let movement = FnSystem::new(
//!     SystemDescriptor::new("movement")
//!         .reads::<Velocity>()
//!         .writes::<Position>()
//!         .takes_delta_time(),
//!     |ctx| {
//!         let dt = ctx.delta_time();
//!         let (velocity, position) = (ctx.get::<Velocity>().0, ctx.get_mut::<Position>());
//!         position.0 += velocity * dt;
//!         None
//!     },
//! );
//!
//! let mut scheduler = Scheduler::builder()
//!     .config(RuntimeConfig::sequential().with_fixed_delta(1.0))
//!     .system(movement)
//!     .build()?;
//!
//! let entity = scheduler.with_exclusive(|m| m.new_entity((Position(0.0), Velocity(5.0))))?;
//! scheduler.tick()?;
//! assert_eq!(scheduler.storage().get_component::<Position>(entity).0, 5.0);
//! # Ok::<(), colonnade::ECSError>(())
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core ECS types

pub use engine::entity::{
    Entity,
    EntityMetadata,
};

pub use engine::component::{
    Bundle,
    Component,
    ComponentDesc,
    ComponentKey,
    ComponentRegistry,
    IntoBundle,
};

pub use engine::storage::{
    Column,
    Storage,
};

pub use engine::query::ComponentSet;

pub use engine::commands::{
    Command,
    CommandQueue,
    DeferredFn,
};

pub use engine::manager::{
    DeferredManager,
    RuntimeManager,
};

pub use engine::descriptor::{
    ResolvedDescriptor,
    SystemDescriptor,
    SystemRef,
};

pub use engine::systems::{
    FnSystem,
    System,
    SystemContext,
};

pub use engine::graph::{
    DependencyGraph,
    EdgeKind,
};

pub use engine::config::{
    CompactionPolicy,
    DeltaTime,
    ExecutionMode,
    RuntimeConfig,
};

pub use engine::scheduler::{
    Scheduler,
    SchedulerBuilder,
    TickStats,
};

pub use engine::error::{
    AccessError,
    ConfigError,
    ECSError,
    ECSResult,
    ExecutionError,
    RegistryError,
};

pub use engine::types::{
    AccessSets,
    ComponentID,
    EntityID,
    Signature,
    SystemID,
    Tick,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used ECS types.
///
/// Import with:
/// ```rust
/// use colonnade::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Command,
        DeferredManager,
        ECSResult,
        Entity,
        FnSystem,
        RuntimeConfig,
        RuntimeManager,
        Scheduler,
        Storage,
        System,
        SystemContext,
        SystemDescriptor,
    };
}
