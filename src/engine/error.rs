//! Error types for storage, registration, scheduling and configuration.
//!
//! This module declares focused, composable error types used across the
//! runtime. Each error carries enough context to make failures actionable
//! while remaining small and cheap to pass around or convert into the
//! aggregate [`ECSError`].
//!
//! ## Goals
//! * **Specificity:** each error type models a single failure mode (stale
//!   handles, missing components, frozen registries, dependency cycles).
//! * **Ergonomics:** all errors derive [`thiserror::Error`] and convert into
//!   [`ECSError`] through `From`, so `?` works across layers.
//! * **Actionability:** structured fields (offending entity, component and
//!   system names) make logs useful without reproducing the issue.
//!
//! ## Taxonomy
//! * [`ConfigError`]: the system set cannot be resolved. Raised while building
//!   a scheduler and fatal to construction.
//! * [`AccessError`]: checked component or entity access failed. The
//!   unchecked accessors treat the same situations as contract violations
//!   and panic.
//! * [`RegistryError`] / [`CapacityError`]: registration or growth limits.
//! * [`ExecutionError`]: invalid access declarations reaching the borrow
//!   tracker.
//!
//! No error is expected to leave a tick in steady state; failed deferred
//! commands are logged and counted instead.
//!
//! ## Display vs. Debug
//! * `Display` is short, lowercase, operator-facing.
//! * `Debug` (derived) retains full structure for diagnostics.

use thiserror::Error;

use crate::engine::entity::Entity;
use crate::engine::types::ComponentID;


/// Returned when storage cannot hold another entity row.
///
/// ### Fields
/// * `entities_needed`: Rows the operation attempted to occupy.
/// * `capacity`: The upper bound that prevented the operation.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("entity limit reached ({entities_needed} needed; capacity {capacity})")]
pub struct CapacityError {
    /// Total entities the operation attempted to allocate.
    pub entities_needed: u64,

    /// Current capacity limiting the operation.
    pub capacity: u64,
}

/// Returned when an entity handle is out of range or refers to a removed row.
///
/// Handles are raw dense indices; a handle kept across a compaction may also
/// land here once the row it named has been truncated away.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stale entity handle {entity}")]
pub struct StaleEntityError {
    /// The offending handle.
    pub entity: Entity,
}

/// Returned when a type-erased value does not match the column it targets.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("type mismatch: expected {expected}, got {actual}")]
pub struct TypeMismatchError {
    /// Element type of the column.
    pub expected: &'static str,

    /// Type carried by the value.
    pub actual: &'static str,
}

/// Failures of checked entity and component access.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The entity handle is out of range or inactive.
    #[error(transparent)]
    Stale(#[from] StaleEntityError),

    /// The entity is live but does not own the component.
    #[error("entity {entity} has no component `{component}`")]
    MissingComponent {
        /// Entity that was queried.
        entity: Entity,
        /// Rust type name of the component.
        component: &'static str,
    },

    /// The component type was never registered with this storage.
    #[error("component `{0}` is not registered")]
    UnregisteredComponent(&'static str),

    /// A type-erased value reached the wrong column.
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),
}

/// Failures of component registration.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Registration was attempted after the registry was frozen.
    #[error("component registry is frozen; cannot register `{component}`")]
    Frozen {
        /// Rust type name of the rejected component.
        component: &'static str,
    },

    /// All component ids are in use.
    #[error("component capacity of {capacity} exceeded while registering `{component}`")]
    Capacity {
        /// Rust type name of the rejected component.
        component: &'static str,
        /// Configured maximum.
        capacity: usize,
    },
}

/// Reasons a declared access set is rejected by the borrow tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidAccessReason {
    /// The same component appears in both the read and write sets.
    ReadAndWrite,
}

/// Errors raised while executing systems.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// An access declaration cannot be honoured.
    #[error("invalid access to component {component_id}: {reason:?}")]
    InvalidQueryAccess {
        /// Offending component.
        component_id: ComponentID,
        /// Why the access is invalid.
        reason: InvalidAccessReason,
    },
}

/// Construction-time failures of a scheduler.
///
/// These are fatal: the scheduler refuses to build.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A system references a system that is not registered.
    #[error("system `{system}` requires unknown system `{dependency}`")]
    UnknownSystem {
        /// Referencing system.
        system: &'static str,
        /// Name of the missing dependency.
        dependency: &'static str,
    },

    /// A system requires a component the frozen registry does not know.
    #[error("system `{system}` requires unregistered component `{component}`")]
    UnknownComponent {
        /// Referencing system.
        system: &'static str,
        /// Rust type name of the component.
        component: &'static str,
    },

    /// Two systems share a name.
    #[error("system `{0}` is registered more than once")]
    DuplicateSystem(&'static str),

    /// A system lists itself as a dependency.
    #[error("system `{0}` depends on itself")]
    SelfDependency(&'static str),

    /// Explicit system references form a cycle.
    #[error("dependency cycle between systems {0:?}")]
    DependencyCycle(Vec<&'static str>),

    /// More systems than [`SYSTEM_CAP`](crate::engine::types::SYSTEM_CAP).
    #[error("too many systems ({0})")]
    TooManySystems(usize),

    /// The worker pool could not be started.
    #[error("worker pool could not be created: {0}")]
    ThreadPool(String),

    /// A configuration value is out of range or could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Invalid(String),
}

/// Aggregate error for every fallible runtime operation.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ECSError {
    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// See [`AccessError`].
    #[error(transparent)]
    Access(#[from] AccessError),

    /// See [`RegistryError`].
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// See [`CapacityError`].
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// See [`ExecutionError`].
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl From<StaleEntityError> for ECSError {
    fn from(error: StaleEntityError) -> Self {
        ECSError::Access(AccessError::Stale(error))
    }
}

impl From<TypeMismatchError> for ECSError {
    fn from(error: TypeMismatchError) -> Self {
        ECSError::Access(AccessError::TypeMismatch(error))
    }
}

/// Result alias used across the crate.
pub type ECSResult<T> = Result<T, ECSError>;
