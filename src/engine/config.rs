//! Runtime configuration.
//!
//! [`RuntimeConfig`] selects the execution mode and tunes the scheduler. It
//! is plain data with serde derives, so hosts can embed it in their own
//! configuration files; [`RuntimeConfig::from_toml_str`] parses a standalone
//! TOML document.
//!
//! ## Example
//! ```toml
//! mode = "parallel"
//! worker_threads = 4
//! compaction = { threshold = 128 }
//! delta_time = { fixed = 0.016 }
//! ```
//!
//! Every field has a default; unknown keys are rejected.

use serde::{Deserialize, Serialize};

use crate::engine::error::{ConfigError, ECSResult};


/// How systems are executed within a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One system after another, in registration order, on the calling thread.
    #[default]
    Sequential,
    /// Dependency-graph nodes on a bounded worker pool.
    Parallel,
}

/// When storage is compacted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionPolicy {
    /// At the end of every tick that removed at least one entity.
    #[default]
    EveryTick,
    /// At the end of a tick once this many removals have accumulated.
    Threshold(usize),
    /// Only through [`Scheduler::refresh`](crate::engine::scheduler::Scheduler::refresh).
    Manual,
}

/// Source of the delta time handed to systems.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaTime {
    /// Wall-clock seconds since the previous tick (since construction for the first).
    #[default]
    Measured,
    /// The same number of seconds every tick.
    Fixed(f64),
}

/// Scheduler configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Worker threads for parallel mode; `None` uses rayon's default.
    pub worker_threads: Option<usize>,
    /// Prefix of worker thread names.
    pub thread_name_prefix: String,
    /// Spread entities of `parallel_safe` systems across workers.
    pub inner_parallelism: bool,
    /// Order systems whose component access conflicts.
    pub conflict_detection: bool,
    /// Compaction policy.
    pub compaction: CompactionPolicy,
    /// Delta-time source.
    pub delta_time: DeltaTime,
    /// Rows reserved up front.
    pub initial_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            worker_threads: None,
            thread_name_prefix: String::from("colonnade"),
            inner_parallelism: true,
            conflict_detection: true,
            compaction: CompactionPolicy::EveryTick,
            delta_time: DeltaTime::Measured,
            initial_capacity: 0,
        }
    }
}

impl RuntimeConfig {
    /// Default sequential configuration.
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Default parallel configuration.
    pub fn parallel() -> Self {
        Self { mode: ExecutionMode::Parallel, ..Self::default() }
    }

    /// Sets the worker count.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Sets the compaction policy.
    pub fn with_compaction(mut self, compaction: CompactionPolicy) -> Self {
        self.compaction = compaction;
        self
    }

    /// Uses a fixed delta time of `seconds`.
    pub fn with_fixed_delta(mut self, seconds: f64) -> Self {
        self.delta_time = DeltaTime::Fixed(seconds);
        self
    }

    /// Enables or disables conflict edges.
    pub fn with_conflict_detection(mut self, enabled: bool) -> Self {
        self.conflict_detection = enabled;
        self
    }

    /// Enables or disables inner data parallelism.
    pub fn with_inner_parallelism(mut self, enabled: bool) -> Self {
        self.inner_parallelism = enabled;
        self
    }

    /// Parses and validates a TOML document.
    ///
    /// ## Errors
    /// [`ConfigError::Invalid`] for syntax errors, unknown keys, wrong types
    /// or out-of-range values.
    pub fn from_toml_str(source: &str) -> ECSResult<Self> {
        let config: RuntimeConfig = toml::from_str(source).map_err(|error| ConfigError::Invalid(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// ## Errors
    /// [`ConfigError::Invalid`] for zero worker threads or a negative or
    /// non-finite fixed delta time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == Some(0) {
            return Err(ConfigError::Invalid("worker_threads must be at least 1".into()));
        }
        if let DeltaTime::Fixed(seconds) = self.delta_time {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(ConfigError::Invalid(format!("fixed delta time must be finite and non-negative, got {seconds}")));
            }
        }
        Ok(())
    }

    /// Whether `parallel_safe` systems actually spread their entities.
    ///
    /// Disabled without conflict detection: a worker blocked on a borrow
    /// guard must not be able to steal work from the system holding it.
    pub(crate) fn effective_inner_parallelism(&self) -> bool {
        self.mode == ExecutionMode::Parallel && self.inner_parallelism && self.conflict_detection
    }
}
