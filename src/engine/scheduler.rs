//! Scheduler construction and the tick loop.
//!
//! This module is responsible for:
//! * validating system descriptors once, when the scheduler is built,
//! * freezing the component registry,
//! * running one tick at a time in the configured [`ExecutionMode`],
//! * draining the deferred command queue after every system has finished,
//! * compacting storage according to the [`CompactionPolicy`].
//!
//! ## Tick
//!
//! 1. The delta time is taken from the [`FrameTimer`] (or the fixed value).
//! 2. Systems run: sequentially in registration order, or as graph nodes on
//!    the worker pool.
//! 3. Once every system has returned, queued commands are applied in FIFO
//!    order through a [`DeferredManager`].
//! 4. Storage is compacted if the policy says so.
//!
//! Structural changes requested during step 2 are therefore invisible to
//! every system of the same tick.

use std::any::TypeId;
use std::collections::VecDeque;

use rayon::ThreadPool;

use crate::engine::borrow::BorrowTracker;
use crate::engine::commands::CommandQueue;
use crate::engine::component::{Component, ComponentKey};
use crate::engine::config::{CompactionPolicy, ExecutionMode, RuntimeConfig};
use crate::engine::descriptor::{resolve_descriptors, ResolvedDescriptor, SystemDescriptor};
use crate::engine::error::{ConfigError, ECSResult};
use crate::engine::executor::{run_parallel, run_sequential, TickContext};
use crate::engine::graph::DependencyGraph;
use crate::engine::manager::{drain_commands, DeferredManager};
use crate::engine::storage::Storage;
use crate::engine::systems::{system_type_id, System, SystemTable};
use crate::engine::timer::FrameTimer;
use crate::engine::types::Tick;


/// What happened during one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickStats {
    /// Index of the tick, starting at zero.
    pub tick: Tick,
    /// Delta time handed to systems, in seconds.
    pub delta_time: f64,
    /// Number of systems executed.
    pub systems_run: usize,
    /// Total `update` calls across all systems.
    pub invocations: usize,
    /// Deferred commands applied successfully, follow-ups included.
    pub commands_applied: usize,
    /// Deferred commands that failed and were skipped.
    pub failed_commands: usize,
    /// Row count after compaction, if storage was compacted this tick.
    pub rows_after_compaction: Option<usize>,
}

/// Collects configuration, storage, components and systems.
///
/// Nothing is validated until [`build`](Self::build).
pub struct SchedulerBuilder {
    config: RuntimeConfig,
    storage: Storage,
    components: Vec<ComponentKey>,
    systems: Vec<Box<dyn System>>,
}

impl Default for SchedulerBuilder {
    fn default() -> Self { Self::new() }
}

impl SchedulerBuilder {
    /// Empty builder with the default (sequential) configuration.
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            storage: Storage::new(),
            components: Vec::new(),
            systems: Vec::new(),
        }
    }

    /// Replaces the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `storage`, possibly pre-populated, instead of an empty one.
    pub fn storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    /// Registers `T` even if no system declares it.
    pub fn component<T: Component>(mut self) -> Self {
        self.components.push(ComponentKey::of::<T>());
        self
    }

    /// Adds `system`. Registration order is the sequential execution order
    /// and defines system ids.
    pub fn system<S: System>(mut self, system: S) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    /// Adds an already boxed system.
    pub fn boxed_system(mut self, system: Box<dyn System>) -> Self {
        self.systems.push(system);
        self
    }

    /// Validates everything and produces a runnable scheduler.
    ///
    /// ## Errors
    /// * [`ConfigError`] for invalid configuration values, duplicate or
    ///   unknown systems, unknown components, self-dependencies, cycles, or a
    ///   worker pool that cannot be started.
    /// * [`RegistryError`](crate::engine::error::RegistryError) if the
    ///   component registry is exhausted.
    pub fn build(self) -> ECSResult<Scheduler> {
        let SchedulerBuilder { config, mut storage, components, systems } = self;
        config.validate()?;

        for key in &components {
            storage.register_key(key)?;
        }

        let described: Vec<(TypeId, SystemDescriptor)> = systems
            .iter()
            .map(|system| (system_type_id(system.as_ref()), system.descriptor()))
            .collect();
        let descriptors = resolve_descriptors(&described, &mut storage)?;
        storage.freeze();
        storage.reserve(config.initial_capacity);

        let (graph, pool) = match config.mode {
            ExecutionMode::Sequential => (None, None),
            ExecutionMode::Parallel => {
                let graph = DependencyGraph::build(&descriptors, config.conflict_detection)?;
                (Some(graph), Some(build_pool(&config)?))
            }
        };

        tracing::info!(
            mode = ?config.mode,
            systems = descriptors.len(),
            edges = graph.as_ref().map(|graph| graph.edges().len()),
            components = storage.registry().len(),
            workers = pool.as_ref().map(ThreadPool::current_num_threads),
            "scheduler built"
        );

        Ok(Scheduler {
            config,
            storage,
            systems: SystemTable::new(systems),
            descriptors,
            graph,
            pool,
            queue: CommandQueue::new(),
            borrows: BorrowTracker::new(),
            timer: FrameTimer::new(),
            tick: 0,
        })
    }
}

fn build_pool(config: &RuntimeConfig) -> Result<ThreadPool, ConfigError> {
    let prefix = config.thread_name_prefix.clone();
    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(move |index| format!("{prefix}-{index}"));
    if let Some(threads) = config.worker_threads {
        builder = builder.num_threads(threads);
    }
    builder.build().map_err(|error| ConfigError::ThreadPool(error.to_string()))
}

/// Owns storage and systems and runs ticks.
///
/// ## Invariants
/// * Descriptors, the dependency graph and the component registry never
///   change after construction.
/// * Between ticks the deferred queue is empty.
pub struct Scheduler {
    config: RuntimeConfig,
    storage: Storage,
    systems: SystemTable,
    descriptors: Vec<ResolvedDescriptor>,
    graph: Option<DependencyGraph>,
    pool: Option<ThreadPool>,
    queue: CommandQueue,
    borrows: BorrowTracker,
    timer: FrameTimer,
    tick: Tick,
}

impl Scheduler {
    /// Starts a [`SchedulerBuilder`].
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Runs one tick.
    ///
    /// ## Errors
    /// [`ExecutionError`](crate::engine::error::ExecutionError) if a system's
    /// declared access could not be borrowed. Commands queued before the
    /// failure are still applied, storage is compacted per policy and the
    /// tick counts as completed.
    pub fn tick(&mut self) -> ECSResult<TickStats> {
        let tick = self.tick;
        let _span = tracing::debug_span!("tick", tick).entered();

        let delta_time = self.timer.next_delta(self.config.delta_time);
        let ctx = TickContext {
            storage: &self.storage,
            systems: &self.systems,
            descriptors: &self.descriptors,
            queue: &self.queue,
            borrows: &self.borrows,
            delta_time,
            tick,
            inner_parallelism: self.config.effective_inner_parallelism(),
        };

        let outcome = match (&self.graph, &self.pool) {
            (Some(graph), Some(pool)) => pool.install(|| run_parallel(&ctx, graph)),
            _ => run_sequential(&ctx),
        };

        let (commands_applied, failed_commands) = drain_commands(&mut self.storage, self.queue.take().into());
        let rows_after_compaction = self.compact_if_due();
        self.tick += 1;
        let invocations = outcome?;

        tracing::debug!(invocations, commands_applied, failed_commands, "tick finished");

        Ok(TickStats {
            tick,
            delta_time,
            systems_run: self.descriptors.len(),
            invocations,
            commands_applied,
            failed_commands,
            rows_after_compaction,
        })
    }

    /// Runs `ticks` ticks, stopping at the first error.
    pub fn run(&mut self, ticks: usize) -> ECSResult<Vec<TickStats>> {
        (0..ticks).map(|_| self.tick()).collect()
    }

    fn compact_if_due(&mut self) -> Option<usize> {
        let fragmentation = self.storage.fragmentation();
        let due = match self.config.compaction {
            CompactionPolicy::EveryTick => fragmentation > 0,
            CompactionPolicy::Threshold(threshold) => fragmentation > 0 && fragmentation >= threshold,
            CompactionPolicy::Manual => false,
        };
        due.then(|| self.storage.refresh())
    }

    /// Compacts storage now, whatever the policy. Returns the new row count.
    ///
    /// Entity handles obtained before the call may refer to different
    /// entities afterwards.
    pub fn refresh(&mut self) -> usize {
        self.storage.refresh()
    }

    /// Runs `f` with exclusive access to storage, outside any tick.
    ///
    /// Commands `f` defers are applied before this returns; failures among
    /// them are logged and skipped.
    pub fn with_exclusive<R>(&mut self, f: impl FnOnce(&mut DeferredManager<'_>) -> R) -> R {
        let mut follow_up = VecDeque::new();
        let result = {
            let mut manager = DeferredManager::new(&mut self.storage, &mut follow_up);
            f(&mut manager)
        };
        if !follow_up.is_empty() {
            drain_commands(&mut self.storage, follow_up);
        }
        result
    }

    /// Read-only access to storage.
    pub fn storage(&self) -> &Storage { &self.storage }

    /// The system registered as `S`.
    pub fn get_system<S: System>(&self) -> Option<&S> {
        self.systems.get::<S>()
    }

    /// Registered systems.
    pub fn systems(&self) -> &SystemTable { &self.systems }

    /// Resolved descriptors, indexed by system id.
    pub fn descriptors(&self) -> &[ResolvedDescriptor] { &self.descriptors }

    /// The dependency graph; `None` in sequential mode.
    pub fn graph(&self) -> Option<&DependencyGraph> { self.graph.as_ref() }

    /// Active configuration.
    pub fn config(&self) -> &RuntimeConfig { &self.config }

    /// Execution mode.
    pub fn mode(&self) -> ExecutionMode { self.config.mode }

    /// Number of ticks completed.
    pub fn tick_count(&self) -> Tick { self.tick }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("mode", &self.config.mode)
            .field("systems", &self.descriptors.iter().map(|d| d.name).collect::<Vec<_>>())
            .field("tick", &self.tick)
            .field("storage", &self.storage)
            .finish()
    }
}
