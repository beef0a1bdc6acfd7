//! System execution for one tick.
//!
//! ## Sequential
//! Systems run in registration order on the calling thread. A system's
//! entities are visited in ascending row order.
//!
//! ## Parallel
//! Every system is a node of the [`DependencyGraph`]. Each node keeps an
//! atomic count of unfinished predecessors; roots are spawned into a rayon
//! scope, and a finishing node spawns each successor whose count drops to
//! zero. The scope returns once every node has run, which is the join point
//! before the deferred queue drains.
//!
//! Inside a node, a `parallel_safe` system spreads its entities across the
//! pool when inner parallelism is enabled.
//!
//! ## Safety
//! Every invocation holds a [`BorrowGuard`] over its system's declared
//! access for the whole node, so column access through [`SystemContext`]
//! never overlaps a conflicting writer even if the graph omitted an edge.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::engine::borrow::{BorrowGuard, BorrowTracker};
use crate::engine::commands::CommandQueue;
use crate::engine::error::{ECSError, ECSResult};
use crate::engine::graph::DependencyGraph;
use crate::engine::manager::RuntimeManager;
use crate::engine::storage::Storage;
use crate::engine::systems::{SystemContext, SystemTable};
use crate::engine::descriptor::ResolvedDescriptor;
use crate::engine::entity::Entity;
use crate::engine::types::{SystemID, Tick};


/// Shared, read-only state of one tick.
#[derive(Clone, Copy)]
pub(crate) struct TickContext<'a> {
    pub storage: &'a Storage,
    pub systems: &'a SystemTable,
    pub descriptors: &'a [ResolvedDescriptor],
    pub queue: &'a CommandQueue,
    pub borrows: &'a BorrowTracker,
    pub delta_time: f64,
    pub tick: Tick,
    pub inner_parallelism: bool,
}

impl<'a> TickContext<'a> {
    /// Runs system `system_id` over its matching entities. Returns the number
    /// of invocations.
    pub fn run_system(&self, system_id: SystemID) -> ECSResult<usize> {
        let descriptors = self.descriptors;
        let descriptor = &descriptors[system_id as usize];
        let _guard = BorrowGuard::new(self.borrows, &descriptor.access)?;

        let invocations = if self.inner_parallelism && descriptor.parallel_safe {
            let count = AtomicUsize::new(0);
            self.storage.for_entities_matching_parallel(&descriptor.required, |entity| {
                self.invoke(descriptor, entity);
                count.fetch_add(1, Ordering::Relaxed);
            });
            count.into_inner()
        } else {
            let mut count = 0usize;
            self.storage.for_entities_matching(&descriptor.required, |entity| {
                self.invoke(descriptor, entity);
                count += 1;
            });
            count
        };

        tracing::trace!(system = descriptor.name, invocations, "system ran");
        Ok(invocations)
    }

    #[inline]
    fn invoke(&self, descriptor: &'a ResolvedDescriptor, entity: Entity) {
        let manager = RuntimeManager::new(self.storage, self.queue);
        let mut ctx = SystemContext::new(
            self.storage,
            self.systems,
            descriptor,
            manager,
            entity,
            self.delta_time,
            self.tick,
        );
        if let Some(command) = self.systems.by_id(descriptor.system_id).update(&mut ctx) {
            debug_assert!(
                descriptor.returns_deferred,
                "system `{}` returned a command without declaring returns_deferred",
                descriptor.name
            );
            self.queue.push(command);
        }
    }
}

/// Runs every system in registration order. Returns total invocations.
pub(crate) fn run_sequential(ctx: &TickContext<'_>) -> ECSResult<usize> {
    let mut invocations = 0usize;
    for system_id in 0..ctx.descriptors.len() {
        invocations += ctx.run_system(system_id as SystemID)?;
    }
    Ok(invocations)
}

struct GraphRun<'a> {
    ctx: TickContext<'a>,
    graph: &'a DependencyGraph,
    remaining: Vec<AtomicUsize>,
    invocations: AtomicUsize,
    error: Mutex<Option<ECSError>>,
}

/// Runs the graph on the current rayon pool. Returns total invocations.
pub(crate) fn run_parallel(ctx: &TickContext<'_>, graph: &DependencyGraph) -> ECSResult<usize> {
    let run = GraphRun {
        ctx: *ctx,
        graph,
        remaining: graph.in_degrees().iter().map(|&degree| AtomicUsize::new(degree)).collect(),
        invocations: AtomicUsize::new(0),
        error: Mutex::new(None),
    };

    rayon::scope(|scope| {
        for root in graph.roots() {
            spawn_node(scope, root, &run);
        }
    });

    if let Some(error) = run.error.into_inner() {
        return Err(error);
    }
    Ok(run.invocations.into_inner())
}

fn spawn_node<'scope, 'a: 'scope>(scope: &rayon::Scope<'scope>, node: SystemID, run: &'scope GraphRun<'a>) {
    scope.spawn(move |scope| {
        match run.ctx.run_system(node) {
            Ok(invocations) => {
                run.invocations.fetch_add(invocations, Ordering::Relaxed);
            }
            Err(error) => {
                run.error.lock().get_or_insert(error);
            }
        }

        for &next in run.graph.successors(node) {
            if run.remaining[next as usize].fetch_sub(1, Ordering::AcqRel) == 1 {
                spawn_node(scope, next, run);
            }
        }
    });
}
