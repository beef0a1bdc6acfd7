//! Dependency graph over resolved system descriptors.
//!
//! ## Purpose
//! The parallel scheduler runs systems as graph nodes; an edge `A → B` means
//! `B` may not start before `A` has finished. The graph is built once, when
//! the scheduler is constructed, and trusted afterwards.
//!
//! ## Edges
//! - **Reference edges**: `B` lists `A` among its required systems.
//! - **Conflict edges** (optional): `A` and `B` touch a common component and
//!   at least one of them writes it. They are oriented along a topological
//!   order of the reference edges, ties broken by registration order, so
//!   adding them can never introduce a cycle.
//!
//! ## Errors
//! A cycle among reference edges is a [`ConfigError::DependencyCycle`].

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::engine::descriptor::ResolvedDescriptor;
use crate::engine::error::ConfigError;
use crate::engine::types::SystemID;


/// Why an edge exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// The later system references the earlier one.
    Reference,
    /// The two systems' component access conflicts.
    Conflict,
}

/// Immutable precedence graph between systems.
#[derive(Clone, Debug)]
pub struct DependencyGraph {
    successors: Vec<Vec<SystemID>>,
    in_degree: Vec<usize>,
    order: Vec<SystemID>,
    edges: Vec<(SystemID, SystemID, EdgeKind)>,
}

impl DependencyGraph {
    /// Builds the graph for `descriptors`, indexed by `system_id`.
    ///
    /// ## Errors
    /// [`ConfigError::DependencyCycle`] naming the systems left unsorted.
    pub fn build(descriptors: &[ResolvedDescriptor], conflict_detection: bool) -> Result<Self, ConfigError> {
        let nodes = descriptors.len();

        let mut edges: Vec<(SystemID, SystemID, EdgeKind)> = Vec::new();
        for descriptor in descriptors {
            for &dependency in &descriptor.required_systems {
                edges.push((dependency, descriptor.system_id, EdgeKind::Reference));
            }
        }

        let order = reference_order(descriptors)?;

        if conflict_detection {
            let mut position = vec![0usize; nodes];
            for (rank, &system_id) in order.iter().enumerate() {
                position[system_id as usize] = rank;
            }

            let mut ordered: Vec<(SystemID, SystemID)> = edges.iter().map(|&(from, to, _)| (from, to)).collect();
            ordered.sort_unstable();

            for a in 0..nodes {
                for b in (a + 1)..nodes {
                    if !descriptors[a].access.conflicts_with(&descriptors[b].access) {
                        continue;
                    }
                    let (from, to) = if position[a] < position[b] { (a, b) } else { (b, a) };
                    let edge = (from as SystemID, to as SystemID);
                    if ordered.binary_search(&edge).is_err() {
                        edges.push((edge.0, edge.1, EdgeKind::Conflict));
                    }
                }
            }
        }

        let mut successors = vec![Vec::new(); nodes];
        let mut in_degree = vec![0usize; nodes];
        for &(from, to, _) in &edges {
            successors[from as usize].push(to);
            in_degree[to as usize] += 1;
        }
        for list in &mut successors {
            list.sort_unstable();
        }

        Ok(Self { successors, in_degree, order, edges })
    }

    /// Number of nodes.
    pub fn len(&self) -> usize { self.in_degree.len() }

    /// Returns `true` for a graph without nodes.
    pub fn is_empty(&self) -> bool { self.in_degree.is_empty() }

    /// Nodes without predecessors.
    pub fn roots(&self) -> impl Iterator<Item = SystemID> + '_ {
        self.in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(node, _)| node as SystemID)
    }

    /// Nodes that wait on `node`.
    pub fn successors(&self, node: SystemID) -> &[SystemID] {
        &self.successors[node as usize]
    }

    /// Number of predecessors of every node.
    pub fn in_degrees(&self) -> &[usize] {
        &self.in_degree
    }

    /// A topological order of the reference edges, lowest id first among ties.
    pub fn order(&self) -> &[SystemID] {
        &self.order
    }

    /// Every edge as `(from, to, kind)`.
    pub fn edges(&self) -> &[(SystemID, SystemID, EdgeKind)] {
        &self.edges
    }

    /// Returns `true` if an edge `from → to` exists.
    pub fn has_edge(&self, from: SystemID, to: SystemID) -> bool {
        self.successors
            .get(from as usize)
            .is_some_and(|list| list.binary_search(&to).is_ok())
    }
}

/// Orders `descriptors` along their system references.
///
/// ## Errors
/// [`ConfigError::DependencyCycle`] naming the systems left unsorted.
pub(crate) fn reference_order(descriptors: &[ResolvedDescriptor]) -> Result<Vec<SystemID>, ConfigError> {
    let edges = descriptors.iter().flat_map(|descriptor| {
        descriptor.required_systems.iter().map(move |&dependency| (dependency, descriptor.system_id))
    });
    topological_order(descriptors.len(), edges).map_err(|unsorted| {
        ConfigError::DependencyCycle(unsorted.iter().map(|&id| descriptors[id as usize].name).collect())
    })
}

/// Kahn's algorithm with a min-heap, so ties resolve to the lowest id.
///
/// On a cycle, returns the nodes that could not be ordered.
fn topological_order(
    nodes: usize,
    edges: impl IntoIterator<Item = (SystemID, SystemID)>,
) -> Result<Vec<SystemID>, Vec<SystemID>> {
    let mut adjacency: Vec<Vec<SystemID>> = vec![Vec::new(); nodes];
    let mut in_degree = vec![0usize; nodes];

    // 1. Build adjacency list and in-degree counts from edges.
    for (parent, child) in edges {
        adjacency[parent as usize].push(child);
        in_degree[child as usize] += 1;
    }

    // 2. Seed the heap with all root nodes.
    let mut ready: BinaryHeap<Reverse<SystemID>> = (0..nodes)
        .filter(|&node| in_degree[node] == 0)
        .map(|node| Reverse(node as SystemID))
        .collect();

    // 3. Process ready nodes.
    let mut sorted = Vec::with_capacity(nodes);
    while let Some(Reverse(parent)) = ready.pop() {
        sorted.push(parent);
        for &child in &adjacency[parent as usize] {
            let degree = &mut in_degree[child as usize];
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(child));
            }
        }
    }

    // 4. Check for cycles.
    if sorted.len() == nodes {
        Ok(sorted)
    } else {
        Err((0..nodes).filter(|&node| in_degree[node] > 0).map(|node| node as SystemID).collect())
    }
}
