use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use petgraph::{
    Direction::{Incoming, Outgoing},
    graph::{DiGraph, NodeIndex},
};
use stackflow_common::{error::Error, stack::StackConfig};
use tracing::warn;

/// Depends-on graph over a list of stacks.
/// ---
/// Node indices match the stacks' input positions.
pub struct DependencyGraph {
    /// An edge from Stack A to Stack B means Stack A must succeed before Stack B can start.
    graph: DiGraph<String, ()>,

    /// Declared dependencies of each node, in declaration order, without repeats.
    dependencies: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Builds the graph, rejecting duplicate names and dependencies on undeclared stacks.
    pub fn new(stacks: &[StackConfig]) -> Result<Self, Error> {
        let mut graph = DiGraph::with_capacity(stacks.len(), stacks.len());
        let mut stack_name_to_node_idx: HashMap<&str, NodeIndex> = HashMap::new();

        if stacks.is_empty() {
            warn!("Creating a dependency graph without any stacks");
        }

        for stack in stacks {
            if stack_name_to_node_idx.contains_key(stack.name.as_str()) {
                return Err(Error::DuplicateStack(stack.name.clone()));
            }

            let node_idx = graph.add_node(stack.name.clone());
            stack_name_to_node_idx.insert(stack.name.as_str(), node_idx);
        }

        let mut dependencies = Vec::with_capacity(stacks.len());

        for stack in stacks {
            let node_idx = stack_name_to_node_idx[stack.name.as_str()];
            let mut declared: Vec<usize> = Vec::with_capacity(stack.dependencies.len());

            for dependency in &stack.dependencies {
                let from_node_idx = stack_name_to_node_idx
                    .get(dependency.as_str())
                    .ok_or_else(|| Error::UnknownDependency {
                        stack: stack.name.clone(),
                        dependency: dependency.clone(),
                    })?;

                graph.update_edge(*from_node_idx, node_idx, ());

                if !declared.contains(&from_node_idx.index()) {
                    declared.push(from_node_idx.index());
                }
            }

            dependencies.push(declared);
        }

        Ok(Self {
            graph,
            dependencies,
        })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn stack_name(&self, idx: usize) -> &str {
        &self.graph[NodeIndex::new(idx)]
    }

    pub fn dependencies_of(&self, idx: usize) -> &[usize] {
        &self.dependencies[idx]
    }

    /// Kahn's algorithm, always emitting the ready stack with the lowest input position.
    /// ---
    /// Returns the order (as node positions) and the wave of every node, where a
    /// node's wave is one past the highest wave among its dependencies.
    pub fn topological_order(&self) -> Result<(Vec<usize>, Vec<usize>), Error> {
        let node_count = self.graph.node_count();

        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|node_idx| self.graph.neighbors_directed(node_idx, Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(node_count);
        let mut wave_of = vec![0usize; node_count];

        while let Some(Reverse(idx)) = ready.pop() {
            order.push(idx);

            for successor in self.graph.neighbors_directed(NodeIndex::new(idx), Outgoing) {
                let succ_idx = successor.index();
                wave_of[succ_idx] = wave_of[succ_idx].max(wave_of[idx] + 1);
                in_degree[succ_idx] -= 1;

                if in_degree[succ_idx] == 0 {
                    ready.push(Reverse(succ_idx));
                }
            }
        }

        if order.len() < node_count {
            let mut emitted = vec![false; node_count];
            for idx in &order {
                emitted[*idx] = true;
            }

            return Err(Error::DependencyCycle {
                cycle: self.find_cycle(&emitted),
            });
        }

        Ok((order, wave_of))
    }

    /// Walks dependencies among the nodes Kahn's algorithm could not emit.
    /// ---
    /// Every such node has at least one dependency that was not emitted either,
    /// so the walk can only end by revisiting a node, which closes the cycle.
    fn find_cycle(&self, emitted: &[bool]) -> Vec<String> {
        let Some(start) = emitted.iter().position(|done| !done) else {
            return Vec::new();
        };

        let mut path: Vec<usize> = Vec::new();
        let mut position_in_path: HashMap<usize, usize> = HashMap::new();
        let mut current = start;

        loop {
            if let Some(cycle_start) = position_in_path.get(&current) {
                return path[*cycle_start..]
                    .iter()
                    .map(|idx| self.stack_name(*idx).to_string())
                    .collect();
            }

            position_in_path.insert(current, path.len());
            path.push(current);

            match self.dependencies[current]
                .iter()
                .find(|dep| !emitted[**dep])
            {
                Some(next) => current = *next,
                None => {
                    return path
                        .iter()
                        .map(|idx| self.stack_name(*idx).to_string())
                        .collect();
                }
            }
        }
    }
}
