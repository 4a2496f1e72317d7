// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Statically checked graph construction.
//!
//! Every node declares its ports up front. Each edge is checked the moment it
//! is declared (node and port exist, kinds agree, fan-in only into aggregate
//! inputs), so a miswired pipeline fails before the first pass instead of
//! halfway through a run. `build` then checks the whole graph:
//!
//! 1. **Unwired inputs**: every required input has at least one edge
//! 2. **Cycle detection**: DFS with a recursion stack, reporting the cycle path
//! 3. **Execution order**: Kahn's algorithm, ties broken by insertion order so
//!    the same graph always runs its nodes in the same order

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet};

use crate::errors::{PipelineError, ValidationError};
use crate::observability::messages::graph::{GraphBuilt, WiringRejected};
use crate::observability::messages::StructuredLog;
use crate::traits::Node;

use super::ports::NodeInterface;

/// Handle to a node inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// `(from, output) -> (to, input)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: NodeId,
    pub output: String,
    pub to: NodeId,
    pub input: String,
    /// A mandatory edge that carries nothing in a pass is an `InvalidInput`.
    pub mandatory: bool,
}

pub(crate) struct NodeSlot {
    pub name: String,
    pub node: Box<dyn Node>,
    pub interface: NodeInterface,
}

#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<NodeSlot>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node<N: Node + 'static>(
        &mut self,
        name: impl Into<String>,
        node: N,
    ) -> Result<NodeId, PipelineError> {
        self.add_boxed(name, Box::new(node))
    }

    pub fn add_boxed(
        &mut self,
        name: impl Into<String>,
        node: Box<dyn Node>,
    ) -> Result<NodeId, PipelineError> {
        let name = name.into();
        if self.nodes.iter().any(|slot| slot.name == name) {
            return Err(rejected(ValidationError::DuplicateNodeName { node: name }));
        }
        let interface = node.interface();
        self.nodes.push(NodeSlot {
            name,
            node,
            interface,
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    /// Wire a mandatory edge.
    pub fn connect(
        &mut self,
        from: NodeId,
        output: &str,
        to: NodeId,
        input: &str,
    ) -> Result<(), PipelineError> {
        self.wire(from, output, to, input, true)
    }

    /// Wire an edge whose absence in a pass withholds the consumer instead of failing.
    pub fn connect_optional(
        &mut self,
        from: NodeId,
        output: &str,
        to: NodeId,
        input: &str,
    ) -> Result<(), PipelineError> {
        self.wire(from, output, to, input, false)
    }

    /// Wire several same-named ports at once, e.g. `filters` and `objects`.
    pub fn connect_ports(
        &mut self,
        from: NodeId,
        to: NodeId,
        ports: &[&str],
    ) -> Result<(), PipelineError> {
        for port in ports {
            self.connect(from, port, to, port)?;
        }
        Ok(())
    }

    fn wire(
        &mut self,
        from: NodeId,
        output: &str,
        to: NodeId,
        input: &str,
        mandatory: bool,
    ) -> Result<(), PipelineError> {
        self.check_edge(from, output, to, input).map_err(rejected)?;
        self.edges.push(Edge {
            from,
            output: output.to_string(),
            to,
            input: input.to_string(),
            mandatory,
        });
        Ok(())
    }

    fn check_edge(
        &self,
        from: NodeId,
        output: &str,
        to: NodeId,
        input: &str,
    ) -> Result<(), ValidationError> {
        let src = self.slot(from)?;
        let dst = self.slot(to)?;
        if from == to {
            return Err(ValidationError::SelfEdge {
                node: src.name.clone(),
            });
        }
        let out_port = src
            .interface
            .find_output(output)
            .ok_or_else(|| ValidationError::UnknownPort {
                node: src.name.clone(),
                port: output.to_string(),
                direction: "output",
            })?;
        let in_port = dst
            .interface
            .find_input(input)
            .ok_or_else(|| ValidationError::UnknownPort {
                node: dst.name.clone(),
                port: input.to_string(),
                direction: "input",
            })?;
        if out_port.kind != in_port.kind {
            return Err(ValidationError::IncompatibleKinds {
                from: format!("{}.{}", src.name, output),
                from_kind: out_port.kind,
                to: format!("{}.{}", dst.name, input),
                to_kind: in_port.kind,
            });
        }
        let already_wired = self.edges.iter().any(|e| e.to == to && e.input == input);
        if already_wired && !in_port.aggregate {
            return Err(ValidationError::FanInNotAllowed {
                node: dst.name.clone(),
                port: input.to_string(),
            });
        }
        Ok(())
    }

    fn slot(&self, id: NodeId) -> Result<&NodeSlot, ValidationError> {
        self.nodes.get(id.0).ok_or_else(|| ValidationError::UnknownNode {
            node: format!("#{}", id.0),
        })
    }

    /// Validate the whole graph and fix its execution order.
    pub fn build(self) -> Result<Graph, PipelineError> {
        let mut errors = self.unwired_inputs();
        if errors.is_empty() {
            if let Some(cycle) = self.find_cycle() {
                errors.push(ValidationError::CyclicDependency { cycle });
            }
        }
        if let Some(first) = errors.first().cloned() {
            for error in &errors {
                WiringRejected { error }.log();
            }
            return Err(PipelineError::Wiring(first));
        }

        let order = self.topological_order();
        let mut incoming = vec![Vec::new(); self.nodes.len()];
        for (index, edge) in self.edges.iter().enumerate() {
            incoming[edge.to.0].push(index);
        }

        let graph = Graph {
            nodes: self.nodes,
            edges: self.edges,
            order,
            incoming,
        };
        let names = graph.execution_order();
        GraphBuilt {
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            order: &names,
        }
        .log();
        Ok(graph)
    }

    fn unwired_inputs(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (index, slot) in self.nodes.iter().enumerate() {
            for port in slot.interface.inputs.iter().filter(|p| p.required) {
                let wired = self
                    .edges
                    .iter()
                    .any(|e| e.to.0 == index && e.input == port.name);
                if !wired {
                    errors.push(ValidationError::UnwiredInput {
                        node: slot.name.clone(),
                        port: port.name.clone(),
                    });
                }
            }
        }
        errors
    }

    /// Producer -> consumers adjacency, deduplicated, in index order.
    fn dependents(&self) -> Vec<BTreeSet<usize>> {
        let mut adjacency = vec![BTreeSet::new(); self.nodes.len()];
        for edge in &self.edges {
            adjacency[edge.from.0].insert(edge.to.0);
        }
        adjacency
    }

    fn find_cycle(&self) -> Option<Vec<String>> {
        let adjacency = self.dependents();
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for start in 0..self.nodes.len() {
            if visited.contains(&start) {
                continue;
            }
            if let Some(cycle) =
                dfs_cycle_detection(start, &adjacency, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(
                    cycle
                        .into_iter()
                        .map(|i| self.nodes[i].name.clone())
                        .collect(),
                );
            }
        }
        None
    }

    fn topological_order(&self) -> Vec<NodeId> {
        let adjacency = self.dependents();
        let mut in_degree = vec![0usize; self.nodes.len()];
        for consumers in &adjacency {
            for &consumer in consumers {
                in_degree[consumer] += 1;
            }
        }

        // Min-heap on the insertion index keeps the order deterministic.
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(current)) = ready.pop() {
            order.push(NodeId(current));
            for &consumer in &adjacency[current] {
                in_degree[consumer] -= 1;
                if in_degree[consumer] == 0 {
                    ready.push(Reverse(consumer));
                }
            }
        }
        order
    }
}

fn rejected(error: ValidationError) -> PipelineError {
    WiringRejected { error: &error }.log();
    PipelineError::Wiring(error)
}

/// Depth-first search with a recursion stack; returns the cycle path, closed
/// by repeating its first node.
fn dfs_cycle_detection(
    node: usize,
    adjacency: &[BTreeSet<usize>],
    visited: &mut HashSet<usize>,
    rec_stack: &mut HashSet<usize>,
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for &neighbor in &adjacency[node] {
        if !visited.contains(&neighbor) {
            if let Some(cycle) = dfs_cycle_detection(neighbor, adjacency, visited, rec_stack, path)
            {
                return Some(cycle);
            }
        } else if rec_stack.contains(&neighbor) {
            if let Some(start) = path.iter().position(|&n| n == neighbor) {
                let mut cycle = path[start..].to_vec();
                cycle.push(neighbor);
                return Some(cycle);
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    None
}

/// A validated graph with a fixed execution order.
pub struct Graph {
    pub(crate) nodes: Vec<NodeSlot>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) order: Vec<NodeId>,
    /// Per node, indices into `edges` of its incoming edges in declaration order.
    pub(crate) incoming: Vec<Vec<usize>>,
}

impl Graph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.0).map(|slot| slot.name.as_str())
    }

    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Node instance names in the order a pass executes them.
    pub fn execution_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|id| self.nodes[id.0].name.as_str())
            .collect()
    }

    /// Smallest budget declared by any bounded source, if there is one.
    pub fn pass_budget(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|slot| slot.node.pass_budget())
            .min()
    }
}
