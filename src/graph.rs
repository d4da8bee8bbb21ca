//! The frozen task graph.
//!
//! A [`Graph`] is what a [`Blueprint`](crate::Blueprint) turns into once every
//! task has been declared. Building it is the single place where cycles are
//! detected; a `Graph` that exists is always acyclic, and it carries the
//! stable topological order the engine walks.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::fmt;

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde_json::Value;

use crate::engine::{GraphId, InputRef, Node};
use crate::error::BuildError;
use crate::param::{ParamSnapshot, ParameterStore};

/// Why one task must wait for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    /// The dependent receives the upstream output as an input.
    Data,
    /// The dependent only runs after the upstream task, nothing is passed.
    Order,
}

pub(crate) type TaskGraph = petgraph::Graph<Node, Edge>;

/// An immutable, validated task graph ready to be run by an
/// [`Engine`](crate::Engine).
pub struct Graph {
    pub(crate) id: GraphId,
    pub(crate) graph: TaskGraph,
    pub(crate) params: ParameterStore,
    order: Vec<NodeIndex>,
}

impl Graph {
    pub(crate) fn freeze(
        id: GraphId,
        graph: TaskGraph,
        params: ParameterStore,
    ) -> Result<Self, BuildError> {
        let order = stable_order(&graph).map_err(|cycle| BuildError::CyclicGraph { cycle })?;

        Ok(Self {
            id,
            graph,
            params,
            order,
        })
    }

    /// Resolves the parameters of a run, see [`ParameterStore::resolve`].
    pub fn resolve(&self, overrides: &BTreeMap<String, Value>) -> Result<ParamSnapshot, BuildError> {
        self.params.resolve(overrides)
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Task names in the order a sequential run executes them.
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|&index| self.graph[index].name.as_ref())
    }

    /// Names of the tasks `name` waits for, in declaration order.
    pub fn dependencies_of(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.find(name)?;

        let mut upstream: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .collect();
        upstream.sort();
        upstream.dedup();

        Some(
            upstream
                .into_iter()
                .map(|i| self.graph[i].name.as_ref())
                .collect(),
        )
    }

    pub(crate) fn topological(&self) -> &[NodeIndex] {
        &self.order
    }

    pub(crate) fn find(&self, name: &str) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&i| self.graph[i].name.as_ref() == name)
    }
}

/// Kahn's algorithm over a min-heap of indices, so that among ready tasks
/// the one declared first always goes first. On failure returns the names
/// along one cycle, with the first name repeated at the end.
fn stable_order(graph: &TaskGraph) -> Result<Vec<NodeIndex>, Vec<String>> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|i| graph.edges_directed(i, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<NodeIndex>> = graph
        .node_indices()
        .filter(|i| in_degree[i.index()] == 0)
        .map(Reverse)
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());

    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);

        for edge in graph.edges_directed(index, Direction::Outgoing) {
            let target = edge.target();
            in_degree[target.index()] -= 1;
            if in_degree[target.index()] == 0 {
                ready.push(Reverse(target));
            }
        }
    }

    if order.len() == graph.node_count() {
        return Ok(order);
    }

    let remaining: HashSet<NodeIndex> = graph
        .node_indices()
        .filter(|i| in_degree[i.index()] > 0)
        .collect();

    Err(find_cycle(graph, &remaining))
}

/// Every task left over by Kahn's algorithm still has an upstream task that
/// was left over as well, so walking upstream must revisit a task.
fn find_cycle(graph: &TaskGraph, remaining: &HashSet<NodeIndex>) -> Vec<String> {
    let name = |i: NodeIndex| graph[i].name.to_string();

    let Some(&start) = remaining.iter().min() else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut seen = HashMap::from([(start, 0)]);
    let mut current = start;

    loop {
        let upstream = graph
            .neighbors_directed(current, Direction::Incoming)
            .filter(|i| remaining.contains(i))
            .min();

        let Some(upstream) = upstream else {
            let mut names: Vec<_> = remaining.iter().copied().collect();
            names.sort();
            return names.into_iter().map(name).collect();
        };

        if let Some(&position) = seen.get(&upstream) {
            let mut cycle: Vec<String> = path[position..].iter().rev().copied().map(name).collect();
            if let Some(first) = cycle.first().cloned() {
                cycle.push(first);
            }
            return cycle;
        }

        seen.insert(upstream, path.len());
        path.push(upstream);
        current = upstream;
    }
}

/// Renders the graph as a Mermaid flowchart. Parameters are drawn as
/// rounded nodes, ordering-only edges as dotted arrows.
impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph LR")?;

        for (id, (name, _)) in self.params.defaults().enumerate() {
            writeln!(f, "    p{}([\"{}\"])", id, escape(name))?;
        }

        for index in self.graph.node_indices() {
            let node = &self.graph[index];
            let name = escape(&node.name);

            if node.is_cacheable() {
                writeln!(f, "    {}[(\"{}\")]", index.index(), name)?;
            } else {
                writeln!(f, "    {}[\"{}\"]", index.index(), name)?;
            }

            for input in &node.inputs {
                if let InputRef::Param(id) = input {
                    writeln!(f, "    p{} --> {}", id, index.index())?;
                }
            }
        }

        for edge in self.graph.edge_references() {
            let (source, target) = (edge.source().index(), edge.target().index());

            match edge.weight() {
                Edge::Data => {
                    let type_name = self.graph[edge.source()]
                        .task
                        .output_type_name()
                        .replace('<', "&lt;")
                        .replace('>', "&gt;");
                    writeln!(f, "    {source} -- \"{type_name}\" --> {target}")?;
                }
                Edge::Order => writeln!(f, "    {source} -.-> {target}")?,
            }
        }

        Ok(())
    }
}

fn escape(name: &str) -> String {
    name.replace('"', "\\\"")
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("tasks", &self.order().collect::<Vec<_>>())
            .field("params", &self.params.len())
            .finish()
    }
}
