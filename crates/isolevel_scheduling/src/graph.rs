//! Directed acyclic graphs of task nodes.

use crate::node::{TaskNode, TaskNodeID};
use anyhow::{Result, anyhow, bail};
use isolevel_log::warn;
use nohash_hasher::IntMap;
use petgraph::{Direction, algo, graphmap::DiGraphMap};
use std::{collections::HashMap, time::Duration};

/// Map from node identifiers to values.
pub type TaskNodeMap<T> = IntMap<TaskNodeID, T>;

/// A graph of [`TaskNode`]s where an edge `a → b` means that `a` must
/// complete before `b` starts.
///
/// Every graph has a virtual source and sink node, which can not be removed.
/// Nodes are stored by identifier, and edges refer to nodes only through
/// their identifiers, so nesting one graph into another copies nodes and
/// rewrites edge endpoints without invalidating any identifiers held by the
/// subsystem that built the nested graph.
#[derive(Clone, Debug)]
pub struct TaskGraph {
    nodes: TaskNodeMap<TaskNode>,
    edges: DiGraphMap<TaskNodeID, ()>,
    source: TaskNodeID,
    sink: TaskNodeID,
}

impl TaskGraph {
    /// Creates a graph holding only a source node named `Source` and a sink
    /// node named `Sink`.
    pub fn new() -> Self {
        Self::with_source_and_sink_names("Source", "Sink")
    }

    /// Creates a graph whose source and sink nodes have the given names.
    pub fn with_source_and_sink_names(
        source_name: impl Into<String>,
        sink_name: impl Into<String>,
    ) -> Self {
        let source = TaskNode::new_virtual(source_name);
        let sink = TaskNode::new_virtual(sink_name);

        let mut graph = Self {
            nodes: TaskNodeMap::default(),
            edges: DiGraphMap::new(),
            source: source.id(),
            sink: sink.id(),
        };
        graph.add_node(source);
        graph.add_node(sink);
        graph
    }

    pub fn source(&self) -> TaskNodeID {
        self.source
    }

    pub fn sink(&self) -> TaskNodeID {
        self.sink
    }

    pub fn n_nodes(&self) -> usize {
        self.edges.node_count()
    }

    pub fn n_edges(&self) -> usize {
        self.edges.edge_count()
    }

    pub fn node(&self, node_id: TaskNodeID) -> Option<&TaskNode> {
        self.nodes.get(&node_id)
    }

    pub fn node_mut(&mut self, node_id: TaskNodeID) -> Option<&mut TaskNode> {
        self.nodes.get_mut(&node_id)
    }

    /// Returns the identifiers of all nodes, including the source and sink.
    pub fn node_ids(&self) -> impl Iterator<Item = TaskNodeID> + '_ {
        self.edges.nodes()
    }

    /// Returns all nodes, including the source and sink.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.edges.nodes().map(|node_id| &self.nodes[&node_id])
    }

    /// Returns every edge as a `(from, to)` pair.
    pub fn edges(&self) -> impl Iterator<Item = (TaskNodeID, TaskNodeID)> + '_ {
        self.edges.all_edges().map(|(from, to, _)| (from, to))
    }

    /// Returns the nodes with an edge into the given node.
    pub fn inputs(&self, node_id: TaskNodeID) -> impl Iterator<Item = TaskNodeID> + '_ {
        self.edges.neighbors_directed(node_id, Direction::Incoming)
    }

    /// Returns the nodes with an edge from the given node.
    pub fn outputs(&self, node_id: TaskNodeID) -> impl Iterator<Item = TaskNodeID> + '_ {
        self.edges.neighbors_directed(node_id, Direction::Outgoing)
    }

    pub fn contains_node(&self, node_id: TaskNodeID) -> bool {
        self.edges.contains_node(node_id)
    }

    /// Returns the first node with the given name, if any.
    pub fn find_node_by_name(&self, name: &str) -> Option<TaskNodeID> {
        self.nodes()
            .find(|node| node.name() == name)
            .map(TaskNode::id)
    }

    /// Adds the given node to the graph and returns its identifier. Adding
    /// a node that is already present has no effect.
    pub fn add_node(&mut self, node: TaskNode) -> TaskNodeID {
        let node_id = node.id();
        if !self.contains_node(node_id) {
            self.edges.add_node(node_id);
            self.nodes.insert(node_id, node);
        }
        node_id
    }

    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = TaskNode>) {
        for node in nodes {
            self.add_node(node);
        }
    }

    /// Adds a functional node with the given name and work.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        work: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) -> TaskNodeID {
        self.add_node(TaskNode::new(name, work))
    }

    /// Removes the given node along with all its edges. The source and sink
    /// can not be removed.
    pub fn remove_node(&mut self, node_id: TaskNodeID) -> Option<TaskNode> {
        if node_id == self.source || node_id == self.sink {
            warn!("Refusing to remove source or sink node {node_id} from task graph");
            return None;
        }
        self.edges.remove_node(node_id);
        self.nodes.remove(&node_id)
    }

    /// Removes the given node after connecting each of its inputs to each of
    /// its outputs, so that the ordering it imposed is kept.
    pub fn remove_node_and_redirect(&mut self, node_id: TaskNodeID) -> Option<TaskNode> {
        if !self.contains_node(node_id) {
            return None;
        }
        let inputs: Vec<_> = self.inputs(node_id).collect();
        let outputs: Vec<_> = self.outputs(node_id).collect();

        let node = self.remove_node(node_id)?;

        for &input in &inputs {
            for &output in &outputs {
                self.edges.add_edge(input, output, ());
            }
        }
        Some(node)
    }

    /// Adds the given node directly after the reference node: the node
    /// takes over all outputs of the reference node, and the reference node
    /// gets the new node as its only output.
    ///
    /// # Errors
    /// Returns an error if the reference node is not in the graph.
    pub fn insert_after(&mut self, reference_id: TaskNodeID, node: TaskNode) -> Result<TaskNodeID> {
        self.ensure_contains_node(reference_id)?;
        let outputs: Vec<_> = self.outputs(reference_id).collect();

        let node_id = self.add_node(node);
        for output in outputs {
            self.edges.remove_edge(reference_id, output);
            self.edges.add_edge(node_id, output, ());
        }
        self.edges.add_edge(reference_id, node_id, ());

        Ok(node_id)
    }

    /// Adds the given node directly before the reference node: the node
    /// takes over all inputs of the reference node, and the reference node
    /// gets the new node as its only input.
    ///
    /// # Errors
    /// Returns an error if the reference node is not in the graph.
    pub fn insert_before(&mut self, reference_id: TaskNodeID, node: TaskNode) -> Result<TaskNodeID> {
        self.ensure_contains_node(reference_id)?;
        let inputs: Vec<_> = self.inputs(reference_id).collect();

        let node_id = self.add_node(node);
        for input in inputs {
            self.edges.remove_edge(input, reference_id);
            self.edges.add_edge(input, node_id, ());
        }
        self.edges.add_edge(node_id, reference_id, ());

        Ok(node_id)
    }

    pub fn contains_edge(&self, from: TaskNodeID, to: TaskNodeID) -> bool {
        self.edges.contains_edge(from, to)
    }

    /// Adds an edge specifying that `from` must complete before `to` starts.
    ///
    /// # Errors
    /// Returns an error if either node is not in the graph.
    pub fn add_edge(&mut self, from: TaskNodeID, to: TaskNodeID) -> Result<()> {
        self.ensure_contains_node(from)?;
        self.ensure_contains_node(to)?;
        self.edges.add_edge(from, to, ());
        Ok(())
    }

    pub fn add_edges(&mut self, edges: &[(TaskNodeID, TaskNodeID)]) -> Result<()> {
        for &(from, to) in edges {
            self.add_edge(from, to)?;
        }
        Ok(())
    }

    /// Adds an edge between each consecutive pair of the given nodes.
    pub fn add_chain(&mut self, node_ids: &[TaskNodeID]) -> Result<()> {
        if node_ids.len() < 2 {
            warn!("Tried to add task chain of fewer than two nodes");
        }
        for pair in node_ids.windows(2) {
            self.add_edge(pair[0], pair[1])?;
        }
        Ok(())
    }

    /// Removes the given edge, returning whether it was present.
    pub fn remove_edge(&mut self, from: TaskNodeID, to: TaskNodeID) -> bool {
        self.edges.remove_edge(from, to).is_some()
    }

    /// Splices the given graph into this graph between `start_id` and
    /// `end_id`.
    ///
    /// All nodes of the child except its source and sink are copied in with
    /// their identifiers, and all child edges are copied with the child's
    /// source replaced by `start_id` and its sink replaced by `end_id`.
    ///
    /// # Errors
    /// Returns an error if `start_id` or `end_id` is not in this graph.
    pub fn nest_graph(&mut self, child: &TaskGraph, start_id: TaskNodeID, end_id: TaskNodeID) -> Result<()> {
        self.ensure_contains_node(start_id)?;
        self.ensure_contains_node(end_id)?;

        let splice = |node_id: TaskNodeID| {
            if node_id == child.source {
                start_id
            } else if node_id == child.sink {
                end_id
            } else {
                node_id
            }
        };

        for node in child.nodes() {
            if node.id() != child.source && node.id() != child.sink {
                self.add_node(node.clone());
            }
        }
        for (from, to) in child.edges() {
            let (from, to) = (splice(from), splice(to));
            if from != to {
                self.edges.add_edge(from, to, ());
            }
        }
        Ok(())
    }

    /// Whether there is a directed path from `from` to `to`.
    pub fn is_reachable(&self, from: TaskNodeID, to: TaskNodeID) -> bool {
        self.contains_node(from)
            && self.contains_node(to)
            && algo::has_path_connecting(&self.edges, from, to, None)
    }

    /// Removes every node except the source and sink, and every edge.
    pub fn clear(&mut self) {
        let source = self.nodes.remove(&self.source);
        let sink = self.nodes.remove(&self.sink);
        self.nodes.clear();
        self.edges.clear();
        self.add_nodes(source.into_iter().chain(sink));
    }

    pub fn is_cyclic(&self) -> bool {
        algo::is_cyclic_directed(&self.edges)
    }

    /// Returns the node identifiers in an order where every node comes after
    /// all nodes with an edge into it.
    ///
    /// # Errors
    /// Returns an error if the graph has a cycle.
    pub fn topological_sort(&self) -> Result<Vec<TaskNodeID>> {
        algo::toposort(&self.edges, None).map_err(|cycle| {
            let node_id = cycle.node_id();
            anyhow!(
                "Found circular task dependencies involving {} ({node_id})",
                self.nodes
                    .get(&node_id)
                    .map_or("<unknown>", TaskNode::name)
            )
        })
    }

    /// Removes every edge `a → b` for which another path from `a` to `b`
    /// exists, which keeps the ordering while minimizing the edge count.
    ///
    /// # Errors
    /// Returns an error, leaving the graph unchanged, if it has a cycle.
    pub fn transitive_reduce(&mut self) -> Result<()> {
        if self.is_cyclic() {
            bail!("Found circular task dependencies, can not reduce task graph");
        }
        let edges: Vec<_> = self.edges().collect();
        for (from, to) in edges {
            self.edges.remove_edge(from, to);
            if !algo::has_path_connecting(&self.edges, from, to, None) {
                self.edges.add_edge(from, to, ());
            }
        }
        Ok(())
    }

    /// Removes every virtual node with exactly one input and one output,
    /// connecting the input directly to the output.
    pub fn remove_redundant_nodes(&mut self) {
        let candidates: Vec<_> = self
            .nodes()
            .filter(|node| !node.is_functional())
            .map(TaskNode::id)
            .filter(|&node_id| node_id != self.source && node_id != self.sink)
            .collect();

        for node_id in candidates {
            if self.inputs(node_id).count() == 1 && self.outputs(node_id).count() == 1 {
                self.remove_node_and_redirect(node_id);
            }
        }
    }

    /// Transitively reduces the graph and then removes redundant nodes.
    pub fn reduce(&mut self) -> Result<()> {
        self.transitive_reduce()?;
        self.remove_redundant_nodes();
        Ok(())
    }

    /// Removes every node, except the source and sink, that has no edges.
    pub fn remove_unused_nodes(&mut self) {
        let unused: Vec<_> = self
            .node_ids()
            .filter(|&node_id| {
                node_id != self.source
                    && node_id != self.sink
                    && self.inputs(node_id).next().is_none()
                    && self.outputs(node_id).next().is_none()
            })
            .collect();

        for node_id in unused {
            self.remove_node(node_id);
        }
    }

    /// Adds edges between critical nodes so that no two of them are left
    /// unordered. New edges follow the current topological order.
    ///
    /// # Errors
    /// Returns an error if the graph has a cycle.
    pub fn resolve_critical_nodes(&mut self) -> Result<()> {
        let critical: Vec<_> = self
            .topological_sort()?
            .into_iter()
            .filter(|node_id| self.nodes[node_id].is_critical())
            .collect();

        for (idx, &earlier) in critical.iter().enumerate() {
            for &later in &critical[idx + 1..] {
                if !self.is_reachable(earlier, later) && !self.is_reachable(later, earlier) {
                    self.edges.add_edge(earlier, later, ());
                }
            }
        }
        Ok(())
    }

    /// Computes a name for every node such that no two nodes share a name.
    /// Duplicated names get a numeric postfix.
    pub fn unique_node_names(&self) -> TaskNodeMap<String> {
        let mut name_counts: HashMap<String, usize> = HashMap::new();
        for node in self.nodes() {
            *name_counts.entry(node.name().to_string()).or_default() += 1;
        }

        let mut unique_names = TaskNodeMap::default();
        for node in self.nodes() {
            let mut name = node.name().to_string();
            let mut postfix = 0;
            while name_counts.get(&name).copied().unwrap_or(0) > 1 {
                if let Some(count) = name_counts.get_mut(&name) {
                    *count -= 1;
                }
                name = format!("{}{postfix}", node.name());
                *name_counts.entry(name.clone()).or_default() += 1;
                postfix += 1;
            }
            unique_names.insert(node.id(), name);
        }
        unique_names
    }

    /// Renames the nodes using the names from
    /// [`unique_node_names`](Self::unique_node_names).
    pub fn make_node_names_unique(&mut self) {
        for (node_id, name) in self.unique_node_names() {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.set_name(name);
            }
        }
    }

    /// Computes the earliest time each node could start if every node took
    /// its recorded compute time and all independent nodes ran in parallel.
    ///
    /// # Errors
    /// Returns an error if the graph has a cycle.
    pub fn node_start_times(&self) -> Result<TaskNodeMap<Duration>> {
        let mut start_times = TaskNodeMap::default();

        for node_id in self.topological_sort()? {
            let start_time = self
                .inputs(node_id)
                .map(|input| start_times[&input] + self.nodes[&input].compute_time())
                .max()
                .unwrap_or(Duration::ZERO);
            start_times.insert(node_id, start_time);
        }
        Ok(start_times)
    }

    /// Finds the chain of nodes leading to the sink that determines the total
    /// duration of the graph, by walking back from the sink through the
    /// input that starts latest.
    ///
    /// # Errors
    /// Returns an error if the graph has a cycle.
    pub fn critical_path(&self) -> Result<Vec<TaskNodeID>> {
        let start_times = self.node_start_times()?;

        let mut path = vec![self.sink];
        let mut current = self.sink;

        while current != self.source {
            let latest_input = self
                .inputs(current)
                .max_by_key(|input| start_times[input]);
            match latest_input {
                Some(input) => {
                    path.push(input);
                    current = input;
                }
                None => break,
            }
        }
        path.reverse();
        Ok(path)
    }

    fn ensure_contains_node(&self, node_id: TaskNodeID) -> Result<()> {
        if !self.contains_node(node_id) {
            bail!("Task node {node_id} does not exist in graph");
        }
        Ok(())
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(name: &str) -> TaskNode {
        TaskNode::new(name, || Ok(()))
    }

    fn position_of(order: &[TaskNodeID], node_id: TaskNodeID) -> usize {
        order.iter().position(|&id| id == node_id).unwrap()
    }

    fn assert_order_respects_edges(graph: &TaskGraph, order: &[TaskNodeID]) {
        assert_eq!(order.len(), graph.n_nodes());
        for (from, to) in graph.edges() {
            assert!(position_of(order, from) < position_of(order, to));
        }
    }

    #[test]
    fn creating_graph_gives_source_and_sink_only() {
        let graph = TaskGraph::new();
        assert_eq!(graph.n_nodes(), 2);
        assert_eq!(graph.n_edges(), 0);
        assert_eq!(graph.node(graph.source()).unwrap().name(), "Source");
        assert_eq!(graph.node(graph.sink()).unwrap().name(), "Sink");
    }

    #[test]
    fn adding_same_node_twice_has_no_effect() {
        let mut graph = TaskGraph::new();
        let a = node("a");
        graph.add_node(a.clone());
        graph.add_node(a);
        assert_eq!(graph.n_nodes(), 3);
    }

    #[test]
    fn adding_edge_to_missing_node_fails() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let missing = node("missing").id();

        let result = graph.add_edge(a, missing);
        assert!(result.unwrap_err().to_string().contains("does not exist in graph"));
        assert_eq!(graph.n_edges(), 0);
    }

    #[test]
    fn adding_chain_connects_consecutive_nodes() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let b = graph.add_node(node("b"));
        graph
            .add_chain(&[graph.source(), a, b, graph.sink()])
            .unwrap();

        assert!(graph.contains_edge(graph.source(), a));
        assert!(graph.contains_edge(a, b));
        assert!(graph.contains_edge(b, graph.sink()));
        assert_eq!(graph.n_edges(), 3);
    }

    #[test]
    fn adding_chain_of_one_node_adds_nothing() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        graph.add_chain(&[a]).unwrap();
        assert_eq!(graph.n_edges(), 0);
    }

    #[test]
    fn removing_node_removes_its_edges() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        graph.add_chain(&[graph.source(), a, graph.sink()]).unwrap();

        let removed = graph.remove_node(a).unwrap();

        assert_eq!(removed.name(), "a");
        assert!(!graph.contains_node(a));
        assert_eq!(graph.n_edges(), 0);
    }

    #[test]
    fn source_and_sink_can_not_be_removed() {
        let mut graph = TaskGraph::new();
        assert!(graph.remove_node(graph.source()).is_none());
        assert!(graph.remove_node(graph.sink()).is_none());
        assert_eq!(graph.n_nodes(), 2);
    }

    #[test]
    fn removing_node_and_redirecting_keeps_ordering() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let b = graph.add_node(node("b"));
        let c = graph.add_node(node("c"));
        graph.add_edges(&[(a, c), (b, c), (c, graph.sink())]).unwrap();

        graph.remove_node_and_redirect(c).unwrap();

        assert!(graph.contains_edge(a, graph.sink()));
        assert!(graph.contains_edge(b, graph.sink()));
        assert_eq!(graph.n_edges(), 2);
    }

    #[test]
    fn inserting_after_takes_over_outputs() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let b = graph.add_node(node("b"));
        graph.add_edges(&[(a, b), (a, graph.sink())]).unwrap();

        let inserted = graph.insert_after(a, node("inserted")).unwrap();

        assert_eq!(graph.outputs(a).collect::<Vec<_>>(), [inserted]);
        assert!(graph.contains_edge(inserted, b));
        assert!(graph.contains_edge(inserted, graph.sink()));
    }

    #[test]
    fn inserting_before_takes_over_inputs() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let b = graph.add_node(node("b"));
        graph.add_edges(&[(graph.source(), b), (a, b)]).unwrap();

        let inserted = graph.insert_before(b, node("inserted")).unwrap();

        assert_eq!(graph.inputs(b).collect::<Vec<_>>(), [inserted]);
        assert!(graph.contains_edge(graph.source(), inserted));
        assert!(graph.contains_edge(a, inserted));
    }

    #[test]
    fn inserting_relative_to_missing_node_fails() {
        let mut graph = TaskGraph::new();
        let missing = node("missing").id();
        assert!(graph.insert_after(missing, node("a")).is_err());
        assert!(graph.insert_before(missing, node("a")).is_err());
        assert_eq!(graph.n_nodes(), 2);
    }

    #[test]
    fn finding_node_by_name_works() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        assert_eq!(graph.find_node_by_name("a"), Some(a));
        assert_eq!(graph.find_node_by_name("b"), None);
    }

    #[test]
    fn reachability_follows_edge_direction() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let b = graph.add_node(node("b"));
        let c = graph.add_node(node("c"));
        graph.add_chain(&[a, b, c]).unwrap();

        assert!(graph.is_reachable(a, c));
        assert!(!graph.is_reachable(c, a));
        assert!(!graph.is_reachable(a, graph.sink()));
    }

    #[test]
    fn clearing_keeps_only_source_and_sink() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        graph.add_chain(&[graph.source(), a, graph.sink()]).unwrap();

        graph.clear();

        assert_eq!(graph.n_nodes(), 2);
        assert_eq!(graph.n_edges(), 0);
        assert!(graph.contains_node(graph.source()));
        assert!(graph.contains_node(graph.sink()));
    }

    #[test]
    fn sorting_diamond_puts_dependencies_first() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let b = graph.add_node(node("b"));
        let c = graph.add_node(node("c"));
        graph
            .add_edges(&[
                (graph.source(), a),
                (a, b),
                (a, c),
                (b, graph.sink()),
                (c, graph.sink()),
            ])
            .unwrap();

        let order = graph.topological_sort().unwrap();

        assert_order_respects_edges(&graph, &order);
        assert_eq!(order.first(), Some(&graph.source()));
        assert_eq!(order.last(), Some(&graph.sink()));
    }

    #[test]
    fn sorting_cyclic_graph_fails() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let b = graph.add_node(node("b"));
        graph.add_edges(&[(a, b), (b, a)]).unwrap();

        assert!(graph.is_cyclic());
        let result = graph.topological_sort();
        assert!(result.unwrap_err().to_string().contains("circular"));
    }

    #[test]
    fn nesting_splices_child_between_given_nodes() {
        let mut child = TaskGraph::new();
        let x = child.add_node(node("x"));
        let y = child.add_node(node("y"));
        child.add_chain(&[child.source(), x, y, child.sink()]).unwrap();

        let mut parent = TaskGraph::new();
        let begin = parent.add_node(TaskNode::new_virtual("begin"));
        let end = parent.add_node(TaskNode::new_virtual("end"));
        parent
            .add_chain(&[parent.source(), begin, end, parent.sink()])
            .unwrap();

        parent.nest_graph(&child, begin, end).unwrap();

        assert_eq!(parent.n_nodes(), 6);
        assert!(!parent.contains_node(child.source()));
        assert!(!parent.contains_node(child.sink()));
        assert!(parent.contains_edge(begin, x));
        assert!(parent.contains_edge(x, y));
        assert!(parent.contains_edge(y, end));
        assert_order_respects_edges(&parent, &parent.topological_sort().unwrap());
    }

    #[test]
    fn nesting_between_missing_nodes_fails() {
        let child = TaskGraph::new();
        let mut parent = TaskGraph::new();
        let missing = node("missing").id();
        assert!(parent.nest_graph(&child, missing, parent.sink()).is_err());
    }

    #[test]
    fn transitive_reduction_removes_shortcut_edges() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let b = graph.add_node(node("b"));
        let c = graph.add_node(node("c"));
        graph.add_edges(&[(a, b), (b, c), (a, c)]).unwrap();

        graph.transitive_reduce().unwrap();

        assert!(graph.contains_edge(a, b));
        assert!(graph.contains_edge(b, c));
        assert!(!graph.contains_edge(a, c));
    }

    #[test]
    fn transitive_reduction_of_cyclic_graph_fails() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let b = graph.add_node(node("b"));
        graph.add_edges(&[(a, b), (b, a)]).unwrap();

        assert!(graph.transitive_reduce().is_err());
        assert_eq!(graph.n_edges(), 2);
    }

    #[test]
    fn removing_redundant_nodes_removes_virtual_pass_through_nodes() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let virtual_node = graph.add_node(TaskNode::new_virtual("virtual"));
        let b = graph.add_node(node("b"));
        graph
            .add_chain(&[graph.source(), a, virtual_node, b, graph.sink()])
            .unwrap();

        graph.remove_redundant_nodes();

        assert!(!graph.contains_node(virtual_node));
        assert!(graph.contains_edge(a, b));
        assert!(graph.contains_node(a));
        assert!(graph.contains_node(b));
    }

    #[test]
    fn removing_redundant_nodes_keeps_virtual_join_nodes() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let b = graph.add_node(node("b"));
        let join = graph.add_node(TaskNode::new_virtual("join"));
        graph
            .add_edges(&[(a, join), (b, join), (join, graph.sink())])
            .unwrap();

        graph.remove_redundant_nodes();

        assert!(graph.contains_node(join));
    }

    #[test]
    fn reducing_combines_both_reductions() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(node("a"));
        let virtual_node = graph.add_node(TaskNode::new_virtual("virtual"));
        graph
            .add_edges(&[
                (graph.source(), a),
                (a, virtual_node),
                (virtual_node, graph.sink()),
                (a, graph.sink()),
            ])
            .unwrap();

        graph.reduce().unwrap();

        assert!(!graph.contains_node(virtual_node));
        assert!(graph.contains_edge(a, graph.sink()));
        assert_eq!(graph.n_edges(), 2);
    }

    #[test]
    fn removing_unused_nodes_keeps_connected_nodes() {
        let mut graph = TaskGraph::new();
        let used = graph.add_node(node("used"));
        let unused = graph.add_node(node("unused"));
        graph.add_chain(&[graph.source(), used]).unwrap();

        graph.remove_unused_nodes();

        assert!(graph.contains_node(used));
        assert!(!graph.contains_node(unused));
        assert!(graph.contains_node(graph.sink()));
    }

    #[test]
    fn resolving_critical_nodes_orders_them() {
        let mut graph = TaskGraph::new();
        let b = graph.add_node(node("b").critical());
        let c = graph.add_node(node("c").critical());
        let d = graph.add_node(node("d"));
        graph
            .add_edges(&[
                (graph.source(), b),
                (graph.source(), c),
                (b, d),
                (c, d),
                (d, graph.sink()),
            ])
            .unwrap();

        graph.resolve_critical_nodes().unwrap();

        assert!(graph.contains_edge(b, c) || graph.contains_edge(c, b));
        assert!(!graph.is_cyclic());
    }

    #[test]
    fn unique_names_get_numeric_postfixes() {
        let mut graph = TaskGraph::new();
        let first = graph.add_node(node("a"));
        let second = graph.add_node(node("a"));
        let other = graph.add_node(node("b"));

        graph.make_node_names_unique();

        let first_name = graph.node(first).unwrap().name().to_string();
        let second_name = graph.node(second).unwrap().name().to_string();
        assert_ne!(first_name, second_name);
        assert!(first_name.starts_with('a'));
        assert!(second_name.starts_with('a'));
        assert_eq!(graph.node(other).unwrap().name(), "b");
    }

    #[test]
    fn start_times_accumulate_along_longest_path() {
        let mut graph = TaskGraph::new();
        let slow = graph.add_node(node("slow"));
        let fast = graph.add_node(node("fast"));
        graph
            .add_edges(&[
                (graph.source(), slow),
                (graph.source(), fast),
                (slow, graph.sink()),
                (fast, graph.sink()),
            ])
            .unwrap();
        graph
            .node_mut(slow)
            .unwrap()
            .set_compute_time(Duration::from_millis(5));
        graph
            .node_mut(fast)
            .unwrap()
            .set_compute_time(Duration::from_millis(1));

        let start_times = graph.node_start_times().unwrap();
        assert_eq!(start_times[&graph.sink()], Duration::from_millis(5));

        let path = graph.critical_path().unwrap();
        assert_eq!(path, [graph.source(), slow, graph.sink()]);
    }

    prop_compose! {
        fn random_dag_edges()(n_nodes in 1_usize..16)(
            n_nodes in Just(n_nodes),
            edges in prop::collection::vec((0..n_nodes, 0..n_nodes), 0..40),
        ) -> (usize, Vec<(usize, usize)>) {
            // Only keep edges from lower to higher indices so the graph is acyclic
            let edges = edges.into_iter().filter(|(from, to)| from < to).collect();
            (n_nodes, edges)
        }
    }

    proptest! {
        #[test]
        fn topological_sort_respects_every_edge((n_nodes, edges) in random_dag_edges()) {
            let mut graph = TaskGraph::new();
            let ids: Vec<_> = (0..n_nodes).map(|idx| graph.add_node(node(&idx.to_string()))).collect();
            for (from, to) in edges {
                graph.add_edge(ids[from], ids[to]).unwrap();
            }

            let order = graph.topological_sort().unwrap();
            prop_assert_eq!(order.len(), graph.n_nodes());
            for (from, to) in graph.edges() {
                prop_assert!(position_of(&order, from) < position_of(&order, to));
            }
        }

        #[test]
        fn nested_graph_stays_acyclic_and_sortable((n_nodes, edges) in random_dag_edges()) {
            let mut child = TaskGraph::new();
            let ids: Vec<_> = (0..n_nodes).map(|idx| child.add_node(node(&idx.to_string()))).collect();
            for (from, to) in edges {
                child.add_edge(ids[from], ids[to]).unwrap();
            }
            for &id in &ids {
                child.add_edge(child.source(), id).unwrap();
                child.add_edge(id, child.sink()).unwrap();
            }

            let mut parent = TaskGraph::new();
            parent.nest_graph(&child, parent.source(), parent.sink()).unwrap();

            prop_assert!(!parent.is_cyclic());
            let order = parent.topological_sort().unwrap();
            prop_assert_eq!(order.first(), Some(&parent.source()));
            prop_assert_eq!(order.last(), Some(&parent.sink()));
        }

        #[test]
        fn transitive_reduction_preserves_reachability((n_nodes, edges) in random_dag_edges()) {
            let mut graph = TaskGraph::new();
            let ids: Vec<_> = (0..n_nodes).map(|idx| graph.add_node(node(&idx.to_string()))).collect();
            for (from, to) in edges {
                graph.add_edge(ids[from], ids[to]).unwrap();
            }
            let original = graph.clone();

            graph.transitive_reduce().unwrap();

            for &from in &ids {
                for &to in &ids {
                    prop_assert_eq!(graph.is_reachable(from, to), original.is_reachable(from, to));
                }
            }
        }
    }

    #[test]
    fn cycle_introduced_after_nesting_is_detected() {
        let mut child = TaskGraph::new();
        let x = child.add_node(node("x"));
        child.add_chain(&[child.source(), x, child.sink()]).unwrap();

        let mut parent = TaskGraph::new();
        parent.nest_graph(&child, parent.source(), parent.sink()).unwrap();
        parent.add_edge(parent.sink(), x).unwrap();

        assert!(parent.topological_sort().is_err());
    }
}
