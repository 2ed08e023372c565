//! Execution of task graphs.

use crate::{graph::TaskGraph, node::TaskNodeID};
use anyhow::{Context, Result, bail};
use std::time::Instant;

/// Executes the nodes of a [`TaskGraph`] one at a time on the calling thread,
/// in an order consistent with all edges of the graph.
///
/// The ordering is computed once by [`initialize`](Self::initialize) and must
/// be recomputed whenever the structure of the graph changes.
#[derive(Clone, Debug, Default)]
pub struct SequentialTaskGraphExecutor {
    ordering: Vec<TaskNodeID>,
    timing_enabled: bool,
}

impl SequentialTaskGraphExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the compute time of each node is recorded in the graph during
    /// execution.
    pub fn timing_enabled(&self) -> bool {
        self.timing_enabled
    }

    pub fn set_timing_enabled(&mut self, timing_enabled: bool) {
        self.timing_enabled = timing_enabled;
    }

    /// Computes the execution order for the given graph.
    ///
    /// # Errors
    /// Returns an error if the graph has a cycle.
    pub fn initialize(&mut self, graph: &TaskGraph) -> Result<()> {
        self.ordering = graph
            .topological_sort()
            .context("Failed to initialize task graph executor")?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        !self.ordering.is_empty()
    }

    /// The order in which nodes are executed.
    pub fn ordering(&self) -> &[TaskNodeID] {
        &self.ordering
    }

    /// Executes every enabled functional node of the given graph in order.
    /// Virtual and disabled nodes are skipped.
    ///
    /// # Errors
    /// Returns an error if the executor has not been initialized, if the
    /// graph is missing a node of the ordering, or if any node fails. No
    /// further nodes are executed after a failure.
    pub fn execute(&self, graph: &mut TaskGraph) -> Result<()> {
        if !self.is_initialized() {
            bail!("Tried to execute task graph before initializing executor");
        }

        for &node_id in &self.ordering {
            let Some(node) = graph.node_mut(node_id) else {
                bail!("Task node {node_id} does not exist in graph, executor must be re-initialized");
            };

            if !node.is_functional() || !node.is_enabled() {
                continue;
            }

            if self.timing_enabled {
                let start_time = Instant::now();
                isolevel_log::with_trace_logging!("Executing task {}", node.name(); node.execute())
                    .with_context(|| format!("Task {} failed", node.name()))?;
                node.set_compute_time(start_time.elapsed());
            } else {
                isolevel_log::with_trace_logging!("Executing task {}", node.name(); node.execute())
                    .with_context(|| format!("Task {} failed", node.name()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::TaskNode;
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use std::{sync::Arc, time::Duration};

    fn recording_node(name: &'static str, record: &Arc<Mutex<Vec<&'static str>>>) -> TaskNode {
        let record = Arc::clone(record);
        TaskNode::new(name, move || {
            record.lock().push(name);
            Ok(())
        })
    }

    #[test]
    fn executing_uninitialized_executor_fails() {
        let mut graph = TaskGraph::new();
        let executor = SequentialTaskGraphExecutor::new();
        assert!(executor.execute(&mut graph).is_err());
    }

    #[test]
    fn initializing_with_cyclic_graph_fails() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(TaskNode::new_virtual("a"));
        let b = graph.add_node(TaskNode::new_virtual("b"));
        graph.add_edges(&[(a, b), (b, a)]).unwrap();

        let mut executor = SequentialTaskGraphExecutor::new();
        let error = executor.initialize(&graph).unwrap_err();
        assert!(format!("{error:#}").contains("circular"));
    }

    #[test]
    fn nodes_execute_in_dependency_order() {
        let record = Arc::new(Mutex::new(Vec::new()));

        let mut graph = TaskGraph::new();
        let third = graph.add_node(recording_node("third", &record));
        let first = graph.add_node(recording_node("first", &record));
        let second = graph.add_node(recording_node("second", &record));
        graph
            .add_chain(&[graph.source(), first, second, third, graph.sink()])
            .unwrap();

        let mut executor = SequentialTaskGraphExecutor::new();
        executor.initialize(&graph).unwrap();
        executor.execute(&mut graph).unwrap();

        assert_eq!(*record.lock(), ["first", "second", "third"]);
    }

    #[test]
    fn disabled_nodes_are_skipped() {
        let record = Arc::new(Mutex::new(Vec::new()));

        let mut graph = TaskGraph::new();
        let kept = graph.add_node(recording_node("kept", &record));
        let disabled = graph.add_node(recording_node("disabled", &record));
        graph.add_chain(&[graph.source(), disabled, kept]).unwrap();
        graph.node_mut(disabled).unwrap().set_enabled(false);

        let mut executor = SequentialTaskGraphExecutor::new();
        executor.initialize(&graph).unwrap();
        executor.execute(&mut graph).unwrap();

        assert_eq!(*record.lock(), ["kept"]);
    }

    #[test]
    fn failing_node_stops_execution_and_names_task() {
        let record = Arc::new(Mutex::new(Vec::new()));

        let mut graph = TaskGraph::new();
        let failing = graph.add_function("Broken Task", || Err(anyhow!("broken")));
        let after = graph.add_node(recording_node("after", &record));
        graph.add_chain(&[graph.source(), failing, after]).unwrap();

        let mut executor = SequentialTaskGraphExecutor::new();
        executor.initialize(&graph).unwrap();
        let error = executor.execute(&mut graph).unwrap_err();

        assert!(error.to_string().contains("Broken Task"));
        assert!(record.lock().is_empty());
    }

    #[test]
    fn timing_records_compute_time() {
        let mut graph = TaskGraph::new();
        let sleeper = graph.add_function("sleep", || {
            std::thread::sleep(Duration::from_millis(2));
            Ok(())
        });
        graph.add_chain(&[graph.source(), sleeper, graph.sink()]).unwrap();

        let mut executor = SequentialTaskGraphExecutor::new();
        executor.set_timing_enabled(true);
        executor.initialize(&graph).unwrap();
        executor.execute(&mut graph).unwrap();

        assert!(graph.node(sleeper).unwrap().compute_time() >= Duration::from_millis(2));
    }

    #[test]
    fn executing_after_node_removal_requires_reinitialization() {
        let mut graph = TaskGraph::new();
        let a = graph.add_function("a", || Ok(()));
        graph.add_chain(&[graph.source(), a, graph.sink()]).unwrap();

        let mut executor = SequentialTaskGraphExecutor::new();
        executor.initialize(&graph).unwrap();
        graph.remove_node(a);

        assert!(executor.execute(&mut graph).is_err());
        executor.initialize(&graph).unwrap();
        assert!(executor.execute(&mut graph).is_ok());
    }
}
