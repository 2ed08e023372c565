//! Nodes of a task graph.

use anyhow::Result;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

/// Identifier of a [`TaskNode`]. Identifiers are unique across all graphs in
/// the process, so a node keeps its identifier when its graph is nested into
/// another one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskNodeID(u64);

/// The unit of work executed by a functional [`TaskNode`].
pub type TaskWork = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// A named node in a [`TaskGraph`](crate::TaskGraph).
///
/// A node either wraps a unit of work (a functional node) or is virtual and
/// only participates in ordering. Cloning a node gives a handle with the
/// same identifier sharing the same work.
#[derive(Clone)]
pub struct TaskNode {
    id: TaskNodeID,
    name: String,
    work: Option<TaskWork>,
    critical: bool,
    enabled: bool,
    compute_time: Duration,
}

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

impl TaskNodeID {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskNodeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl nohash_hasher::IsEnabled for TaskNodeID {}

impl TaskNode {
    /// Creates a functional node executing the given closure.
    pub fn new(name: impl Into<String>, work: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        Self::with_work(name, Some(Arc::new(work)))
    }

    /// Creates a node without any work.
    pub fn new_virtual(name: impl Into<String>) -> Self {
        Self::with_work(name, None)
    }

    fn with_work(name: impl Into<String>, work: Option<TaskWork>) -> Self {
        Self {
            id: TaskNodeID::next(),
            name: name.into(),
            work,
            critical: false,
            enabled: true,
            compute_time: Duration::ZERO,
        }
    }

    /// Marks the node as critical, meaning it must never run concurrently
    /// with another critical node.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn id(&self) -> TaskNodeID {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Whether the node has work to execute.
    pub fn is_functional(&self) -> bool {
        self.work.is_some()
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn set_critical(&mut self, critical: bool) {
        self.critical = critical;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// The duration of the last timed execution of the node.
    pub fn compute_time(&self) -> Duration {
        self.compute_time
    }

    pub fn set_compute_time(&mut self, compute_time: Duration) {
        self.compute_time = compute_time;
    }

    /// Executes the work of the node. Virtual nodes do nothing.
    pub fn execute(&self) -> Result<()> {
        match &self.work {
            Some(work) => work(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("functional", &self.is_functional())
            .field("critical", &self.critical)
            .field("enabled", &self.enabled)
            .field("compute_time", &self.compute_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn created_nodes_get_distinct_ids() {
        let a = TaskNode::new_virtual("a");
        let b = TaskNode::new_virtual("a");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn cloned_node_keeps_id_and_shares_work() {
        let count = Arc::new(AtomicUsize::new(0));
        let node = {
            let count = Arc::clone(&count);
            TaskNode::new("count", move || {
                count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
        };
        let clone = node.clone();

        node.execute().unwrap();
        clone.execute().unwrap();

        assert_eq!(clone.id(), node.id());
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn virtual_node_is_not_functional_and_executes_nothing() {
        let node = TaskNode::new_virtual("marker");
        assert!(!node.is_functional());
        assert!(node.execute().is_ok());
    }

    #[test]
    fn critical_builder_sets_flag() {
        assert!(TaskNode::new_virtual("c").critical().is_critical());
        assert!(!TaskNode::new_virtual("c").is_critical());
    }
}
