//! Task graphs for sequencing the steps of a simulation.
//!
//! A [`TaskGraph`] holds named [`TaskNode`]s connected by "must execute
//! before" edges between a designated source and sink node. Subsystems build
//! their own graphs and parents splice them into a larger graph with
//! [`TaskGraph::nest_graph`]. The [`SequentialTaskGraphExecutor`] runs the
//! nodes of a finished graph in topological order.

mod executor;
mod graph;
mod node;

pub use executor::SequentialTaskGraphExecutor;
pub use graph::{TaskGraph, TaskNodeMap};
pub use node::{TaskNode, TaskNodeID, TaskWork};
