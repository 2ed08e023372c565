//! Task graph for advancing a level-set model.

use crate::model::LevelSetModel;
use anyhow::Result;
use isolevel_scheduling::{TaskGraph, TaskNode, TaskNodeID};
use parking_lot::Mutex;
use std::sync::Arc;

/// The steps of one level-set evolution as a [`TaskGraph`].
///
/// The graph has two virtual nodes bracketing the computation of
/// velocities, which other subsystems use to order their impulse sources,
/// and one functional node per evolved quantity. The distances are the only
/// quantity evolved here.
#[derive(Debug)]
pub struct LevelSetTaskGraph {
    task_graph: TaskGraph,
    generate_velocities_begin: TaskNodeID,
    generate_velocities_end: TaskNodeID,
    evolve_quantity_nodes: Vec<TaskNodeID>,
}

impl LevelSetTaskGraph {
    /// Creates the graph nodes for evolving the given model. No edges are
    /// added until [`init_graph_edges`](Self::init_graph_edges) is called.
    pub fn new(model: &Arc<Mutex<LevelSetModel>>) -> Self {
        let mut task_graph = TaskGraph::new();

        let generate_velocities_begin =
            task_graph.add_node(TaskNode::new_virtual("Compute Velocities Begin"));
        let generate_velocities_end =
            task_graph.add_node(TaskNode::new_virtual("Compute Velocities End"));

        let model = Arc::clone(model);
        let evolve_distances = task_graph.add_function("Evolve Distances", move || model.lock().evolve());

        Self {
            task_graph,
            generate_velocities_begin,
            generate_velocities_end,
            evolve_quantity_nodes: vec![evolve_distances],
        }
    }

    /// Wires `source → begin → end → evolve → sink` for every evolved
    /// quantity. The quantities do not interact, so they are left unordered
    /// relative to each other.
    pub fn init_graph_edges(&mut self, source: TaskNodeID, sink: TaskNodeID) -> Result<()> {
        self.task_graph
            .add_edge(source, self.generate_velocities_begin)?;
        self.task_graph
            .add_edge(self.generate_velocities_begin, self.generate_velocities_end)?;

        for &evolve_node in &self.evolve_quantity_nodes {
            self.task_graph
                .add_edge(self.generate_velocities_end, evolve_node)?;
            self.task_graph.add_edge(evolve_node, sink)?;
        }
        Ok(())
    }

    pub fn task_graph(&self) -> &TaskGraph {
        &self.task_graph
    }

    pub fn task_graph_mut(&mut self) -> &mut TaskGraph {
        &mut self.task_graph
    }

    pub fn generate_velocities_begin_node(&self) -> TaskNodeID {
        self.generate_velocities_begin
    }

    pub fn generate_velocities_end_node(&self) -> TaskNodeID {
        self.generate_velocities_end
    }

    /// The node evolving the quantity with the given index, where index zero
    /// is the distances.
    pub fn quantity_evolve_node(&self, idx: usize) -> Option<TaskNodeID> {
        self.evolve_quantity_nodes.get(idx).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LevelSetConfig;
    use isolevel_field::ImageData;
    use isolevel_scheduling::SequentialTaskGraphExecutor;
    use isolevel_thread::RayonThreadPool;
    use nalgebra::{Point3, Vector3, vector};
    use std::num::NonZeroUsize;

    fn shared_model() -> Arc<Mutex<LevelSetModel>> {
        let pool = RayonThreadPool::shared(NonZeroUsize::new(1)).unwrap();
        let mut model = LevelSetModel::new(pool);
        model.attach_geometry(
            ImageData::from_fn([5, 5, 5], Vector3::repeat(1.0), Point3::origin(), |p| p.x - 2.0)
                .unwrap(),
        );
        model
            .configure(LevelSetConfig {
                sparse_update: true,
                dt: 0.1,
                ..LevelSetConfig::default()
            })
            .unwrap();
        model.initialize().unwrap();
        Arc::new(Mutex::new(model))
    }

    #[test]
    fn graph_has_named_nodes() {
        let graph = LevelSetTaskGraph::new(&shared_model());
        let task_graph = graph.task_graph();

        let name = |node_id| task_graph.node(node_id).unwrap().name().to_string();
        assert_eq!(name(graph.generate_velocities_begin_node()), "Compute Velocities Begin");
        assert_eq!(name(graph.generate_velocities_end_node()), "Compute Velocities End");
        assert_eq!(name(graph.quantity_evolve_node(0).unwrap()), "Evolve Distances");
        assert!(graph.quantity_evolve_node(1).is_none());
    }

    #[test]
    fn edges_order_velocities_before_evolution() {
        let mut graph = LevelSetTaskGraph::new(&shared_model());
        let (source, sink) = (graph.task_graph().source(), graph.task_graph().sink());
        graph.init_graph_edges(source, sink).unwrap();

        let evolve = graph.quantity_evolve_node(0).unwrap();
        let task_graph = graph.task_graph();
        assert!(task_graph.contains_edge(source, graph.generate_velocities_begin_node()));
        assert!(task_graph.is_reachable(graph.generate_velocities_end_node(), evolve));
        assert!(task_graph.contains_edge(evolve, sink));
    }

    #[test]
    fn executing_graph_evolves_model() {
        let model = shared_model();
        let coords = vector![1, 2, 2];
        model.lock().add_impulse(&coords, 1.0);
        let before = model.lock().image().unwrap().value_at_coords(&coords);

        let mut graph = LevelSetTaskGraph::new(&model);
        let (source, sink) = (graph.task_graph().source(), graph.task_graph().sink());
        graph.init_graph_edges(source, sink).unwrap();

        let mut executor = SequentialTaskGraphExecutor::new();
        executor.initialize(graph.task_graph()).unwrap();
        executor.execute(graph.task_graph_mut()).unwrap();

        let model = model.lock();
        assert!(model.image().unwrap().value_at_coords(&coords) > before);
        assert_eq!(model.n_nodes_to_update(), 0);
    }
}
