//! Scenes of simulation objects advanced by a shared task graph.

use crate::{config::SceneConfig, object::LevelSetObject};
use anyhow::{Context, Result, bail};
use isolevel_field::VoxelCoords;
use isolevel_log::{info, with_debug_logging};
use isolevel_scheduling::{SequentialTaskGraphExecutor, TaskGraph, TaskNode, TaskNodeID};
use std::sync::Arc;

/// A set of [`LevelSetObject`]s whose task graphs are nested into one scene
/// graph, which is executed once per frame.
///
/// Objects and extra tasks are added to the build graph, after which the
/// scene must be [`initialize`](Self::initialize)d before frames can be
/// advanced. Initializing derives the execution graph from a copy of the
/// build graph, so the build graph keeps every node and the node handles of
/// the objects stay valid for wiring. Adding anything after initialization
/// requires initializing again.
#[derive(Debug)]
pub struct Scene {
    config: SceneConfig,
    task_graph: TaskGraph,
    execution_graph: Option<TaskGraph>,
    objects: Vec<LevelSetObject>,
    executor: SequentialTaskGraphExecutor,
    frame: usize,
}

impl Scene {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            task_graph: TaskGraph::with_source_and_sink_names("Scene: Source", "Scene: Sink"),
            execution_graph: None,
            objects: Vec::new(),
            executor: SequentialTaskGraphExecutor::new(),
            frame: 0,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// The build graph holding every task added to the scene.
    pub fn task_graph(&self) -> &TaskGraph {
        &self.task_graph
    }

    /// The build graph, for wiring additional tasks. Changing it requires
    /// initializing the scene again.
    pub fn task_graph_mut(&mut self) -> &mut TaskGraph {
        self.execution_graph = None;
        &mut self.task_graph
    }

    /// The pruned and ordered graph executed each frame, or [`None`] if the
    /// scene is not initialized.
    pub fn execution_graph(&self) -> Option<&TaskGraph> {
        self.execution_graph.as_ref()
    }

    pub fn objects(&self) -> &[LevelSetObject] {
        &self.objects
    }

    pub fn object(&self, idx: usize) -> Option<&LevelSetObject> {
        self.objects.get(idx)
    }

    /// The number of frames advanced so far.
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn is_initialized(&self) -> bool {
        self.execution_graph.is_some()
    }

    /// Nests the task graph of the given object between the scene source
    /// and sink and returns the index of the object.
    pub fn add_object(&mut self, object: LevelSetObject) -> Result<usize> {
        let (source, sink) = (self.task_graph.source(), self.task_graph.sink());
        self.task_graph
            .nest_graph(object.task_graph(), source, sink)
            .with_context(|| format!("Failed to add object {} to scene", object.name()))?;
        self.objects.push(object);
        self.execution_graph = None;
        Ok(self.objects.len() - 1)
    }

    /// Adds a task applying an impulse of the given speed to a voxel of the
    /// object with the given index every frame. The task runs after the
    /// object's update starts and before its velocities are complete.
    pub fn add_impulse_source(
        &mut self,
        object_idx: usize,
        coords: VoxelCoords,
        speed: f64,
    ) -> Result<TaskNodeID> {
        let Some(object) = self.objects.get(object_idx) else {
            bail!("No object with index {object_idx} in scene");
        };

        let model = Arc::clone(object.model());
        let node_id = self.task_graph.add_function(
            format!("{}: ApplyImpulse", object.name()),
            move || {
                model.lock().add_impulse(&coords, speed);
                Ok(())
            },
        );
        self.task_graph.add_chain(&[
            object.update_node(),
            node_id,
            object.generate_velocities_end_node(),
        ])?;

        self.execution_graph = None;
        Ok(node_id)
    }

    /// Derives the execution graph from a copy of the build graph: removes
    /// nodes left without edges, rejects circular dependencies, reduces the
    /// graph if enabled, orders critical tasks and gives every task a unique
    /// name. The build graph is left untouched.
    ///
    /// # Errors
    /// Returns an error if the scene graph has a cycle.
    pub fn initialize(&mut self) -> Result<()> {
        self.execution_graph = None;
        let execution_graph =
            with_debug_logging!("Initializing scene task graph"; self.prepare_execution_graph())?;
        self.execution_graph = Some(execution_graph);
        Ok(())
    }

    /// Executes the scene graph once.
    ///
    /// # Errors
    /// Returns an error if the scene is not initialized or if any task
    /// fails.
    pub fn advance(&mut self) -> Result<()> {
        let Some(execution_graph) = &mut self.execution_graph else {
            bail!("Tried to advance scene before initializing it");
        };

        self.executor
            .execute(execution_graph)
            .with_context(|| format!("Failed to advance scene to frame {}", self.frame + 1))?;
        self.frame += 1;

        if self.config.task_timing_enabled {
            info!("Frame {}: {}", self.frame, self.critical_path_summary()?);
        }
        Ok(())
    }

    /// Describes the chain of tasks that determined the duration of the
    /// last frame, with the compute time of each.
    ///
    /// # Errors
    /// Returns an error if the scene is not initialized.
    pub fn critical_path_summary(&self) -> Result<String> {
        let Some(execution_graph) = &self.execution_graph else {
            bail!("Tried to summarize critical path of uninitialized scene");
        };

        let mut summary = String::from("critical path");
        for node_id in execution_graph.critical_path()? {
            if let Some(node) = execution_graph.node(node_id) {
                if node.is_functional() {
                    summary.push_str(&format!(
                        " -> {} ({:.2} ms)",
                        node.name(),
                        node.compute_time().as_secs_f64() * 1e3
                    ));
                }
            }
        }
        Ok(summary)
    }

    /// Adds a task to the build graph. The task must be connected with
    /// edges through [`task_graph_mut`](Self::task_graph_mut), or it is
    /// left out of the execution graph.
    pub fn add_task(&mut self, node: TaskNode) -> TaskNodeID {
        self.execution_graph = None;
        self.task_graph.add_node(node)
    }

    fn prepare_execution_graph(&mut self) -> Result<TaskGraph> {
        let mut graph = self.task_graph.clone();
        graph.remove_unused_nodes();
        graph
            .topological_sort()
            .context("Scene task graph is circular")?;

        if self.config.graph_reduction_enabled {
            graph.reduce()?;
        }
        graph.resolve_critical_nodes()?;
        graph.make_node_names_unique();

        self.executor = SequentialTaskGraphExecutor::new();
        self.executor
            .set_timing_enabled(self.config.task_timing_enabled);
        self.executor.initialize(&graph)?;
        Ok(graph)
    }
}
