//! Simulation objects with an evolving level set and a chunked surface.

use anyhow::{Context, Result, anyhow};
use isolevel_field::{ImageData, VoxelCoords};
use isolevel_isosurface::{IsosurfaceConfig, LocalMarchingCubes, SurfaceMesh};
use isolevel_level_set::{LevelSetConfig, LevelSetModel, LevelSetTaskGraph};
use isolevel_log::debug;
use isolevel_scheduling::{TaskGraph, TaskNode, TaskNodeID};
use isolevel_thread::RayonThreadPool;
use parking_lot::Mutex;
use std::{collections::BTreeSet, sync::Arc};

/// A deformable object whose shape is the zero level set of an evolving
/// signed distance field, with its surface extracted per chunk.
///
/// The object owns a task graph running, in order, the object's update
/// node, the nested level-set graph and the geometry update node. A node
/// forwarding the voxels pending evolution to the isosurface extractor is
/// inserted directly before the evolution, so it sees the impulses of the
/// current frame before the model clears them.
///
/// Locks are always taken model first, then surface.
#[derive(Debug)]
pub struct LevelSetObject {
    name: String,
    model: Arc<Mutex<LevelSetModel>>,
    surface: Arc<Mutex<ChunkedSurface>>,
    task_graph: TaskGraph,
    update_node: TaskNodeID,
    update_geometry_node: TaskNodeID,
    set_modified_voxels_node: TaskNodeID,
    generate_velocities_end: TaskNodeID,
    quantity_evolve_nodes: Vec<TaskNodeID>,
}

/// The extractor with the set of chunks that have been given a visual.
#[derive(Debug)]
struct ChunkedSurface {
    extractor: LocalMarchingCubes,
    chunk_visuals: BTreeSet<usize>,
}

impl LevelSetObject {
    /// Creates an object evolving the given field.
    ///
    /// # Errors
    /// Returns an error if the level-set model can not be initialized with
    /// the field.
    pub fn new(
        name: impl Into<String>,
        image: ImageData,
        level_set_config: LevelSetConfig,
        isosurface_config: &IsosurfaceConfig,
        thread_pool: Arc<RayonThreadPool>,
    ) -> Result<Self> {
        let name = name.into();

        let mut model = LevelSetModel::new(Arc::clone(&thread_pool));
        model.attach_geometry(image);
        model.configure(level_set_config)?;
        model
            .initialize()
            .with_context(|| format!("Failed to initialize level set of object {name}"))?;

        let mut extractor = LocalMarchingCubes::from_config(isosurface_config);
        if let Some(image) = model.image() {
            extractor.set_input_image(image);
        }

        let model = Arc::new(Mutex::new(model));
        let surface = Arc::new(Mutex::new(ChunkedSurface {
            extractor,
            chunk_visuals: BTreeSet::new(),
        }));

        let mut level_set_graph = LevelSetTaskGraph::new(&model);
        let (child_source, child_sink) = (
            level_set_graph.task_graph().source(),
            level_set_graph.task_graph().sink(),
        );
        level_set_graph.init_graph_edges(child_source, child_sink)?;

        let mut task_graph =
            TaskGraph::with_source_and_sink_names(format!("{name}: Source"), format!("{name}: Sink"));

        let (source, sink) = (task_graph.source(), task_graph.sink());

        let update_node = task_graph.add_node(TaskNode::new_virtual(format!("{name}: Update")));

        let update_geometry_node = task_graph.add_function(format!("{name}: UpdateGeometry"), {
            let model = Arc::clone(&model);
            let surface = Arc::clone(&surface);
            let thread_pool = Arc::clone(&thread_pool);
            move || {
                let model = model.lock();
                let image = model
                    .image()
                    .ok_or_else(|| anyhow!("Level set model has no field to extract"))?;
                surface.lock().update(image, &thread_pool)
            }
        });

        task_graph.add_edge(source, update_node)?;
        task_graph.nest_graph(level_set_graph.task_graph(), update_node, update_geometry_node)?;
        task_graph.add_edge(update_geometry_node, sink)?;

        let generate_velocities_end = level_set_graph.generate_velocities_end_node();
        let evolve_distances = level_set_graph
            .quantity_evolve_node(0)
            .context("Level set task graph has no evolve node")?;

        let set_modified_voxels_node = task_graph.insert_before(
            evolve_distances,
            TaskNode::new("Isosurface: SetModifiedVoxels", {
                let model = Arc::clone(&model);
                let surface = Arc::clone(&surface);
                move || {
                    let model = model.lock();
                    surface.lock().forward_modified_voxels(&model);
                    Ok(())
                }
            }),
        )?;

        let quantity_evolve_nodes = (0..)
            .map_while(|idx| level_set_graph.quantity_evolve_node(idx))
            .collect();

        Ok(Self {
            name,
            model,
            surface,
            task_graph,
            update_node,
            update_geometry_node,
            set_modified_voxels_node,
            generate_velocities_end,
            quantity_evolve_nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task_graph(&self) -> &TaskGraph {
        &self.task_graph
    }

    /// The virtual node starting every update of the object.
    pub fn update_node(&self) -> TaskNodeID {
        self.update_node
    }

    /// The node re-extracting the modified chunks of the surface, which
    /// ends every update of the object.
    pub fn update_geometry_node(&self) -> TaskNodeID {
        self.update_geometry_node
    }

    pub fn set_modified_voxels_node(&self) -> TaskNodeID {
        self.set_modified_voxels_node
    }

    /// The node after which all impulses of the frame must have been
    /// applied.
    pub fn generate_velocities_end_node(&self) -> TaskNodeID {
        self.generate_velocities_end
    }

    /// The node evolving the quantity with the given index, where index zero
    /// is the distances.
    pub fn quantity_evolve_node(&self, idx: usize) -> Option<TaskNodeID> {
        self.quantity_evolve_nodes.get(idx).copied()
    }

    /// The level-set model, shared with the tasks of the object.
    pub fn model(&self) -> &Arc<Mutex<LevelSetModel>> {
        &self.model
    }

    pub fn add_impulse(&self, coords: &VoxelCoords, impulse: f64) {
        self.model.lock().add_impulse(coords, impulse);
    }

    pub fn set_impulse(&self, coords: &VoxelCoords, impulse: f64) {
        self.model.lock().set_impulse(coords, impulse);
    }

    /// Calls the given closure with the mesh of each chunk that has a
    /// visual, in chunk order.
    pub fn for_each_chunk_visual(&self, mut f: impl FnMut(usize, &SurfaceMesh)) {
        let surface = self.surface.lock();
        for &chunk_idx in &surface.chunk_visuals {
            if let Some(mesh) = surface.extractor.output(chunk_idx) {
                f(chunk_idx, mesh);
            }
        }
    }

    /// The chunks that have been given a visual.
    pub fn chunk_visuals(&self) -> Vec<usize> {
        self.surface.lock().chunk_visuals.iter().copied().collect()
    }

    pub fn n_chunks(&self) -> usize {
        self.surface.lock().extractor.n_chunks()
    }

    /// The total number of vertices and triangles over all chunk meshes.
    pub fn surface_size(&self) -> (usize, usize) {
        self.surface
            .lock()
            .extractor
            .outputs()
            .iter()
            .fold((0, 0), |(n_vertices, n_triangles), mesh| {
                (n_vertices + mesh.n_vertices(), n_triangles + mesh.n_triangles())
            })
    }
}

impl ChunkedSurface {
    /// Marks the chunks around every voxel pending evolution as modified.
    /// Dense models evolve every voxel, so the whole surface is marked.
    fn forward_modified_voxels(&mut self, model: &LevelSetModel) {
        if model.config().sparse_update {
            for (_, update) in model.nodes_to_update() {
                self.extractor.set_modified(&update.coords);
            }
        } else {
            self.extractor.set_all_modified();
        }
    }

    /// Re-extracts the modified chunks and gives a visual to every chunk
    /// that has a non-empty mesh. Visuals are never removed, even if the
    /// chunk mesh later becomes empty.
    fn update(&mut self, image: &ImageData, thread_pool: &RayonThreadPool) -> Result<()> {
        self.extractor.update(image, thread_pool)?;

        for (chunk_idx, mesh) in self.extractor.outputs().iter().enumerate() {
            if mesh.n_vertices() > 0 && self.chunk_visuals.insert(chunk_idx) {
                debug!("Created visual for isosurface chunk {chunk_idx}");
            }
        }
        Ok(())
    }
}
