//! Level-set evolution of a signed distance field.

use crate::config::LevelSetConfig;
use anyhow::{Context, Result, bail};
use isolevel_field::{
    ImageData, ImplicitGeometry, ScalarType, SignedDistanceField, StructuredBackwardGradient,
    StructuredCurvature, StructuredForwardGradient, VoxelCoords,
};
use isolevel_log::warn;
use isolevel_thread::RayonThreadPool;
use nalgebra::Vector3;
use nohash_hasher::IntMap;
use std::sync::Arc;

/// Sparse updates involving more voxels than this are spread over the
/// thread pool.
const PARALLEL_SPARSE_UPDATE_THRESHOLD: usize = 50;

/// A pending update of a single voxel in sparse mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeUpdate {
    pub coords: VoxelCoords,
    /// Speed contributed by impulses on the voxel, added to the constant
    /// velocity when the voxel is evolved.
    pub impulse: f64,
}

/// Evolves a signed distance field `φ` with the level-set equation
/// `∂φ/∂t = F|∇φ|`, where the speed `F` is the sum of a constant velocity,
/// per-voxel impulses and optionally a curvature term. `|∇φ|` is evaluated
/// with the upwind scheme, choosing one-sided differences based on the sign
/// of the speed.
///
/// In sparse mode only voxels that received an impulse since the last
/// evolution are updated. In dense mode the whole field is updated every
/// evolution, with impulses kept in a per-voxel velocity buffer.
///
/// The model must have geometry attached with
/// [`attach_geometry`](Self::attach_geometry) and be
/// [`initialize`](Self::initialize)d before it can be evolved.
#[derive(Debug)]
pub struct LevelSetModel {
    config: LevelSetConfig,
    geometry: Option<ImplicitGeometry>,
    state: Option<FieldState>,
    nodes_to_update: IntMap<usize, NodeUpdate>,
    thread_pool: Arc<RayonThreadPool>,
}

#[derive(Debug)]
struct FieldState {
    sdf: SignedDistanceField,
    stencils: Stencils,
    dense: Option<DenseBuffers>,
}

#[derive(Clone, Debug)]
struct Stencils {
    forward: StructuredForwardGradient,
    backward: StructuredBackwardGradient,
    curvature: StructuredCurvature,
}

#[derive(Clone, Debug)]
struct DenseBuffers {
    /// Two values per voxel: the squared upwind gradient magnitude for
    /// positive speed followed by the one for negative speed.
    gradient_magnitudes: Vec<f64>,
    curvatures: Vec<f64>,
    velocities: Vec<f64>,
}

impl LevelSetModel {
    /// Creates a model with the default configuration and no geometry,
    /// fanning out its dense work on the given pool.
    pub fn new(thread_pool: Arc<RayonThreadPool>) -> Self {
        Self {
            config: LevelSetConfig::default(),
            geometry: None,
            state: None,
            nodes_to_update: IntMap::default(),
            thread_pool,
        }
    }

    /// Attaches the geometry to evolve, discarding any previously
    /// initialized field. Only field-backed geometry can be initialized.
    pub fn attach_geometry(&mut self, geometry: impl Into<ImplicitGeometry>) {
        self.geometry = Some(geometry.into());
        self.state = None;
        self.nodes_to_update.clear();
    }

    pub fn has_geometry(&self) -> bool {
        self.geometry.is_some() || self.state.is_some()
    }

    pub fn config(&self) -> &LevelSetConfig {
        &self.config
    }

    /// Sets the configuration of the model. If the model is already
    /// initialized, the auxiliary buffers are reallocated to match the
    /// update mode.
    ///
    /// # Errors
    /// Returns an error if no geometry has been attached.
    pub fn configure(&mut self, config: LevelSetConfig) -> Result<()> {
        if !self.has_geometry() {
            bail!("Tried to configure level set model before attaching geometry");
        }
        if let Some(state) = &mut self.state {
            if config.sparse_update != state.dense.is_none() {
                self.nodes_to_update.clear();
                state.dense = (!config.sparse_update)
                    .then(|| DenseBuffers::new(state.sdf.image().n_voxels()));
            }
        }
        self.config = config;
        Ok(())
    }

    /// Prepares the attached geometry for evolution. Image data is wrapped
    /// in a signed distance field, and the dense auxiliary buffers are
    /// allocated unless the model is configured for sparse updates.
    ///
    /// # Errors
    /// Returns an error if no geometry is attached, if the geometry is not
    /// backed by a field, or if the field does not hold allocated `f64`
    /// samples. The attached geometry is kept on failure.
    pub fn initialize(&mut self) -> Result<()> {
        if let Some(ImplicitGeometry::SignedDistanceField(sdf)) = &self.geometry {
            check_field(sdf.image())?;
        }

        let sdf = match self.geometry.take() {
            Some(ImplicitGeometry::SignedDistanceField(sdf)) => sdf,
            Some(geometry) => {
                let kind = geometry.kind();
                self.geometry = Some(geometry);
                bail!("Level set model requires field-backed geometry, got {kind:?}");
            }
            None => match self.state.take() {
                Some(state) => state.sdf,
                None => bail!("Level set model is missing geometry"),
            },
        };

        let spacing = *sdf.image().spacing();
        let unit_step = VoxelCoords::repeat(1);
        let stencils = Stencils {
            forward: StructuredForwardGradient::new(unit_step, &spacing),
            backward: StructuredBackwardGradient::new(unit_step, &spacing),
            curvature: StructuredCurvature::new(unit_step, &spacing),
        };

        let dense = (!self.config.sparse_update).then(|| DenseBuffers::new(sdf.image().n_voxels()));

        self.nodes_to_update.clear();
        self.state = Some(FieldState {
            sdf,
            stencils,
            dense,
        });

        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// The evolved field, if the model is initialized.
    pub fn signed_distance_field(&self) -> Option<&SignedDistanceField> {
        self.state.as_ref().map(|state| &state.sdf)
    }

    /// The samples of the evolved field, if the model is initialized.
    pub fn image(&self) -> Option<&ImageData> {
        self.signed_distance_field().map(SignedDistanceField::image)
    }

    /// Applies an impulse with the given speed to a voxel. If the voxel
    /// already has an impulse, the larger of the two is kept.
    ///
    /// Coordinates outside the field, and calls before initialization, are
    /// ignored.
    pub fn add_impulse(&mut self, coords: &VoxelCoords, impulse: f64) {
        self.apply_impulse(coords, impulse, f64::max);
    }

    /// Like [`add_impulse`](Self::add_impulse), but replaces any existing
    /// impulse on the voxel.
    pub fn set_impulse(&mut self, coords: &VoxelCoords, impulse: f64) {
        self.apply_impulse(coords, impulse, |_, new| new);
    }

    /// The impulse currently applied to the given voxel. In sparse mode this
    /// is [`None`] for voxels without a pending update.
    pub fn impulse_at(&self, coords: &VoxelCoords) -> Option<f64> {
        let state = self.state.as_ref()?;
        let image = state.sdf.image();
        if !image.contains_coords(coords) {
            return None;
        }
        let idx = image.linear_idx(coords);
        match &state.dense {
            Some(dense) => Some(dense.velocities[idx]),
            None => self.nodes_to_update.get(&idx).map(|update| update.impulse),
        }
    }

    /// The voxels that will be updated by the next sparse evolution, keyed by
    /// flat voxel index.
    pub fn nodes_to_update(&self) -> impl Iterator<Item = (usize, &NodeUpdate)> {
        self.nodes_to_update.iter().map(|(&idx, update)| (idx, update))
    }

    pub fn n_nodes_to_update(&self) -> usize {
        self.nodes_to_update.len()
    }

    /// Advances the field by one time step, split into the configured number
    /// of substeps. In sparse mode the pending updates are cleared
    /// afterwards.
    ///
    /// # Errors
    /// Returns an error if the model is not initialized.
    pub fn evolve(&mut self) -> Result<()> {
        let Some(state) = &mut self.state else {
            bail!("Tried to evolve level set model before initializing it");
        };

        let substeps = self.config.substeps.max(1);
        let dt = self.config.dt / f64::from(substeps);

        if state.dense.is_some() {
            for _ in 0..substeps {
                state.evolve_dense(&self.config, &self.thread_pool, dt)?;
            }
        } else if !self.nodes_to_update.is_empty() {
            let updates: Vec<_> = self.nodes_to_update.values().copied().collect();
            for _ in 0..substeps {
                state.evolve_sparse(&updates, &self.config, &self.thread_pool, dt)?;
            }
            self.nodes_to_update.clear();
        }

        Ok(())
    }

    /// Resetting is not supported, since it would require keeping a copy of
    /// the initial field. Logs a warning and leaves the field untouched.
    pub fn reset_to_initial_state(&mut self) {
        warn!("Level set model cannot reset to its initial state");
    }

    fn apply_impulse(&mut self, coords: &VoxelCoords, impulse: f64, merge: impl Fn(f64, f64) -> f64) {
        let Some(state) = &mut self.state else {
            return;
        };
        let image = state.sdf.image();
        if !image.contains_coords(coords) {
            return;
        }
        let idx = image.linear_idx(coords);

        match &mut state.dense {
            Some(dense) => {
                let velocity = &mut dense.velocities[idx];
                *velocity = merge(*velocity, impulse);
            }
            None => {
                self.nodes_to_update
                    .entry(idx)
                    .and_modify(|update| update.impulse = merge(update.impulse, impulse))
                    .or_insert(NodeUpdate {
                        coords: *coords,
                        impulse,
                    });
            }
        }
    }
}

impl FieldState {
    fn evolve_sparse(
        &mut self,
        updates: &[NodeUpdate],
        config: &LevelSetConfig,
        thread_pool: &RayonThreadPool,
        dt: f64,
    ) -> Result<()> {
        // All increments are computed from the field before any is applied
        let compute_increment = |update: &NodeUpdate| {
            let speed = update.impulse + config.constant_velocity;
            let magnitudes = self.upwind_squared_magnitudes(&update.coords);
            let curvature_term = if config.use_curvature {
                config.k * self.stencils.curvature.evaluate(&self.sdf, &update.coords)
            } else {
                0.0
            };
            upwind_increment(speed, speed, magnitudes, curvature_term, dt)
        };

        let increments = if updates.len() > PARALLEL_SPARSE_UPDATE_THRESHOLD {
            thread_pool.map_collect(updates, compute_increment)
        } else {
            updates.iter().map(compute_increment).collect()
        };

        let image = self.sdf.image_mut();
        let indices: Vec<_> = updates
            .iter()
            .map(|update| image.linear_idx(&update.coords))
            .collect();
        let values = image
            .f64_scalars_mut()
            .context("Level set field lost its f64 samples")?;

        for (idx, increment) in indices.into_iter().zip(increments) {
            if let Some(increment) = increment {
                values[idx] += increment;
            }
        }
        Ok(())
    }

    fn evolve_dense(
        &mut self,
        config: &LevelSetConfig,
        thread_pool: &RayonThreadPool,
        dt: f64,
    ) -> Result<()> {
        let Some(dense) = &mut self.dense else {
            bail!("Level set model has no dense buffers");
        };
        let sdf = &self.sdf;
        let stencils = &self.stencils;

        let [nx, ny, _] = sdf.image().dimensions();
        let slice_size = nx * ny;
        let slice_coords = move |z: usize, local_idx: usize| {
            VoxelCoords::new((local_idx % nx) as i32, (local_idx / nx) as i32, z as i32)
        };

        thread_pool.for_each_chunk_mut(&mut dense.gradient_magnitudes, 2 * slice_size, |z, magnitudes| {
            for local_idx in 0..slice_size {
                let coords = slice_coords(z, local_idx);
                let forward = stencils.forward.evaluate(sdf, &coords);
                let backward = stencils.backward.evaluate(sdf, &coords);
                let [increasing, decreasing] = squared_magnitudes(&forward, &backward);
                magnitudes[2 * local_idx] = increasing;
                magnitudes[2 * local_idx + 1] = decreasing;
            }
        });

        if config.use_curvature {
            thread_pool.for_each_chunk_mut(&mut dense.curvatures, slice_size, |z, curvatures| {
                for (local_idx, curvature) in curvatures.iter_mut().enumerate() {
                    *curvature = stencils.curvature.evaluate(sdf, &slice_coords(z, local_idx));
                }
            });
        }

        let values = self
            .sdf
            .image_mut()
            .f64_scalars_mut()
            .context("Level set field lost its f64 samples")?;
        let DenseBuffers {
            gradient_magnitudes,
            curvatures,
            velocities,
        } = &*dense;

        // Branches on the sign of the constant velocity, not the per-voxel
        // speed
        thread_pool.for_each_mut(values, |idx, value| {
            let speed = config.constant_velocity + velocities[idx];
            let curvature_term = if config.use_curvature {
                config.k * curvatures[idx]
            } else {
                0.0
            };
            let magnitudes = [gradient_magnitudes[2 * idx], gradient_magnitudes[2 * idx + 1]];
            if let Some(increment) =
                upwind_increment(speed, config.constant_velocity, magnitudes, curvature_term, dt)
            {
                *value += increment;
            }
        });

        Ok(())
    }

    fn upwind_squared_magnitudes(&self, coords: &VoxelCoords) -> [f64; 2] {
        let forward = self.stencils.forward.evaluate(&self.sdf, coords);
        let backward = self.stencils.backward.evaluate(&self.sdf, coords);
        squared_magnitudes(&forward, &backward)
    }
}

impl DenseBuffers {
    fn new(n_voxels: usize) -> Self {
        Self {
            gradient_magnitudes: vec![0.0; 2 * n_voxels],
            curvatures: vec![0.0; n_voxels],
            velocities: vec![0.0; n_voxels],
        }
    }
}

fn check_field(image: &ImageData) -> Result<()> {
    if image.scalar_type() != ScalarType::F64 {
        bail!(
            "Level set model has unsupported scalar type {:?}, only {:?} fields can be evolved",
            image.scalar_type(),
            ScalarType::F64
        );
    }
    if !image.is_allocated() {
        bail!("Level set model was given a field with no samples");
    }
    Ok(())
}

/// Squared upwind gradient magnitudes `[increasing, decreasing]` for a
/// field value moving up (positive speed) or down (negative speed).
fn squared_magnitudes(forward: &Vector3<f64>, backward: &Vector3<f64>) -> [f64; 2] {
    let mut increasing = 0.0;
    let mut decreasing = 0.0;
    for axis in 0..3 {
        increasing += backward[axis].min(0.0).powi(2) + forward[axis].max(0.0).powi(2);
        decreasing += backward[axis].max(0.0).powi(2) + forward[axis].min(0.0).powi(2);
    }
    [increasing, decreasing]
}

/// Change in field value over `dt`, with the upwind magnitude chosen by the
/// sign of `branch_speed`. Returns [`None`] when the branch speed is zero.
fn upwind_increment(
    speed: f64,
    branch_speed: f64,
    [increasing, decreasing]: [f64; 2],
    curvature_term: f64,
    dt: f64,
) -> Option<f64> {
    if branch_speed > 0.0 {
        Some(dt * (speed * increasing.sqrt() + curvature_term))
    } else if branch_speed < 0.0 {
        Some(dt * (speed * decreasing.sqrt() + curvature_term))
    } else {
        None
    }
}
