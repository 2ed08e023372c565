//! Configuration of a simulation run.

use crate::io;
use anyhow::{Result, bail};
use isolevel_field::{ImageData, ImplicitFunction, Sphere, VoxelCoords};
use isolevel_isosurface::IsosurfaceConfig;
use isolevel_level_set::LevelSetConfig;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::{num::NonZeroUsize, path::Path};

/// Everything needed to set up and run a simulation. Every field has a
/// default, so a configuration file only has to specify what differs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub field: FieldConfig,
    pub level_set: LevelSetConfig,
    pub isosurface: IsosurfaceConfig,
    /// Impulse applied before every frame, if any.
    pub impulse: Option<ImpulseConfig>,
    /// Number of frames to advance.
    pub n_frames: usize,
    /// Number of worker threads, or one per hardware thread if [`None`].
    pub num_threads: Option<NonZeroUsize>,
    pub scene: SceneConfig,
}

/// Layout of the simulated field and the sphere it is seeded with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub dimensions: [i32; 3],
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub sphere_center: [f64; 3],
    pub sphere_radius: f64,
}

/// An impulse of the given speed applied to a single voxel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpulseConfig {
    pub coords: [i32; 3],
    pub speed: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Whether to prune redundant nodes and edges from the scene task graph.
    pub graph_reduction_enabled: bool,
    /// Whether to time each task and log the critical path.
    pub task_timing_enabled: bool,
}

impl SimulationConfig {
    /// Reads the configuration from the RON file at the given path.
    pub fn from_ron_file(file_path: impl AsRef<Path>) -> Result<Self> {
        io::parse_ron_file(file_path)
    }

    pub fn write_ron_file(&self, output_file_path: impl AsRef<Path>) -> Result<()> {
        io::write_ron_file(self, output_file_path)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            field: FieldConfig::default(),
            level_set: LevelSetConfig {
                dt: 0.1,
                sparse_update: true,
                ..LevelSetConfig::default()
            },
            isosurface: IsosurfaceConfig {
                iso_value: 0.0,
                n_chunks: [3; 3],
            },
            impulse: Some(ImpulseConfig {
                coords: [8; 3],
                speed: 1.0,
            }),
            n_frames: 10,
            num_threads: None,
            scene: SceneConfig::default(),
        }
    }
}

impl FieldConfig {
    /// Creates a single-component `f64` field holding the signed distance
    /// to the configured sphere.
    ///
    /// # Errors
    /// Returns an error if the sphere radius is negative or the field
    /// layout is invalid.
    pub fn create_image(&self) -> Result<ImageData> {
        if self.sphere_radius < 0.0 {
            bail!("Invalid sphere radius {}: must be non-negative", self.sphere_radius);
        }
        let sphere = Sphere::new(Point3::from(self.sphere_center), self.sphere_radius);
        ImageData::from_fn(
            self.dimensions,
            Vector3::from(self.spacing),
            Point3::from(self.origin),
            |position| sphere.value(position),
        )
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            dimensions: [16; 3],
            spacing: [1.0; 3],
            origin: [0.0; 3],
            sphere_center: [7.5; 3],
            sphere_radius: 5.0,
        }
    }
}

impl ImpulseConfig {
    pub fn voxel_coords(&self) -> VoxelCoords {
        VoxelCoords::from(self.coords)
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            graph_reduction_enabled: true,
            task_timing_enabled: false,
        }
    }
}
