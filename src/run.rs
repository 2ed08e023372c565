//! Running a configured simulation from start to end.

use crate::{config::SimulationConfig, object::LevelSetObject, scene::Scene};
use anyhow::{Context, Result};
use isolevel_log::{info, with_timing_info_logging};
use isolevel_thread::RayonThreadPool;

/// Statistics of the surface at the end of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub n_frames: usize,
    pub n_chunks: usize,
    pub n_chunk_visuals: usize,
    pub n_vertices: usize,
    pub n_triangles: usize,
}

/// Sets up a scene with a single level-set object as described by the
/// configuration and advances it the configured number of frames.
pub fn run(config: &SimulationConfig) -> Result<RunSummary> {
    let scene = with_timing_info_logging!("Setting up scene"; setup_scene(config))?;
    run_scene(scene, config.n_frames)
}

/// Creates the scene described by the configuration, ready to be advanced.
pub fn setup_scene(config: &SimulationConfig) -> Result<Scene> {
    let thread_pool = RayonThreadPool::shared(config.num_threads)?;
    info!("Using {} worker threads", thread_pool.num_threads());

    let image = config
        .field
        .create_image()
        .context("Failed to create initial field")?;

    let object = LevelSetObject::new(
        "Body",
        image,
        config.level_set.clone(),
        &config.isosurface,
        thread_pool,
    )?;

    let mut scene = Scene::new(config.scene.clone());
    let object_idx = scene.add_object(object)?;
    if let Some(impulse) = &config.impulse {
        scene.add_impulse_source(object_idx, impulse.voxel_coords(), impulse.speed)?;
    }
    scene.initialize()?;

    Ok(scene)
}

/// Advances the scene the given number of frames and summarizes the
/// surface of its first object.
pub fn run_scene(mut scene: Scene, n_frames: usize) -> Result<RunSummary> {
    with_timing_info_logging!("Advancing {} frames", n_frames; {
        (0..n_frames).try_for_each(|_| scene.advance())
    })?;

    let mut summary = RunSummary {
        n_frames: scene.frame(),
        n_chunks: 0,
        n_chunk_visuals: 0,
        n_vertices: 0,
        n_triangles: 0,
    };
    if let Some(object) = scene.object(0) {
        let (n_vertices, n_triangles) = object.surface_size();
        summary.n_chunks = object.n_chunks();
        summary.n_chunk_visuals = object.chunk_visuals().len();
        summary.n_vertices = n_vertices;
        summary.n_triangles = n_triangles;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, ImpulseConfig};
    use isolevel_isosurface::IsosurfaceConfig;
    use std::num::NonZeroUsize;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            field: FieldConfig {
                dimensions: [9; 3],
                sphere_center: [4.0; 3],
                sphere_radius: 2.5,
                ..FieldConfig::default()
            },
            isosurface: IsosurfaceConfig {
                iso_value: 0.0,
                n_chunks: [2; 3],
            },
            impulse: Some(ImpulseConfig {
                coords: [4; 3],
                speed: 1.0,
            }),
            n_frames: 2,
            num_threads: NonZeroUsize::new(2),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn run_summarizes_surface() {
        let summary = run(&small_config()).unwrap();

        assert_eq!(summary.n_frames, 2);
        assert_eq!(summary.n_chunks, 8);
        assert_eq!(summary.n_chunk_visuals, 8);
        assert!(summary.n_vertices > 0);
        assert!(summary.n_triangles > 0);
    }

    #[test]
    fn run_with_dense_update_extracts_surface() {
        let mut config = small_config();
        config.level_set.sparse_update = false;
        config.level_set.constant_velocity = 0.5;

        let summary = run(&config).unwrap();

        assert_eq!(summary.n_chunk_visuals, 8);
    }

    #[test]
    fn invalid_field_fails_setup() {
        let mut config = small_config();
        config.field.dimensions = [0, 9, 9];

        assert!(run(&config).is_err());
    }
}
