//! Configuration of level-set evolution.

use serde::{Deserialize, Serialize};

/// Configuration parameters for a
/// [`LevelSetModel`](crate::model::LevelSetModel).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSetConfig {
    /// Time step of one evolution.
    pub dt: f64,
    /// Number of passes each evolution is split into, each advancing by
    /// `dt / substeps`.
    pub substeps: u32,
    /// Whether to evolve only voxels that have received an impulse, rather
    /// than the whole field.
    pub sparse_update: bool,
    /// Whether to include the curvature term `k * κ` in the speed.
    pub use_curvature: bool,
    /// Weight of the curvature term.
    pub k: f64,
    /// Speed added to every evolved voxel. Positive values increase the
    /// distance, shrinking the enclosed region.
    pub constant_velocity: f64,
}

impl Default for LevelSetConfig {
    fn default() -> Self {
        Self {
            dt: 0.001,
            substeps: 1,
            sparse_update: false,
            use_curvature: false,
            k: 0.05,
            constant_velocity: 0.0,
        }
    }
}
