//! Configuration of isosurface extraction.

use serde::{Deserialize, Serialize};

/// Configuration parameters for a
/// [`LocalMarchingCubes`](crate::local::LocalMarchingCubes) extractor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsosurfaceConfig {
    /// Field value of the extracted surface.
    pub iso_value: f64,
    /// Requested number of chunks along each axis. Each count should divide
    /// the number of cells along its axis, which is one less than the number
    /// of voxels.
    pub n_chunks: [usize; 3],
}

impl Default for IsosurfaceConfig {
    fn default() -> Self {
        Self {
            iso_value: 0.0,
            n_chunks: [1; 3],
        }
    }
}
