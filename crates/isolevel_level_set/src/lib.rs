//! Evolution of signed distance fields under the level-set equation.

pub mod config;
pub mod graph;
pub mod model;

pub use config::LevelSetConfig;
pub use graph::LevelSetTaskGraph;
pub use model::{LevelSetModel, NodeUpdate};
