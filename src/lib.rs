//! Level-set simulation of deformable bodies with chunked isosurface
//! extraction, sequenced by task graphs.

pub mod config;
pub mod io;
pub mod object;
pub mod run;
pub mod scene;

pub use isolevel_field;
pub use isolevel_isosurface;
pub use isolevel_level_set;
pub use isolevel_scheduling;
pub use isolevel_thread;
