//! Logging facade and macros shared by the simulation crates.

#[macro_use]
mod macros;

pub use log::{Level, debug, error, info, log_enabled, trace, warn};
