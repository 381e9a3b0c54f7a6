//! Filesystem and logging helpers.

pub mod fs;
pub mod logging;
