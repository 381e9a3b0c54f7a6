//! App registration client secret rotation.
//!
//! Handles Event Grid near-expiry notifications: issues a new password
//! credential on the application, revokes the one the vault points at, and
//! stores the new secret with its key id as the content type.
//!
//! ## Modules
//! - `cli`: Command-line handlers
//! - `core`: Rotation logic (orchestrator, rotator, store/directory seams, audit)
//! - `azure`: Key Vault, Graph and token adapters
//! - `models`: Data structures
//! - `util`: Filesystem and logging helpers

pub mod azure;
pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod util;
