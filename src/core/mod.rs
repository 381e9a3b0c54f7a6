//! Rotation logic: correlation, directory swap, orchestration, and the
//! locks and audit trail around it.

pub mod audit_log;
pub mod config_file;
pub mod correlation;
pub mod directory;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod outcome;
pub mod paths;
pub mod rotator;
pub mod secret_store;
