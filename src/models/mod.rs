//! Data structures.

pub mod config;
pub mod credential;
pub mod event;
pub mod secret;
