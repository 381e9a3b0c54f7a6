//! Loading and writing `rotator.toml`.

use crate::constants;
use crate::models::config::RotatorConfig;
use crate::util::fs as state_fs;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file to use: the explicit path, else `rotator.toml` in the
/// working directory if present.
pub fn resolve_path(arg: Option<PathBuf>) -> Option<PathBuf> {
    if arg.is_some() {
        return arg;
    }
    let local = PathBuf::from(constants::DEFAULT_CONFIG_FILE);
    local.is_file().then_some(local)
}

/// Load the configuration. A missing file is an error only when `required`.
pub fn load(path: &Path, required: bool) -> Result<RotatorConfig> {
    if !path.exists() {
        if required {
            bail!("config file {} does not exist", path.display());
        }
        return Ok(RotatorConfig::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))
}

pub fn save(path: &Path, config: &RotatorConfig) -> Result<()> {
    let content = toml::to_string_pretty(config).context("serialize config")?;
    state_fs::write_atomic(path, content.as_bytes(), constants::CONFIG_FILE_MODE)
}
