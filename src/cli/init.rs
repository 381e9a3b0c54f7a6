use crate::cli::CliContext;
use crate::constants;
use crate::core::config_file;
use crate::util::fs as state_fs;
use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

pub fn run(ctx: &CliContext, args: InitArgs) -> Result<i32> {
    let target = ctx
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_CONFIG_FILE));

    if target.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            target.display()
        );
    }

    // flags and environment given to init end up in the file
    config_file::save(&target, &ctx.config)?;
    println!("config written to {}", target.display());

    let paths = &ctx.paths;
    state_fs::ensure_dir(&paths.root, constants::STATE_DIR_MODE)?;
    state_fs::ensure_dir(&paths.locks, constants::STATE_DIR_MODE)?;
    println!("state directory ready at {}", paths.root.display());

    if ctx.config.vault_endpoint().is_none() {
        println!("note: set vault.endpoint (or KEY_VAULT_URI) before rotating");
    }
    Ok(0)
}
