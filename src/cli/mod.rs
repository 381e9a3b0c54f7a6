//! CLI routing and command dispatch.

use crate::core::config_file;
use crate::core::paths::StatePaths;
use crate::models::config::{ConfigOverrides, RotatorConfig};
use crate::util::logging::{self, LogFormat};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

pub mod audit;
pub mod doctor;
pub mod handle;
pub mod init;
pub mod rotate;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub config: RotatorConfig,
    /// File the configuration was loaded from, if any.
    pub config_path: Option<PathBuf>,
    pub paths: StatePaths,
}

#[derive(Parser, Debug)]
#[command(
    name = "appreg-rotator",
    version,
    about = "Rotate app registration client secrets kept in Key Vault"
)]
pub struct Cli {
    /// Config file (default: ./rotator.toml when present)
    #[arg(long, global = true, value_name = "PATH", env = "APPREG_ROTATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// State directory for rotation locks and the audit trail
    #[arg(long, global = true, value_name = "DIR", env = "APPREG_ROTATOR_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Key Vault URI holding the application secrets
    #[arg(long, global = true, value_name = "URI", env = "KEY_VAULT_URI")]
    pub vault_uri: Option<String>,

    /// Lifetime of newly issued credentials, in days
    #[arg(long, global = true, value_name = "DAYS", env = "NUMBER_OF_DAYS_UNTIL_EXPIRY")]
    pub validity_days: Option<u32>,

    /// Client id of the identity used to call Graph and Key Vault
    #[arg(long, global = true, value_name = "ID", env = "AZURE_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "APPREG_ROTATOR_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Run the selected command and return the process exit code.
    pub fn run(self) -> Result<i32> {
        logging::init(self.log_format, &self.log_level)?;

        // an explicitly named file must exist, except for `init` which creates it
        let explicit = self.config.is_some();
        let config_path = config_file::resolve_path(self.config);
        let mut config = match &config_path {
            Some(path) => {
                let required = explicit && !matches!(self.command, Commands::Init(_));
                config_file::load(path, required)?
            }
            None => RotatorConfig::default(),
        };
        config.apply_overrides(ConfigOverrides {
            vault_endpoint: self.vault_uri,
            validity_days: self.validity_days,
            client_id: self.client_id,
            state_dir: self.state_dir,
        });
        debug!(
            config = ?config_path.as_ref().map(|p| p.display().to_string()),
            state_dir = %config.state.dir.display(),
            "configuration loaded"
        );

        let ctx = CliContext {
            paths: StatePaths::from_root(config.state.dir.clone()),
            config,
            config_path,
        };

        match self.command {
            Commands::Handle(args) => handle::run(&ctx, args),
            Commands::Rotate(args) => rotate::run(&ctx, args),
            Commands::Audit { command } => audit::run(&ctx, command),
            Commands::Doctor(args) => doctor::run(&ctx, args),
            Commands::Init(args) => init::run(&ctx, args),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Handle an Event Grid near-expiry delivery (file or stdin)
    ///
    /// Prints one JSON outcome line per event and exits with the worst code:
    /// 0 rotated, 2 aborted, 3 needs reconciliation. New secret text is never
    /// printed or logged. After an `inconsistent` outcome the vault holds a
    /// revoked secret and the new one is lost: add a credential by hand, store
    /// it with its key id as content type, then remove the stale key reported
    /// by `audit pending`.
    Handle(handle::HandleArgs),
    /// Rotate one application's secret now
    Rotate(rotate::RotateArgs),
    /// View and check the rotation audit trail
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommand,
    },
    /// Diagnose configuration and state (read-only)
    Doctor(doctor::DoctorArgs),
    /// Write a config template and create the state directory
    Init(init::InitArgs),
}
