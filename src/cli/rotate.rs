//! `rotate`: rotate one application on demand, outside Event Grid.

use crate::azure::AzureAdapters;
use crate::cli::handle;
use crate::cli::CliContext;
use crate::core::directory::DirectoryError;
use crate::core::rotator::DirectoryRotator;
use crate::core::secret_store::SecretStoreClient;
use crate::models::event::ExpirationEvent;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct RotateArgs {
    /// Application object id (also the secret name in the vault)
    pub application_id: String,

    /// Show what would happen without changing the directory or the vault
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(ctx: &CliContext, args: RotateArgs) -> Result<i32> {
    let application_id = args.application_id.trim();
    if application_id.is_empty() {
        bail!("application id must not be empty");
    }

    if args.dry_run {
        return plan(ctx, application_id);
    }

    let event = ExpirationEvent::manual(application_id);
    handle::rotate_events(ctx, std::slice::from_ref(&event))
}

/// Read-only preview: locate the stored secret and the application, then
/// print the calls a rotation would make.
fn plan(ctx: &CliContext, application_id: &str) -> Result<i32> {
    ctx.config.validate()?;
    let runtime = tokio::runtime::Runtime::new().context("start async runtime")?;
    runtime.block_on(plan_async(ctx, application_id))
}

async fn plan_async(ctx: &CliContext, application_id: &str) -> Result<i32> {
    let adapters = AzureAdapters::from_config(&ctx.config)?;
    let store = adapters
        .store
        .context("vault.endpoint is not configured (set it or KEY_VAULT_URI)")?;

    let stored = SecretStoreClient::new(store)
        .get_secret(application_id)
        .await
        .with_context(|| format!("stored secret for {}", application_id))?;

    let application = match adapters.directory.get_application(application_id).await {
        Ok(app) => app,
        Err(DirectoryError::NotFound(_)) => {
            println!("Plan: rotate {}", application_id);
            println!("  [FAIL] application not found in directory; rotation would abort");
            return Ok(2);
        }
        Err(e) => return Err(e).context("look up application"),
    };

    let rotator = DirectoryRotator::new(adapters.directory.clone(), ctx.config.rotation.clone());
    let request = rotator.credential_request(Utc::now());

    println!(
        "Plan: rotate {} ({})",
        application_id,
        application.display_name.as_deref().unwrap_or("unnamed")
    );
    println!(
        "  1. add password credential '{}' expiring {}",
        request.display_name,
        request.end_date_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  2. remove credential {}", stored.correlation_id);
    println!(
        "  3. write new secret to vault with content type = new key id (current expiry: {})",
        stored
            .expires_on
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!("\nDry run: nothing changed.");
    Ok(0)
}
