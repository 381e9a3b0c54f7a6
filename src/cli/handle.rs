//! `handle`: rotate every application named in an Event Grid delivery.

use crate::azure::AzureAdapters;
use crate::cli::CliContext;
use crate::core::audit_log::{AuditEntry, AuditTrail};
use crate::core::error::RotationError;
use crate::core::lock::RotationLocks;
use crate::core::orchestrator::Orchestrator;
use crate::core::outcome::RotationOutcome;
use crate::models::event::{self, ExpirationEvent};
use anyhow::{Context, Result};
use clap::Args;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::error;

#[derive(Args, Debug)]
pub struct HandleArgs {
    /// Event payload file; omit or pass `-` to read stdin
    #[arg(long, short, value_name = "PATH")]
    pub event: Option<PathBuf>,
}

pub fn run(ctx: &CliContext, args: HandleArgs) -> Result<i32> {
    let payload = read_payload(args.event.as_deref())?;
    let events = event::parse_delivery(&payload)?;
    rotate_events(ctx, &events)
}

fn read_payload(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("read event payload {}", p.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read event payload from stdin")?;
            Ok(buf)
        }
    }
}

/// Handle events one after another against the live adapters, print one
/// JSON line per outcome and return the worst exit code.
pub(crate) fn rotate_events(ctx: &CliContext, events: &[ExpirationEvent]) -> Result<i32> {
    ctx.config.validate()?;

    let runtime = tokio::runtime::Runtime::new().context("start async runtime")?;
    let outcomes = runtime.block_on(handle_all(ctx, events))?;

    for (event, outcome) in events.iter().zip(&outcomes) {
        print_outcome(&event.id, outcome)?;
    }
    Ok(outcomes.iter().map(RotationOutcome::exit_code).max().unwrap_or(0))
}

async fn handle_all(ctx: &CliContext, events: &[ExpirationEvent]) -> Result<Vec<RotationOutcome>> {
    let adapters = AzureAdapters::from_config(&ctx.config)?;
    let Some(store) = adapters.store else {
        error!("vault endpoint not configured; set vault.endpoint or KEY_VAULT_URI");
        return Ok(events
            .iter()
            .map(|e| {
                RotationOutcome::aborted(
                    e.application_id(),
                    RotationError::ConfigurationMissing("vault.endpoint"),
                )
            })
            .collect());
    };

    let mut orchestrator = Orchestrator::new(&ctx.config, store, adapters.directory)
        .with_locks(RotationLocks::new(ctx.paths.locks.clone()));
    if ctx.config.state.audit {
        orchestrator = orchestrator.with_audit(AuditTrail::new(ctx.paths.clone()));
    }

    let mut outcomes = Vec::with_capacity(events.len());
    for event in events {
        outcomes.push(orchestrator.handle_expiration_event(event).await);
    }
    Ok(outcomes)
}

/// One JSON line on stdout, same shape as the audit entry minus the chain.
fn print_outcome(event_id: &str, outcome: &RotationOutcome) -> Result<()> {
    let entry = AuditEntry::from_outcome(event_id, outcome);
    println!("{}", serde_json::to_string(&entry).context("serialize outcome")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_payload_from_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"subject":"app-123"}"#).unwrap();
        let payload = read_payload(Some(file.path())).unwrap();
        assert!(payload.contains("app-123"));
    }

    #[test]
    fn test_read_payload_missing_file_names_path() {
        let err = read_payload(Some(Path::new("/nonexistent/event.json"))).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/event.json"));
    }

    #[test]
    fn test_help_explains_inconsistent_recovery() {
        use clap::CommandFactory;
        let cli = crate::cli::Cli::command();
        let about = cli
            .find_subcommand("handle")
            .and_then(|c| c.get_long_about())
            .map(|a| a.to_string())
            .unwrap();
        assert!(about.contains("inconsistent"));
        assert!(about.contains("remove the stale key"));
    }

    #[test]
    fn test_inconsistent_outcome_line_omits_secret() {
        use crate::models::credential::{DirectoryCredential, KeyId};
        use chrono::Utc;
        use zeroize::Zeroizing;

        let outcome = RotationOutcome::Inconsistent {
            application_id: "app-123".into(),
            previous_key_id: KeyId::parse("key-A").unwrap(),
            new_credential: DirectoryCredential {
                key_id: KeyId::parse("key-B").unwrap(),
                secret_text: Zeroizing::new("s3cr3t".into()),
                display_name: None,
                start_date_time: None,
                end_date_time: Utc::now(),
            },
            error: RotationError::StoreWriteFailure("403 Forbidden".into()),
        };
        let line = serde_json::to_string(&AuditEntry::from_outcome("evt-1", &outcome)).unwrap();
        assert!(line.contains("\"new_key_id\":\"key-B\""));
        assert!(!line.contains("s3cr3t"));
    }
}
