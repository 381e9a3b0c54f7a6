use crate::cli::CliContext;
use crate::core::audit_log::{self, AuditEntry};
use anyhow::Result;
use chrono::{DateTime, Local};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Display the audit trail
    Log(AuditLogArgs),
    /// Verify audit chain integrity
    Verify(AuditVerifyArgs),
    /// List orphaned or inconsistent rotations awaiting reconciliation
    /// (exits 1 when any are found)
    Pending(AuditPendingArgs),
    /// Record that a pending entry was reconciled by hand
    Resolve(AuditResolveArgs),
}

#[derive(Args, Debug)]
pub struct AuditLogArgs {
    /// Maximum number of entries to display
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct AuditVerifyArgs {}

#[derive(Args, Debug)]
pub struct AuditPendingArgs {}

#[derive(Args, Debug)]
pub struct AuditResolveArgs {
    /// Event id of the pending entry
    pub event_id: String,
    /// What was done, kept in the trail
    #[arg(long)]
    pub note: Option<String>,
}

pub fn run(ctx: &CliContext, cmd: AuditCommand) -> Result<i32> {
    match cmd {
        AuditCommand::Log(args) => run_log(ctx, args),
        AuditCommand::Verify(_) => run_verify(ctx),
        AuditCommand::Pending(_) => run_pending(ctx),
        AuditCommand::Resolve(args) => run_resolve(ctx, args),
    }
}

fn bold(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

fn key_cell(key: &Option<String>) -> String {
    key.clone().unwrap_or_else(|| "-".to_string())
}

fn entries_table(entries: &[AuditEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        bold("Timestamp"),
        bold("Event"),
        bold("Application"),
        bold("Outcome"),
        bold("Previous key"),
        bold("New key"),
        bold("Error"),
    ]);

    for entry in entries {
        let local: DateTime<Local> = entry.timestamp.into();
        table.add_row(vec![
            local.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.event_id.clone(),
            key_cell(&entry.application_id),
            entry.outcome.clone(),
            key_cell(&entry.previous_key_id),
            key_cell(&entry.new_key_id),
            entry
                .error
                .clone()
                .or_else(|| entry.note.clone())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table
}

fn run_log(ctx: &CliContext, args: AuditLogArgs) -> Result<i32> {
    let entries = audit_log::read_log(&ctx.paths, Some(args.limit))?;

    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(0);
    }

    println!("{}", entries_table(&entries));
    println!("\n{} entries shown.", entries.len());
    Ok(0)
}

fn run_verify(ctx: &CliContext) -> Result<i32> {
    let (total, errors) = audit_log::verify_chain(&ctx.paths)?;

    if total == 0 {
        println!("No audit entries to verify.");
        return Ok(0);
    }

    for err in &errors {
        println!("  [FAIL] {}", err);
    }

    println!();
    if errors.is_empty() {
        println!("Audit chain: {} entries verified, 0 errors", total);
        Ok(0)
    } else {
        println!("Audit chain: {} entries, {} errors", total, errors.len());
        Ok(1)
    }
}

fn run_pending(ctx: &CliContext) -> Result<i32> {
    let entries = audit_log::pending(&ctx.paths)?;

    if entries.is_empty() {
        println!("No rotations awaiting reconciliation.");
        return Ok(0);
    }

    println!("{}", entries_table(&entries));
    println!();
    for entry in &entries {
        println!("  {}", guidance(entry));
    }
    println!("\n{} rotations need attention.", entries.len());
    println!("Run 'audit resolve <event-id>' once an entry is handled.");
    Ok(1)
}

fn guidance(entry: &AuditEntry) -> String {
    let app = entry.application_id.as_deref().unwrap_or("?");
    let new_key = entry.new_key_id.as_deref().unwrap_or("unknown");
    match entry.outcome.as_str() {
        "add_unconfirmed" => format!(
            "{}: add call was accepted but unreadable; look for credential {} and remove it",
            app, new_key
        ),
        "partial_orphan" => format!(
            "{}: remove orphaned credential {} or retire the previous one and store the new secret",
            app, new_key
        ),
        _ => format!(
            "{}: vault holds a revoked secret and credential {} has no stored copy; \
             add a credential by hand, store it with its key id, then remove {}",
            app, new_key, new_key
        ),
    }
}

fn run_resolve(ctx: &CliContext, args: AuditResolveArgs) -> Result<i32> {
    let entry = audit_log::resolve(&ctx.paths, &args.event_id, args.note.as_deref())?;
    println!(
        "Resolved {} ({}, key {}).",
        entry.event_id,
        entry.application_id.as_deref().unwrap_or("?"),
        entry.new_key_id.as_deref().unwrap_or("unknown")
    );
    Ok(0)
}
