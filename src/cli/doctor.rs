//! Diagnostics for configuration, state directory and Azure access.

use crate::azure::AzureAdapters;
use crate::cli::CliContext;
use crate::constants;
use crate::core::audit_log;
use anyhow::{Context, Result};
use clap::Args;
use std::fs;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Also acquire Graph and Key Vault tokens
    #[arg(long)]
    pub online: bool,
}

#[derive(Default)]
struct Tally {
    ok: u32,
    warn: u32,
    fail: u32,
}

impl Tally {
    fn pass(&mut self, msg: impl AsRef<str>) {
        println!("  [PASS] {}", msg.as_ref());
        self.ok += 1;
    }

    fn warn(&mut self, msg: impl AsRef<str>) {
        println!("  [WARN] {}", msg.as_ref());
        self.warn += 1;
    }

    fn fail(&mut self, msg: impl AsRef<str>) {
        println!("  [FAIL] {}", msg.as_ref());
        self.fail += 1;
    }
}

pub fn run(ctx: &CliContext, args: DoctorArgs) -> Result<i32> {
    let paths = &ctx.paths;
    let config = &ctx.config;
    let mut t = Tally::default();

    println!("Doctor: {}", paths);

    match &ctx.config_path {
        Some(p) if p.is_file() => t.pass(format!("config file: {}", p.display())),
        Some(p) => t.warn(format!("config file missing: {} (using defaults)", p.display())),
        None => t.warn("no config file; using defaults and environment"),
    }

    let problems = config.problems();
    if problems.is_empty() {
        t.pass("configuration valid");
    } else {
        for p in &problems {
            t.fail(p);
        }
    }

    match config.vault_endpoint() {
        Some(endpoint) => t.pass(format!("vault endpoint: {}", endpoint)),
        None => t.fail("vault endpoint not set (vault.endpoint or KEY_VAULT_URI)"),
    }
    println!(
        "  [INFO] new credentials valid for {} days, auth method {:?}",
        config.rotation.validity_days, config.auth.method
    );

    if paths.root.is_dir() {
        t.pass(format!("state dir exists: {}", paths.root.display()));
        if let Ok(meta) = fs::metadata(&paths.root) {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = meta.permissions().mode() & 0o777;
                if mode == constants::STATE_DIR_MODE {
                    t.pass(format!("state dir mode ok: {:04o}", mode));
                } else {
                    t.warn(format!(
                        "state dir mode: {:04o} (expected {:04o})",
                        mode,
                        constants::STATE_DIR_MODE
                    ));
                }
            }
        }
    } else {
        t.warn(format!(
            "state dir missing: {} (created on first rotation, or run init)",
            paths.root.display()
        ));
    }

    if paths.audit_log.exists() {
        match audit_log::verify_chain(paths) {
            Ok((total, errors)) if errors.is_empty() => {
                t.pass(format!("audit chain intact ({} entries)", total))
            }
            Ok((_, errors)) => t.fail(format!(
                "audit chain broken: {} errors (run: audit verify)",
                errors.len()
            )),
            Err(e) => t.warn(format!("cannot read audit log: {:#}", e)),
        }
        match audit_log::pending(paths) {
            Ok(pending) if pending.is_empty() => t.pass("no rotations awaiting reconciliation"),
            Ok(pending) => t.warn(format!(
                "{} rotations awaiting reconciliation (run: audit pending)",
                pending.len()
            )),
            Err(e) => t.warn(format!("cannot scan audit log: {:#}", e)),
        }
    }

    if args.online {
        if problems.is_empty() {
            check_tokens(ctx, &mut t)?;
        } else {
            t.warn("skipping token checks until the configuration is valid");
        }
    }

    println!();
    println!(
        "Doctor summary: {} pass, {} warn, {} fail",
        t.ok, t.warn, t.fail
    );
    Ok(if t.fail > 0 { 1 } else { 0 })
}

fn check_tokens(ctx: &CliContext, t: &mut Tally) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("start async runtime")?;
    runtime.block_on(async {
        let adapters = match AzureAdapters::from_config(&ctx.config) {
            Ok(a) => a,
            Err(e) => {
                t.fail(format!("cannot build Azure clients: {:#}", e));
                return;
            }
        };
        for (name, scope) in [
            ("Graph", constants::GRAPH_SCOPE),
            ("Key Vault", constants::KEY_VAULT_SCOPE),
        ] {
            match adapters.tokens.token(scope).await {
                Ok(_) => t.pass(format!("{} token acquired", name)),
                Err(e) => t.fail(format!("{} token: {}", name, e)),
            }
        }
    });
    Ok(())
}
