//! Append-only, hash-chained trail of rotation outcomes.
//!
//! Each line is a JSON entry carrying the SHA-256 of the previous entry, so
//! edits or deletions show up in `verify_chain`. Secrets are never written;
//! only key ids and outcome metadata.

use crate::constants;
use crate::core::lock::FileLock;
use crate::core::outcome::RotationOutcome;
use crate::core::paths::StatePaths;
use crate::util::fs as state_fs;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::warn;

/// Outcome written by `resolve`.
pub const RECONCILED: &str = "reconciled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
}

impl AuditEntry {
    pub fn from_outcome(event_id: &str, outcome: &RotationOutcome) -> Self {
        let expires_on = match outcome {
            RotationOutcome::Rotated { expires_on, .. } => Some(*expires_on),
            RotationOutcome::Inconsistent { new_credential, .. } => {
                Some(new_credential.end_date_time)
            }
            _ => None,
        };
        Self {
            timestamp: Utc::now(),
            event_id: event_id.to_string(),
            application_id: outcome.application_id().map(str::to_string),
            outcome: outcome.status().to_string(),
            previous_key_id: outcome.previous_key_id().map(|k| k.to_string()),
            new_key_id: outcome.new_key_id().map(|k| k.to_string()),
            expires_on,
            error_kind: outcome.error().map(|e| e.kind().to_string()),
            error: outcome.error().map(|e| e.to_string()),
            note: None,
            prev_hash: None,
            entry_hash: None,
        }
    }

    pub fn needs_reconciliation(&self) -> bool {
        matches!(
            self.outcome.as_str(),
            "add_unconfirmed" | "partial_orphan" | "inconsistent"
        )
    }
}

/// Handle used by the orchestrator to record outcomes.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    paths: StatePaths,
}

impl AuditTrail {
    pub fn new(paths: StatePaths) -> Self {
        Self { paths }
    }

    pub fn record(&self, event_id: &str, outcome: &RotationOutcome) -> Result<AuditEntry> {
        append(&self.paths, AuditEntry::from_outcome(event_id, outcome))
    }
}

/// Chain and append an entry. Returns the entry as written.
pub fn append(paths: &StatePaths, mut entry: AuditEntry) -> Result<AuditEntry> {
    state_fs::ensure_dir(&paths.root, constants::STATE_DIR_MODE)?;
    let _lock = FileLock::exclusive(&paths.audit_lock)?;

    entry.prev_hash = last_entry_hash(&paths.audit_log)?;
    entry.entry_hash = None;
    entry.entry_hash = Some(compute_entry_hash(&entry)?);

    let line = serde_json::to_string(&entry).context("serialize audit entry")?;
    append_line(&paths.audit_log, &line)?;
    Ok(entry)
}

/// Hash of the entry with `entry_hash` removed and keys sorted.
fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut value = serde_json::to_value(entry).context("serialize for hash")?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("entry_hash");
    }
    let canonical = canonicalize_value(&value);
    let canonical_str = serde_json::to_string(&canonical).context("serialize canonical json")?;
    Ok(format!("{:064x}", Sha256::digest(canonical_str.as_bytes())))
}

fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize_value(&map[k]));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

fn append_line(audit_path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(audit_path)
        .with_context(|| format!("open audit log {}", audit_path.display()))?;
    writeln!(file, "{}", line).context("write audit entry")?;
    file.sync_data().context("sync audit log")?;
    state_fs::set_permissions(audit_path, constants::AUDIT_LOG_MODE)
}

/// `entry_hash` of the last line, reading backwards in chunks.
fn last_entry_hash(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();

    const CHUNK: u64 = 8192;
    let mut offset = len;
    let mut buf = Vec::new();

    while offset > 0 {
        let read_size = std::cmp::min(CHUNK, offset);
        offset -= read_size;
        file.seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek {}", path.display()))?;
        let mut tmp = vec![0u8; read_size as usize];
        file.read_exact(&mut tmp)
            .with_context(|| format!("read {}", path.display()))?;
        buf.splice(0..0, tmp);

        let complete = buf
            .split(|b| *b == b'\n')
            .filter(|line| !line.iter().all(|b| b.is_ascii_whitespace()))
            .count()
            > 1;
        if complete || offset == 0 {
            let last = buf
                .split(|b| *b == b'\n')
                .rev()
                .find(|line| !line.iter().all(|b| b.is_ascii_whitespace()));
            return Ok(match last {
                Some(line) => match serde_json::from_slice::<AuditEntry>(line) {
                    Ok(AuditEntry {
                        entry_hash: Some(hash),
                        ..
                    }) => Some(hash),
                    _ => Some(format!("{:064x}", Sha256::digest(line))),
                },
                None => None,
            });
        }
    }

    Ok(None)
}

/// Read entries, oldest first. `limit` keeps only the newest entries.
pub fn read_log(paths: &StatePaths, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
    if !paths.audit_log.exists() {
        return Ok(Vec::new());
    }

    let file = fs::File::open(&paths.audit_log)
        .with_context(|| format!("open audit log {}", paths.audit_log.display()))?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut malformed = 0usize;

    for line in reader.lines() {
        let line = line.context("read audit log line")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(_) => malformed += 1,
        }
    }

    if malformed > 0 {
        warn!(malformed, "skipped malformed audit entries");
    }

    if let Some(limit) = limit {
        if entries.len() > limit {
            entries = entries.split_off(entries.len() - limit);
        }
    }

    Ok(entries)
}

/// Verify the chain. Returns (total entries, errors).
pub fn verify_chain(paths: &StatePaths) -> Result<(usize, Vec<String>)> {
    let entries = read_log(paths, None)?;
    let mut errors = Vec::new();
    let mut prev_entry_hash: Option<String> = None;

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 && entry.prev_hash != prev_entry_hash {
            errors.push(format!(
                "entry {}: prev_hash mismatch (expected {:?}, got {:?})",
                i + 1,
                prev_entry_hash,
                entry.prev_hash
            ));
        }

        match &entry.entry_hash {
            Some(stored) => match compute_entry_hash(entry) {
                Ok(computed) if &computed == stored => {}
                Ok(_) => errors.push(format!("entry {}: entry_hash mismatch (tampered?)", i + 1)),
                Err(e) => errors.push(format!("entry {}: cannot compute hash: {}", i + 1, e)),
            },
            None => errors.push(format!("entry {}: missing entry_hash", i + 1)),
        }

        prev_entry_hash = entry.entry_hash.clone();
    }

    Ok((entries.len(), errors))
}

/// Entries that left the directory changed and are still unresolved.
///
/// An entry is resolved by an operator `reconciled` entry for the same event,
/// or by a later rotation that retired its new key id (the store pointed at
/// it and the directory removed it). Rotating the application again does not
/// resolve anything else: an orphan stays live until someone removes it.
pub fn pending(paths: &StatePaths) -> Result<Vec<AuditEntry>> {
    let entries = read_log(paths, None)?;
    let mut reconciled: HashSet<String> = HashSet::new();
    let mut retired: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::new();

    for entry in entries.into_iter().rev() {
        let Some(app) = entry.application_id.clone() else {
            continue;
        };
        match entry.outcome.as_str() {
            RECONCILED => {
                reconciled.insert(entry.event_id.clone());
            }
            // both remove the previous credential
            "rotated" | "inconsistent" => {
                if let Some(key) = &entry.previous_key_id {
                    retired.insert((app.clone(), key.clone()));
                }
            }
            _ => {}
        }

        if !entry.needs_reconciliation() || reconciled.contains(&entry.event_id) {
            continue;
        }
        let key_retired = entry
            .new_key_id
            .as_ref()
            .is_some_and(|key| retired.contains(&(app.clone(), key.clone())));
        if !key_retired {
            out.push(entry);
        }
    }

    out.reverse();
    Ok(out)
}

/// Mark the pending entry recorded for `event_id` as handled by an operator.
pub fn resolve(paths: &StatePaths, event_id: &str, note: Option<&str>) -> Result<AuditEntry> {
    let Some(target) = pending(paths)?
        .into_iter()
        .rev()
        .find(|e| e.event_id == event_id)
    else {
        bail!("no pending entry for event '{}'", event_id);
    };

    append(
        paths,
        AuditEntry {
            timestamp: Utc::now(),
            event_id: target.event_id,
            application_id: target.application_id,
            outcome: RECONCILED.to_string(),
            previous_key_id: target.previous_key_id,
            new_key_id: target.new_key_id,
            expires_on: None,
            error_kind: None,
            error: None,
            note: note.map(str::to_string),
            prev_hash: None,
            entry_hash: None,
        },
    )
}
