//! Snapshot inspection
//!
//! Handles: backup list, backup files, backup verify

use super::{CommandResult, Context};
use chrono::DateTime;
use tarbackup_core::backup::verify_snapshot;
use tarbackup_core::snapshot::short_id;
use tarbackup_core::util::format_size;

pub fn list(set: Option<&str>, json: bool, ctx: &Context) -> CommandResult {
    let set_id = match set {
        Some(name) => Some(ctx.find_set(name)?.id),
        None => None,
    };
    let summaries = ctx.snapshots().list_summaries(set_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if summaries.is_empty() {
        println!("No snapshots found.");
        return Ok(());
    }

    println!("Snapshots:");
    for s in summaries {
        let desc = s
            .description
            .as_deref()
            .map(|d| format!(" - {d}"))
            .unwrap_or_default();
        println!(
            "  {}  {}  {:<11}  {}  {} files, {} stored{}",
            short_id(s.id),
            s.created_at.format("%Y-%m-%d %H:%M:%S"),
            s.kind,
            s.set_name,
            s.files_total,
            format_size(s.bytes_stored),
            desc
        );
    }
    Ok(())
}

pub fn files(snapshot: &str, prefix: Option<&str>, json: bool, ctx: &Context) -> CommandResult {
    let snapshot = ctx.find_snapshot(snapshot)?;
    let manifest = match prefix {
        Some(prefix) => snapshot.manifest.filter_prefix(prefix),
        None => snapshot.manifest,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest.entries)?);
        return Ok(());
    }
    if manifest.is_empty() {
        println!("No files found.");
        return Ok(());
    }

    for (path, entry) in &manifest.entries {
        let mtime = DateTime::from_timestamp(entry.mtime, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:04o} {:>10}  {}  {}  {}",
            entry.mode & 0o7777,
            format_size(entry.size),
            mtime,
            short_id(entry.stored_in),
            path
        );
    }
    println!(
        "\n{} files, {}",
        manifest.len(),
        format_size(manifest.total_size())
    );
    Ok(())
}

pub fn verify(snapshot: Option<&str>, set: Option<&str>, ctx: &Context) -> CommandResult {
    let targets = match (snapshot, set) {
        (Some(identifier), _) => vec![ctx.find_snapshot(identifier)?],
        (None, Some(name)) => {
            let set = ctx.find_set(name)?;
            ctx.snapshots().list_for_set(set.id)?
        }
        (None, None) => return Err("Give a snapshot ID or --set <name>".into()),
    };

    if targets.is_empty() {
        println!("No snapshots to verify.");
        return Ok(());
    }

    let mut failed = 0;
    for snapshot in &targets {
        let report = verify_snapshot(&ctx.db, snapshot)?;
        if report.is_ok() {
            println!(
                "{} OK ({} entries checked)",
                snapshot.short_id(),
                report.entries_checked
            );
        } else {
            failed += 1;
            println!("{} FAILED", snapshot.short_id());
            for problem in &report.problems {
                println!("  - {problem}");
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} snapshot(s) failed verification", targets.len()).into());
    }
    Ok(())
}
