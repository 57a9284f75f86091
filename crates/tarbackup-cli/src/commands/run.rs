//! Backup runs and pending-change status
//!
//! Handles: backup run, backup status

use super::{CommandResult, Context};
use tarbackup_core::backup::{run_backup, BackupOptions, BackupOutcome, DryRunReport};
use tarbackup_core::changes::{detect_changes, Change, DetectMode};
use tarbackup_core::scan::scan_set;
use tarbackup_core::util::format_size;
use tarbackup_core::SnapshotKind;

/// Flags of `backup run`
pub struct RunArgs {
    pub set: String,
    pub full: bool,
    pub force: bool,
    pub checksum: bool,
    pub dry_run: bool,
    pub message: Option<String>,
}

fn detect_mode(checksum: bool) -> DetectMode {
    if checksum {
        DetectMode::Checksum
    } else {
        DetectMode::Metadata
    }
}

pub fn run(args: RunArgs, ctx: &Context) -> CommandResult {
    let set = ctx.find_set(&args.set)?;
    let options = BackupOptions {
        full: args.full,
        force: args.force,
        dry_run: args.dry_run,
        mode: detect_mode(args.checksum),
        description: args.message,
    };

    match run_backup(&ctx.db, &set, &ctx.config, &ctx.archive_root(), &options)? {
        BackupOutcome::Created(snapshot) => {
            let stats = &snapshot.stats;
            println!(
                "Created {} snapshot {} of '{}'",
                snapshot.kind,
                snapshot.short_id(),
                set.name
            );
            println!(
                "  Files: {} total, {} stored ({})",
                stats.files_total,
                stats.files_stored,
                format_size(stats.bytes_stored)
            );
            println!(
                "  Changes: {} added, {} modified, {} deleted",
                stats.added, stats.modified, stats.deleted
            );
            if stats.skipped > 0 {
                println!("  Skipped: {} unreadable entries (run with -v for details)", stats.skipped);
            }
            println!("  Archive: {}", snapshot.archive_path.display());
        }
        BackupOutcome::Unchanged { latest } => {
            println!(
                "No changes since snapshot {} - nothing to back up.",
                latest.short_id()
            );
            println!("Use --force to create a snapshot anyway.");
        }
        BackupOutcome::DryRun(report) => {
            print_dry_run(&set.name, &report);
            println!("\nDry run - no changes made.");
        }
    }
    Ok(())
}

fn print_dry_run(set: &str, report: &DryRunReport) {
    println!("Would create {} snapshot of '{set}'", report.kind);
    println!(
        "  Changes: {} added, {} modified, {} deleted, {} unchanged",
        report.added, report.modified, report.deleted, report.unchanged
    );
    println!(
        "  Would store {} files ({})",
        report.files_to_store,
        format_size(report.bytes_to_store)
    );
}

pub fn status(set: &str, checksum: bool, list: bool, ctx: &Context) -> CommandResult {
    let set = ctx.find_set(set)?;
    let scan = scan_set(&set, &ctx.config.default_excludes)?;
    let latest = ctx.snapshots().latest_for_set(set.id)?;
    let changes = detect_changes(
        scan.files,
        latest.as_ref().map(|s| &s.manifest),
        detect_mode(checksum),
    );

    println!("Set: {}", set.name);
    match &latest {
        Some(snapshot) => {
            println!(
                "Latest snapshot: {} ({}, {})",
                snapshot.short_id(),
                snapshot.kind,
                snapshot.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            let next = if snapshot.chain_depth >= ctx.config.max_incrementals {
                SnapshotKind::Full
            } else {
                SnapshotKind::Incremental
            };
            println!("Next run: {next}");
        }
        None => println!("No snapshots yet - the next run will be full."),
    }

    println!(
        "\nAdded: {}  Modified: {}  Deleted: {}  Unchanged: {}",
        changes.added(),
        changes.modified(),
        changes.deleted.len(),
        changes.unchanged()
    );
    if scan.skipped > 0 {
        println!("Unreadable: {}", scan.skipped);
    }
    if latest.is_some() && changes.is_empty() {
        println!("Nothing to back up.");
    } else {
        println!("Pending: {}", format_size(changes.pending_bytes()));
    }

    if list {
        for change in changes.pending() {
            let tag = if change.change == Change::Added { 'A' } else { 'M' };
            println!("  {tag} {}", change.file.archive_path);
        }
        for path in &changes.deleted {
            println!("  D {path}");
        }
    }
    Ok(())
}
