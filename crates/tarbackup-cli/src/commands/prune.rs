use super::{confirm, CommandResult, Context};
use tarbackup_core::backup::{prune_set, PruneReport};
use tarbackup_core::snapshot::short_id;
use tarbackup_core::util::format_size;

fn print_removed(report: &PruneReport) {
    for removed in &report.removed {
        println!(
            "  {} ({})",
            short_id(removed.id),
            format_size(removed.archive_bytes)
        );
    }
}

pub fn execute(set: &str, keep: usize, dry_run: bool, force: bool, ctx: &Context) -> CommandResult {
    let set = ctx.find_set(set)?;

    // Always preview first; the real run repeats the same plan
    let preview = prune_set(&ctx.db, &set, keep, true)?;
    if preview.removed.is_empty() {
        println!("Nothing to prune ({} snapshot(s) kept).", preview.kept);
        return Ok(());
    }

    println!(
        "Keeping {} snapshot(s); {} can be removed ({})",
        preview.kept,
        preview.removed.len(),
        format_size(preview.bytes_freed)
    );

    if dry_run {
        println!("\nWould delete:");
        print_removed(&preview);
        println!("\nDry run - no changes made.");
        return Ok(());
    }

    if !force && !confirm("\nDelete these snapshots?")? {
        println!("Cancelled.");
        return Ok(());
    }

    let report = prune_set(&ctx.db, &set, keep, false)?;
    println!("\nDeleted:");
    print_removed(&report);
    println!(
        "\nRemoved {} snapshot(s), freed {}",
        report.removed.len(),
        format_size(report.bytes_freed)
    );
    Ok(())
}
