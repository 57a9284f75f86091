use super::{CommandResult, Context};
use std::path::Path;
use tarbackup_core::backup::{plan_restore, restore_snapshot, RestoreOptions};
use tarbackup_core::util::format_size;

pub fn execute(
    snapshot: &str,
    target: &Path,
    prefix: Option<String>,
    overwrite: bool,
    ctx: &Context,
) -> CommandResult {
    let snapshot = ctx.find_snapshot(snapshot)?;
    let options = RestoreOptions { prefix, overwrite };

    let plan = plan_restore(&ctx.db, &snapshot, options.prefix.as_deref())?;
    println!(
        "Restoring {} files from snapshot {} ({} archive(s)) into {}",
        plan.file_count(),
        snapshot.short_id(),
        plan.groups.len(),
        target.display()
    );

    let report = restore_snapshot(&ctx.db, &snapshot, target, &options)?;
    println!(
        "Restored {} files ({}).",
        report.files_restored,
        format_size(report.bytes_restored)
    );
    Ok(())
}
