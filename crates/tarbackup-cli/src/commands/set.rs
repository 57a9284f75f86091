//! Backup set CLI commands
//!
//! Handles: backup set add/list/show/remove

use super::{confirm, CommandResult, Context};
use clap::Subcommand;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tarbackup_core::backup::remove_archive;
use tarbackup_core::set::canonical_sources;
use tarbackup_core::snapshot::short_id;
use tarbackup_core::util::format_size;
use tarbackup_core::BackupSet;

/// Backup set commands
#[derive(Subcommand)]
pub enum SetCommands {
    /// Define a new backup set
    Add {
        /// Set name
        name: String,
        /// Directories to back up
        #[arg(required = true, value_name = "SOURCE")]
        sources: Vec<PathBuf>,
        /// Glob pattern to exclude (can specify multiple times)
        #[arg(short, long = "exclude", value_name = "PATTERN")]
        excludes: Vec<String>,
        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List backup sets
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a backup set
    Show {
        /// Set name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a backup set and its snapshots
    Remove {
        /// Set name
        name: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
        /// Leave archive files on disk
        #[arg(long)]
        keep_archives: bool,
    },
}

/// Execute set command
pub fn execute(cmd: SetCommands, ctx: &Context) -> CommandResult {
    match cmd {
        SetCommands::Add {
            name,
            sources,
            excludes,
            description,
        } => {
            let sources = canonical_sources(&sources)?;
            let mut set = BackupSet::new(name, sources).with_excludes(excludes);
            if let Some(desc) = description {
                set = set.with_description(desc);
            }
            set.validate()?;
            ctx.sets().create(&set)?;

            println!("Created backup set '{}'", set.name);
            for source in &set.sources {
                println!("  {}", source.display());
            }
        }
        SetCommands::List { json } => {
            let sets = ctx.sets().list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sets)?);
            } else if sets.is_empty() {
                println!("No backup sets found.");
            } else {
                println!("Backup sets:");
                for set in sets {
                    let desc = set.description.as_deref().unwrap_or("No description");
                    println!("  {} - {} source(s) ({})", set.name, set.sources.len(), desc);
                }
            }
        }
        SetCommands::Show { name, json } => {
            let set = ctx.find_set(&name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&set)?);
                return Ok(());
            }

            let snapshots = ctx.snapshots().list_summaries(Some(set.id))?;
            println!("Set: {}", set.name);
            println!("ID: {}", set.id);
            if let Some(desc) = &set.description {
                println!("Description: {desc}");
            }
            println!("Created: {}", set.created_at.format("%Y-%m-%d %H:%M"));
            println!("\nSources:");
            for source in &set.sources {
                println!("  {}", source.display());
            }
            if !set.excludes.is_empty() {
                println!("\nExcludes:");
                for pattern in &set.excludes {
                    println!("  {pattern}");
                }
            }
            println!("\nSnapshots: {}", snapshots.len());
            if let Some(latest) = snapshots.first() {
                println!(
                    "Latest: {} ({}, {}, {} files)",
                    short_id(latest.id),
                    latest.kind,
                    latest.created_at.format("%Y-%m-%d %H:%M"),
                    latest.files_total
                );
            }
        }
        SetCommands::Remove {
            name,
            force,
            keep_archives,
        } => {
            let set = ctx.find_set(&name)?;
            let snapshots = ctx.snapshots().list_for_set(set.id)?;

            if !force
                && !confirm(&format!(
                    "Remove backup set '{}' and its {} snapshot(s)?",
                    set.name,
                    snapshots.len()
                ))?
            {
                println!("Cancelled.");
                return Ok(());
            }

            ctx.sets().delete(set.id)?;

            let mut freed = 0;
            if !keep_archives {
                let mut dirs = BTreeSet::new();
                for snapshot in &snapshots {
                    freed += remove_archive(snapshot);
                    dirs.extend(snapshot.archive_path.parent().map(Path::to_path_buf));
                }
                dirs.insert(ctx.archive_root().join(&set.name));
                // Directories still holding other files stay
                for dir in dirs {
                    if std::fs::remove_dir(&dir).is_ok() {
                        tracing::debug!(dir = %dir.display(), "Removed archive directory");
                    }
                }
            }

            println!("Removed backup set '{}'", set.name);
            if !keep_archives && !snapshots.is_empty() {
                println!(
                    "Deleted {} archive(s), freed {}",
                    snapshots.len(),
                    format_size(freed)
                );
            }
        }
    }
    Ok(())
}
