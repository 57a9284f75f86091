//! tarbackup CLI - the `backup` command
//!
//! Provides `backup set`, `backup run`, `backup restore`, and the other
//! snapshot commands.

mod commands;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::config::ConfigCommands;
use commands::run::RunArgs;
use commands::set::SetCommands;
use commands::{CommandResult, Context};

#[derive(Parser)]
#[command(name = "backup")]
#[command(about = "Backup Manager")]
#[command(version)]
struct Cli {
    /// Print debug logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory (defaults to $TARBACKUP_HOME, then ~/.tarbackup)
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage backup sets
    Set {
        #[command(subcommand)]
        action: SetCommands,
    },
    /// Back up a set
    Run {
        /// Set name
        set: String,
        /// Take a full snapshot even if an incremental would do
        #[arg(long)]
        full: bool,
        /// Create a snapshot even if nothing changed
        #[arg(long)]
        force: bool,
        /// Compare file contents instead of size and mtime
        #[arg(long)]
        checksum: bool,
        /// Show what would be stored without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Snapshot description
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Show changes since the latest snapshot
    Status {
        /// Set name
        set: String,
        /// Compare file contents instead of size and mtime
        #[arg(long)]
        checksum: bool,
        /// List every pending path
        #[arg(long)]
        list: bool,
    },
    /// List snapshots, newest first
    List {
        /// Only this set
        set: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the files in a snapshot
    Files {
        /// Snapshot ID or prefix
        snapshot: String,
        /// Only paths under this archive path
        #[arg(long)]
        prefix: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check archives against their recorded checksums
    Verify {
        /// Snapshot ID or prefix
        #[arg(required_unless_present = "set")]
        snapshot: Option<String>,
        /// Verify every snapshot of this set
        #[arg(long, conflicts_with = "snapshot")]
        set: Option<String>,
    },
    /// Restore a snapshot into a directory
    Restore {
        /// Snapshot ID or prefix
        snapshot: String,
        /// Directory to restore into
        target: PathBuf,
        /// Only restore this file or directory (archive path)
        #[arg(long)]
        prefix: Option<String>,
        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,
    },
    /// Delete old snapshots
    Prune {
        /// Set name
        set: String,
        /// Number of newest snapshots to keep
        #[arg(long)]
        keep: usize,
        /// Preview what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = dispatch(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> CommandResult {
    let home = cli.home.as_deref();
    let open = || Context::open(home);

    match cli.command {
        Commands::Config { action } => commands::config::execute(action, home),
        Commands::Set { action } => commands::set::execute(action, &open()?),
        Commands::Run {
            set,
            full,
            force,
            checksum,
            dry_run,
            message,
        } => commands::run::run(
            RunArgs {
                set,
                full,
                force,
                checksum,
                dry_run,
                message,
            },
            &open()?,
        ),
        Commands::Status {
            set,
            checksum,
            list,
        } => commands::run::status(&set, checksum, list, &open()?),
        Commands::List { set, json } => commands::snapshot::list(set.as_deref(), json, &open()?),
        Commands::Files {
            snapshot,
            prefix,
            json,
        } => commands::snapshot::files(&snapshot, prefix.as_deref(), json, &open()?),
        Commands::Verify { snapshot, set } => {
            commands::snapshot::verify(snapshot.as_deref(), set.as_deref(), &open()?)
        }
        Commands::Restore {
            snapshot,
            target,
            prefix,
            overwrite,
        } => commands::restore::execute(&snapshot, &target, prefix, overwrite, &open()?),
        Commands::Prune {
            set,
            keep,
            dry_run,
            force,
        } => commands::prune::execute(&set, keep, dry_run, force, &open()?),
    }
}
