//! CLI command handlers
//!
//! Set and config management have their own subcommand enums; the
//! snapshot commands are plain handlers called from `main`.

pub mod config;
pub mod prune;
pub mod restore;
pub mod run;
pub mod set;
pub mod snapshot;

use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tarbackup_core::config::{catalog_path, resolve_home};
use tarbackup_core::storage::{Database, SetStore, SnapshotStore};
use tarbackup_core::{BackupSet, Config, Snapshot};

pub type CommandResult = Result<(), Box<dyn Error>>;

/// Data directory, config and open catalog for one invocation
pub struct Context {
    pub home: PathBuf,
    pub config: Config,
    pub db: Database,
}

impl Context {
    pub fn open(home: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let home = resolve_home(home)?;
        std::fs::create_dir_all(&home)?;
        let config = Config::load(&home)?;
        let db = Database::open(&catalog_path(&home))?;
        tracing::debug!(home = %home.display(), "Opened catalog");
        Ok(Self { home, config, db })
    }

    pub fn sets(&self) -> SetStore<'_> {
        SetStore::new(self.db.connection())
    }

    pub fn snapshots(&self) -> SnapshotStore<'_> {
        SnapshotStore::new(self.db.connection())
    }

    pub fn archive_root(&self) -> PathBuf {
        self.config.archive_root(&self.home)
    }

    pub fn find_set(&self, name: &str) -> Result<BackupSet, Box<dyn Error>> {
        Ok(self
            .sets()
            .get_by_name(name)?
            .ok_or_else(|| format!("Backup set not found: {name}"))?)
    }

    /// Look up a snapshot by full ID or unambiguous prefix
    pub fn find_snapshot(&self, identifier: &str) -> Result<Snapshot, Box<dyn Error>> {
        Ok(self
            .snapshots()
            .find(identifier)?
            .ok_or_else(|| format!("Snapshot not found: {identifier}"))?)
    }
}

/// Ask a yes/no question on stdout; anything but `y` means no
pub fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
