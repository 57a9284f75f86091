//! Config CLI commands
//!
//! Handles: backup config show/set/path

use super::CommandResult;
use clap::Subcommand;
use std::path::Path;
use tarbackup_core::config::{config_path, resolve_home};
use tarbackup_core::Config;

/// Config commands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a setting
    Set {
        /// One of compression_level, max_incrementals, default_excludes, archive_dir
        key: String,
        /// New value (comma-separated for default_excludes, empty to reset)
        value: String,
    },
    /// Print the config file location
    Path,
}

/// Execute config command
pub fn execute(cmd: ConfigCommands, home: Option<&Path>) -> CommandResult {
    let home = resolve_home(home)?;

    match cmd {
        ConfigCommands::Show { json } => {
            let config = Config::load(&home)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("compression_level = {}", config.compression_level);
                println!("max_incrementals = {}", config.max_incrementals);
                println!("default_excludes = {}", config.default_excludes.join(","));
                println!(
                    "archive_dir = {}",
                    config.archive_root(&home).display()
                );
            }
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load(&home)?;
            config.set(&key, &value)?;
            config.save(&home)?;
            println!("Set {key}");
        }
        ConfigCommands::Path => {
            println!("{}", config_path(&home).display());
        }
    }
    Ok(())
}
