//! CLI integration tests using assert_cmd
//!
//! These tests verify the CLI commands work correctly end-to-end.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A data directory plus a small source tree to back up
struct Env {
    temp: TempDir,
}

impl Env {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let source = temp.path().join("docs");
        fs::create_dir_all(source.join("notes")).unwrap();
        fs::write(source.join("readme.txt"), "hello\n").unwrap();
        fs::write(source.join("notes/today.md"), "# Today\n").unwrap();
        fs::write(source.join("cache.tmp"), "junk").unwrap();
        Self { temp }
    }

    fn source(&self) -> PathBuf {
        self.temp.path().join("docs")
    }

    fn home(&self) -> PathBuf {
        self.temp.path().join("data")
    }

    /// A `backup` command isolated from the real home directory
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("backup").expect("Failed to find backup binary");
        cmd.env("HOME", self.temp.path())
            .env("TARBACKUP_HOME", self.home())
            .env_remove("RUST_LOG");
        cmd
    }

    fn add_set(&self) {
        self.cmd()
            .args(["set", "add", "docs"])
            .arg(self.source())
            .args(["--exclude", "*.tmp"])
            .assert()
            .success();
    }

    fn run_set(&self) {
        self.cmd().args(["run", "docs"]).assert().success();
    }

    /// IDs of all snapshots, newest first
    fn snapshot_ids(&self) -> Vec<String> {
        let output = self.cmd().args(["list", "--json"]).output().unwrap();
        assert!(output.status.success());
        let summaries: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
        summaries
            .iter()
            .map(|s| s["id"].as_str().unwrap().to_string())
            .collect()
    }
}

fn archive_files(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default()
}

#[test]
fn test_help_command() {
    let env = Env::new();
    env.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup Manager"));
}

#[test]
fn test_version_command() {
    let env = Env::new();
    env.cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("backup 0.1.0"));
}

#[test]
fn test_set_list_empty() {
    let env = Env::new();
    env.cmd()
        .args(["set", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backup sets found."));
}

#[test]
fn test_set_add_and_show() {
    let env = Env::new();
    env.add_set();

    env.cmd()
        .args(["set", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("docs - 1 source(s)"));

    env.cmd()
        .args(["set", "show", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("*.tmp"))
        .stdout(predicate::str::contains("Snapshots: 0"));
}

#[test]
fn test_set_add_duplicate_fails() {
    let env = Env::new();
    env.add_set();

    env.cmd()
        .args(["set", "add", "docs"])
        .arg(env.source())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_set_add_missing_source_fails() {
    let env = Env::new();
    env.cmd()
        .args(["set", "add", "ghost"])
        .arg(env.temp.path().join("does-not-exist"))
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}

#[test]
fn test_run_unknown_set_fails() {
    let env = Env::new();
    env.cmd()
        .args(["run", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Backup set not found: nope"));
}

#[test]
fn test_run_then_unchanged() {
    let env = Env::new();
    env.add_set();

    env.cmd()
        .args(["run", "docs", "-m", "first"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created full snapshot"))
        .stdout(predicate::str::contains("2 total"));

    env.cmd()
        .args(["run", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes since snapshot"));

    env.cmd()
        .args(["list", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("full"))
        .stdout(predicate::str::contains("first"));
}

#[test]
fn test_run_dry_run_writes_nothing() {
    let env = Env::new();
    env.add_set();

    env.cmd()
        .args(["run", "docs", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run - no changes made."));

    assert!(!env.home().join("archives").exists());
    assert!(env.snapshot_ids().is_empty());
}

#[test]
fn test_status_lists_pending_changes() {
    let env = Env::new();
    env.add_set();

    env.cmd()
        .args(["status", "docs", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added: 2"))
        .stdout(predicate::str::contains("A docs/readme.txt"))
        .stdout(predicate::str::contains("cache.tmp").not());
}

#[test]
fn test_backup_restore_round_trip() {
    let env = Env::new();
    env.add_set();
    env.run_set();

    fs::write(env.source().join("readme.txt"), "hello again\n").unwrap();
    env.run_set();

    let ids = env.snapshot_ids();
    assert_eq!(ids.len(), 2);

    env.cmd()
        .args(["files", &ids[0]])
        .assert()
        .success()
        .stdout(predicate::str::contains("docs/notes/today.md"));

    let target = env.temp.path().join("restored");
    env.cmd()
        .args(["restore", &ids[0]])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored 2 files"));

    assert_eq!(
        fs::read_to_string(target.join("docs/readme.txt")).unwrap(),
        "hello again\n"
    );
    assert_eq!(
        fs::read_to_string(target.join("docs/notes/today.md")).unwrap(),
        "# Today\n"
    );
    assert!(!target.join("docs/cache.tmp").exists());

    // Second restore into the same place needs --overwrite
    env.cmd()
        .args(["restore", &ids[0]])
        .arg(&target)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Refusing to overwrite"));

    env.cmd()
        .args(["restore", &ids[0], "--overwrite"])
        .arg(&target)
        .assert()
        .success();
}

#[test]
fn test_verify_detects_tampering() {
    let env = Env::new();
    env.add_set();
    env.run_set();

    env.cmd()
        .args(["verify", "--set", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));

    let archives = archive_files(&env.home().join("archives/docs"));
    assert_eq!(archives.len(), 1);
    let mut bytes = fs::read(&archives[0]).unwrap();
    bytes.extend_from_slice(b"tampered");
    fs::write(&archives[0], bytes).unwrap();

    let ids = env.snapshot_ids();
    env.cmd()
        .args(["verify", &ids[0]])
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"))
        .stderr(predicate::str::contains("failed verification"));
}

#[test]
fn test_prune_keeps_latest_chain() {
    let env = Env::new();
    env.add_set();
    env.run_set();
    env.cmd().args(["run", "docs", "--full"]).assert().success();

    env.cmd()
        .args(["prune", "docs", "--keep", "1", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run - no changes made."));
    assert_eq!(env.snapshot_ids().len(), 2);

    env.cmd()
        .args(["prune", "docs", "--keep", "1", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 snapshot(s)"));
    assert_eq!(env.snapshot_ids().len(), 1);
    assert_eq!(archive_files(&env.home().join("archives/docs")).len(), 1);
}

#[test]
fn test_prune_keep_zero_fails() {
    let env = Env::new();
    env.add_set();
    env.cmd()
        .args(["prune", "docs", "--keep", "0", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("keep at least one"));
}

#[test]
fn test_set_remove_deletes_archives() {
    let env = Env::new();
    env.add_set();
    env.run_set();

    env.cmd()
        .args(["set", "remove", "docs", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed backup set 'docs'"));

    assert!(env.snapshot_ids().is_empty());
    assert!(archive_files(&env.home().join("archives/docs")).is_empty());
}

#[test]
fn test_set_remove_cleans_every_archive_dir() {
    let env = Env::new();
    env.add_set();

    let elsewhere = env.temp.path().join("elsewhere");
    env.cmd()
        .args(["config", "set", "archive_dir"])
        .arg(&elsewhere)
        .assert()
        .success();
    env.run_set();
    assert_eq!(archive_files(&elsewhere.join("docs")).len(), 1);

    env.cmd()
        .args(["config", "set", "archive_dir", ""])
        .assert()
        .success();
    env.cmd().args(["run", "docs", "--full"]).assert().success();
    assert_eq!(env.snapshot_ids().len(), 2);

    env.cmd()
        .args(["set", "remove", "docs", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 2 archive(s)"));

    assert!(!elsewhere.join("docs").exists());
    assert!(!env.home().join("archives/docs").exists());
}

#[test]
fn test_config_set_and_show() {
    let env = Env::new();

    env.cmd()
        .args(["config", "set", "compression_level", "3"])
        .assert()
        .success();

    env.cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("compression_level = 3"));

    env.cmd()
        .args(["config", "set", "compression_level", "12"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("compression_level"));

    env.cmd()
        .args(["config", "set", "colour", "blue"])
        .assert()
        .failure();
}

#[test]
fn test_config_path_uses_home_flag() {
    let env = Env::new();
    let custom = env.temp.path().join("elsewhere");
    env.cmd()
        .arg("--home")
        .arg(&custom)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("elsewhere"))
        .stdout(predicate::str::contains("config.json"));
}
