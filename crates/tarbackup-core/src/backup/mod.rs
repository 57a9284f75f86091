//! Backup runs, restore, verification and retention

pub mod create;
pub mod prune;
pub mod restore;
pub mod verify;

pub use create::{run_backup, BackupError, BackupOptions, BackupOutcome, DryRunReport};
pub use prune::{plan_prune, prune_set, remove_archive, PruneError, PrunePlan, PruneReport};
pub use restore::{plan_restore, restore_snapshot, RestoreError, RestoreOptions, RestoreReport};
pub use verify::{verify_snapshot, VerifyProblem, VerifyReport};
