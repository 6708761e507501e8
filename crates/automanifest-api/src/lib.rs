use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use automanifest_core::{SavedState, ScheduledNudge};
use automanifest_store_sqlite::{
    IntegrityReport, RefreshRequest, SavedStateHealth, SchemaStatus, SqliteStore,
};
use serde::{Deserialize, Serialize};

pub mod activity_file;
pub mod config;
pub mod coordinator;
pub mod scheduler;

pub use activity_file::{ActivityFile, CompletedReminder, JsonActivitySource};
pub use config::{ConfigError, PlannerConfig, TimeOfDay, DEFAULT_DB_PATH, DEFAULT_INTENTION};
pub use coordinator::{Coordinator, PlanUpdate, RefreshOutcome, UpdateOrigin};
pub use scheduler::{Scheduler, SqliteScheduler};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyResult {
    pub commitment_hex: String,
    pub seed_hex: String,
    pub valid: bool,
}

/// Read-side and maintenance operations over the planner database.
#[derive(Debug, Clone)]
pub struct PlannerApi {
    db_path: PathBuf,
}

impl PlannerApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db_path)
    }

    fn open_migrated(&self) -> Result<SqliteStore> {
        let mut store = self.open_store()?;
        store.migrate()?;
        Ok(store)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Stored plan; a record that no longer decodes counts as absent.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or migrated.
    pub fn saved_state(&self) -> Result<Option<SavedState>> {
        match self.open_migrated()?.load_state() {
            Ok(state) => Ok(state),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "ignoring unreadable saved plan");
                Ok(None)
            }
        }
    }

    /// Check the saved plan's commitment against its revealed seed.
    ///
    /// # Errors
    /// Returns an error when no plan is saved or the revealed seed is malformed.
    pub fn verify_saved(&self) -> Result<VerifyResult> {
        let state = self.saved_state()?.ok_or_else(|| anyhow!("no saved plan to verify"))?;
        let valid = state.verify().map_err(|err| anyhow!("verification failed: {err}"))?;
        Ok(VerifyResult {
            commitment_hex: state.commitment_hex().to_string(),
            seed_hex: state.seed_hex,
            valid,
        })
    }

    /// Stored intention text; `None` when never set.
    ///
    /// # Errors
    /// Returns an error when the stored value cannot be read.
    pub fn intention(&self) -> Result<Option<String>> {
        self.open_migrated()?.intention()
    }

    /// # Errors
    /// Returns an error when the intention cannot be written.
    pub fn set_intention(&self, text: &str) -> Result<()> {
        self.open_migrated()?.set_intention(text)
    }

    /// # Errors
    /// Returns an error when queued nudges cannot be read.
    pub fn nudges(&self) -> Result<Vec<ScheduledNudge>> {
        self.open_migrated()?.list_nudges()
    }

    /// # Errors
    /// Returns an error when the refresh request cannot be read.
    pub fn refresh_request(&self) -> Result<Option<RefreshRequest>> {
        self.open_migrated()?.refresh_request()
    }

    /// # Errors
    /// Returns an error when the backup cannot be written.
    pub fn backup(&self, out_file: &Path) -> Result<()> {
        self.open_migrated()?.backup_database(out_file)
    }

    /// # Errors
    /// Returns an error when the backup is missing or cannot be restored.
    pub fn restore(&self, in_file: &Path) -> Result<SavedStateHealth> {
        let health = self.open_store()?.restore_database(in_file)?;
        if health == SavedStateHealth::Unreadable {
            tracing::warn!(backup = %in_file.display(), "restored plan does not decode");
        }
        Ok(health)
    }

    /// # Errors
    /// Returns an error when an integrity probe fails to run.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        self.open_store()?.integrity_check()
    }
}
