use std::path::PathBuf;

use anyhow::Result;
use automanifest_core::{NudgePayload, ScheduledNudge};
use automanifest_store_sqlite::SqliteStore;
use time::OffsetDateTime;

/// Host-provided delivery of same-day nudges and deferred refreshes.
pub trait Scheduler {
    /// Deliver `payload` once at `fire_at`.
    ///
    /// # Errors
    /// Returns an error when the host rejects the request.
    fn schedule_daily(&mut self, fire_at: OffsetDateTime, payload: &NudgePayload) -> Result<()>;

    /// Drop every pending nudge.
    ///
    /// # Errors
    /// Returns an error when pending nudges cannot be removed.
    fn cancel_all(&mut self) -> Result<()>;

    /// Ask for a forced refresh no earlier than `earliest`.
    ///
    /// # Errors
    /// Returns an error when the host rejects the request.
    fn request_background_refresh(&mut self, earliest: OffsetDateTime) -> Result<()>;
}

/// Queues nudges and refresh requests in the planner database for an
/// external runner to deliver.
#[derive(Debug, Clone)]
pub struct SqliteScheduler {
    db_path: PathBuf,
}

impl SqliteScheduler {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn open_store(&self) -> Result<SqliteStore> {
        let mut store = SqliteStore::open(&self.db_path)?;
        store.migrate()?;
        Ok(store)
    }
}

impl Scheduler for SqliteScheduler {
    fn schedule_daily(&mut self, fire_at: OffsetDateTime, payload: &NudgePayload) -> Result<()> {
        let store = self.open_store()?;
        store.insert_nudge(&ScheduledNudge { fire_at, repeats: false, payload: payload.clone() })
    }

    fn cancel_all(&mut self) -> Result<()> {
        let store = self.open_store()?;
        let dropped = store.clear_nudges()?;
        tracing::debug!(dropped, "cancelled pending nudges");
        Ok(())
    }

    fn request_background_refresh(&mut self, earliest: OffsetDateTime) -> Result<()> {
        let store = self.open_store()?;
        store.set_refresh_request(earliest)?;
        Ok(())
    }
}
