use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use automanifest_core::{NudgePayload, SavedState, ScheduledNudge};
use rusqlite::{params, Connection, DatabaseName, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Storage key of the last derived plan.
pub const STATE_KEY: &str = "auto_manifest_state_v1";
/// Storage key of the user's intention text.
pub const INTENTION_KEY: &str = "current_intention";
/// Storage key of the pending background refresh request.
pub const REFRESH_REQUEST_KEY: &str = "background_refresh_request";

const LATEST_SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS kv_store (
  key TEXT PRIMARY KEY,
  value_json TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

const MIGRATION_002_SQL: &str = r"
CREATE TABLE IF NOT EXISTS scheduled_nudges (
  identifier TEXT PRIMARY KEY,
  fire_at TEXT NOT NULL,
  repeats INTEGER NOT NULL CHECK (repeats IN (0, 1)),
  title TEXT NOT NULL,
  body TEXT NOT NULL,
  created_at TEXT NOT NULL
);
";

const MIGRATIONS: [(i64, &str); 2] = [(1, MIGRATION_001_SQL), (2, MIGRATION_002_SQL)];

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

/// Whether the stored plan under [`STATE_KEY`] still decodes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SavedStateHealth {
    Absent,
    Readable,
    Unreadable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub saved_state: SavedStateHealth,
    pub queued_nudges: usize,
    pub schema_status: SchemaStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub earliest: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
}

impl SqliteStore {
    /// Open a SQLite-backed planner store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when any migration step fails or the database is newer
    /// than this build understands.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let current = current_schema_version(&self.conn)?;
        if current > LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {current}; expected at most {LATEST_SCHEMA_VERSION}"
            ));
        }

        for (version, sql) in MIGRATIONS {
            if version <= current {
                continue;
            }
            let tx = self
                .conn
                .transaction()
                .with_context(|| format!("failed to start migration v{version}"))?;
            tx.execute_batch(sql).with_context(|| format!("failed to apply migration v{version}"))?;
            tx.execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![version, now_rfc3339()?],
            )
            .with_context(|| format!("failed to record migration version {version}"))?;
            tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        }

        Ok(())
    }

    /// Serialize `value` as JSON and store it under `key`, replacing any prior value.
    ///
    /// # Errors
    /// Returns an error when serialization or the write fails.
    pub fn put_value<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value_json = serde_json::to_string(value)
            .with_context(|| format!("failed to serialize value for key {key}"))?;
        self.conn
            .execute(
                "INSERT INTO kv_store(key, value_json, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value_json = excluded.value_json,
                   updated_at = excluded.updated_at",
                params![key, value_json, now_rfc3339()?],
            )
            .with_context(|| format!("failed to write key {key}"))?;
        Ok(())
    }

    /// Load and decode the value stored under `key`.
    ///
    /// # Errors
    /// Returns an error when the read fails or the stored JSON does not decode as `T`.
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw = self
            .conn
            .query_row("SELECT value_json FROM kv_store WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .with_context(|| format!("failed to read key {key}"))?;

        raw.map(|json| {
            serde_json::from_str(&json).with_context(|| format!("failed to decode value for key {key}"))
        })
        .transpose()
    }

    /// # Errors
    /// Returns an error when the delete fails.
    pub fn delete_value(&self, key: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .with_context(|| format!("failed to delete key {key}"))?;
        Ok(removed > 0)
    }

    /// Overwrite the saved plan. Last writer wins.
    ///
    /// # Errors
    /// Returns an error when serialization or the write fails.
    pub fn save_state(&self, state: &SavedState) -> Result<()> {
        self.put_value(STATE_KEY, state)
    }

    /// # Errors
    /// Returns an error when the stored state cannot be read or decoded.
    pub fn load_state(&self) -> Result<Option<SavedState>> {
        self.get_value(STATE_KEY)
    }

    /// # Errors
    /// Returns an error when the write fails.
    pub fn set_intention(&self, text: &str) -> Result<()> {
        self.put_value(INTENTION_KEY, &text)
    }

    /// The stored intention text; `None` when never set.
    ///
    /// # Errors
    /// Returns an error when the stored value cannot be read or decoded.
    pub fn intention(&self) -> Result<Option<String>> {
        self.get_value(INTENTION_KEY)
    }

    /// # Errors
    /// Returns an error when the write fails.
    pub fn set_refresh_request(&self, earliest: OffsetDateTime) -> Result<RefreshRequest> {
        let request = RefreshRequest { earliest, requested_at: OffsetDateTime::now_utc() };
        self.put_value(REFRESH_REQUEST_KEY, &request)?;
        Ok(request)
    }

    /// # Errors
    /// Returns an error when the stored request cannot be read or decoded.
    pub fn refresh_request(&self) -> Result<Option<RefreshRequest>> {
        self.get_value(REFRESH_REQUEST_KEY)
    }

    /// Queue one nudge; an existing nudge with the same identifier is replaced.
    ///
    /// # Errors
    /// Returns an error when the write fails.
    pub fn insert_nudge(&self, nudge: &ScheduledNudge) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO scheduled_nudges(
                    identifier, fire_at, repeats, title, body, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    nudge.payload.identifier,
                    rfc3339(nudge.fire_at)?,
                    nudge.repeats,
                    nudge.payload.title,
                    nudge.payload.body,
                    now_rfc3339()?,
                ],
            )
            .with_context(|| format!("failed to queue nudge {}", nudge.payload.identifier))?;
        Ok(())
    }

    /// Remove every queued nudge, returning how many were dropped.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub fn clear_nudges(&self) -> Result<usize> {
        self.conn.execute("DELETE FROM scheduled_nudges", []).context("failed to clear nudges")
    }

    /// Queued nudges ordered by fire instant, then identifier.
    ///
    /// `fire_at` keeps the offset it was scheduled with, so rows are sorted
    /// after decoding rather than by their RFC 3339 text.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_nudges(&self) -> Result<Vec<ScheduledNudge>> {
        let mut stmt = self.conn.prepare(
            "SELECT identifier, fire_at, repeats, title, body
             FROM scheduled_nudges",
        )?;

        let mut rows = stmt.query([])?;
        let mut nudges = Vec::new();
        while let Some(row) = rows.next()? {
            nudges.push(ScheduledNudge {
                fire_at: parse_rfc3339(&row.get::<_, String>(1)?)?,
                repeats: row.get(2)?,
                payload: NudgePayload {
                    identifier: row.get(0)?,
                    title: row.get(3)?,
                    body: row.get(4)?,
                },
            });
        }

        nudges.sort_by(|lhs, rhs| {
            lhs.fire_at
                .cmp(&rhs.fire_at)
                .then_with(|| lhs.payload.identifier.cmp(&rhs.payload.identifier))
        });
        Ok(nudges)
    }

    /// Create a `SQLite` backup file of the current main database.
    ///
    /// # Errors
    /// Returns an error when backup directories cannot be created or backup fails.
    pub fn backup_database(&self, out_file: &Path) -> Result<()> {
        if let Some(parent) = out_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory for backup file {}", out_file.display())
            })?;
        }

        self.conn
            .backup(DatabaseName::Main, out_file, None)
            .with_context(|| format!("failed to create sqlite backup at {}", out_file.display()))
    }

    /// Restore this database from a `SQLite` backup file, migrate to latest,
    /// and report whether the restored plan still decodes.
    ///
    /// # Errors
    /// Returns an error when the backup file is missing, restore fails, or migrations fail.
    pub fn restore_database(&mut self, in_file: &Path) -> Result<SavedStateHealth> {
        if !in_file.exists() {
            return Err(anyhow!("backup file does not exist: {}", in_file.display()));
        }

        self.conn
            .restore(DatabaseName::Main, in_file, None::<fn(rusqlite::backup::Progress)>)
            .with_context(|| {
                format!("failed to restore sqlite backup from {}", in_file.display())
            })?;

        self.migrate()?;
        Ok(self.saved_state_health())
    }

    /// Classify the stored plan. Requires the `kv_store` table.
    #[must_use]
    pub fn saved_state_health(&self) -> SavedStateHealth {
        match self.load_state() {
            Ok(Some(_)) => SavedStateHealth::Readable,
            Ok(None) => SavedStateHealth::Absent,
            Err(_) => SavedStateHealth::Unreadable,
        }
    }

    /// Run quick-check, schema status and stored-plan health probes.
    ///
    /// # Errors
    /// Returns an error when any integrity probe query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let schema_status = self.schema_status()?;
        // Tables appear only once v2 has run; an unmigrated file holds no plan.
        let (saved_state, queued_nudges) = if schema_status.pending_versions.is_empty() {
            let queued: i64 = self
                .conn
                .query_row("SELECT COUNT(*) FROM scheduled_nudges", [], |row| row.get(0))
                .context("failed to count queued nudges")?;
            (self.saved_state_health(), usize::try_from(queued).unwrap_or(0))
        } else {
            (SavedStateHealth::Absent, 0)
        };

        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            saved_state,
            queued_nudges,
            schema_status,
        })
    }
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}
