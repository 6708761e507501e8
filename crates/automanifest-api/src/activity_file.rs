//! Calendar and reminder exports read from a JSON file.

use std::path::Path;

use anyhow::{Context, Result};
use automanifest_core::{ActivityError, ActivitySource, CalendarEvent};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CompletedReminder {
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

fn default_access_granted() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ActivityFile {
    #[serde(default = "default_access_granted")]
    pub access_granted: bool,
    #[serde(default)]
    pub events: Vec<CalendarEvent>,
    #[serde(default)]
    pub completed_reminders: Vec<CompletedReminder>,
}

/// [`ActivitySource`] over an [`ActivityFile`]; a file with
/// `access_granted: false` behaves like a provider the user has not authorized.
#[derive(Debug, Clone)]
pub struct JsonActivitySource {
    file: ActivityFile,
}

impl JsonActivitySource {
    #[must_use]
    pub fn new(file: ActivityFile) -> Self {
        Self { file }
    }

    /// # Errors
    /// Returns an error when the file cannot be read or decoded.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read activity file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("failed to decode activity file {}", path.display()))
    }

    /// # Errors
    /// Returns an error when `json` is not a valid activity document.
    pub fn parse(json: &str) -> Result<Self> {
        let file = serde_json::from_str(json).context("invalid activity JSON")?;
        Ok(Self::new(file))
    }

    fn ensure_access(&self) -> Result<(), ActivityError> {
        if self.file.access_granted {
            Ok(())
        } else {
            Err(ActivityError::AccessDenied)
        }
    }
}

impl ActivitySource for JsonActivitySource {
    fn request_access(&mut self) -> Result<(), ActivityError> {
        self.ensure_access()
    }

    fn events_between(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<CalendarEvent>, ActivityError> {
        self.ensure_access()?;
        Ok(self
            .file
            .events
            .iter()
            .filter(|event| event.start >= start && event.start < end)
            .cloned()
            .collect())
    }

    fn completed_reminders_between(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<usize, ActivityError> {
        self.ensure_access()?;
        Ok(self
            .file
            .completed_reminders
            .iter()
            .filter(|reminder| reminder.completed_at >= start && reminder.completed_at < end)
            .count())
    }
}
