use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use ulid::Ulid;

pub mod activity;
pub mod catalog;
pub mod commitment;
pub mod expand;
pub mod histogram;
pub mod mode;
pub mod nudge;
pub mod pipeline;
pub mod plan;

pub use activity::{collect_summary, ActivityError, ActivitySource, CalendarEvent};
pub use catalog::{library, CatalogEntry, PARTICLE_LIBRARY, WAVE_LIBRARY};
pub use commitment::{
    canonical_bytes, commit, generate_seed, verify_commitment, EntropySource, OsEntropy, Seed,
    SEED_LEN,
};
pub use expand::{expand, DerivedByteStream, DIGEST_LEN};
pub use histogram::{histogram, Histogram, HistogramShape};
pub use mode::select_mode;
pub use nudge::{default_nudge_times, plan_nudges, NudgePayload, ScheduledNudge, MAX_NUDGES};
pub use pipeline::{derive_saved_state, DerivationParams};
pub use plan::{
    build_plan, keyword_count, keyword_bonus, rank_entries, BytePool, RankedEntry,
    DEFAULT_STEP_COUNT,
};

/// Bytes expanded from the seed for every derivation cycle.
pub const EXPANSION_LEN: usize = 20_000;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum PlanError {
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
    #[error("canonical encoding failed: {0}")]
    Canonical(String),
    #[error("byte pool MUST contain at least one byte")]
    EmptyPool,
    #[error("invalid seed: {0}")]
    InvalidSeed(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StepId(pub Ulid);

impl StepId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for StepId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Summary of one day of calendar and reminder activity.
///
/// Field order is part of the canonical encoding; reordering fields changes
/// every commitment ever produced.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ActivitySummary {
    #[serde(with = "time::serde::rfc3339")]
    pub day: OffsetDateTime,
    pub calendar_event_count: u32,
    pub focus_block_count: u32,
    pub completed_reminder_count: u32,
    pub streak_days: u32,
    #[serde(default)]
    pub seed_hex: Option<String>,
    #[serde(default)]
    pub commitment_hex: String,
}

impl ActivitySummary {
    /// Build an uncommitted summary for the day starting at `day`.
    #[must_use]
    pub fn new(
        day: OffsetDateTime,
        calendar_event_count: u32,
        focus_block_count: u32,
        completed_reminder_count: u32,
        streak_days: u32,
    ) -> Self {
        Self {
            day,
            calendar_event_count,
            focus_block_count,
            completed_reminder_count,
            streak_days,
            seed_hex: None,
            commitment_hex: String::new(),
        }
    }

    /// Bind this summary to `seed`, replacing any previous commitment.
    ///
    /// # Errors
    /// Returns [`PlanError::Canonical`] when the summary cannot be encoded.
    pub fn committed(mut self, seed: &Seed) -> Result<Self, PlanError> {
        self.commitment_hex = String::new();
        self.seed_hex = None;
        self.commitment_hex = commit(seed, &self)?;
        Ok(self)
    }

    /// Attach the revealed seed so readers can verify the commitment.
    #[must_use]
    pub fn revealed(mut self, seed: &Seed) -> Self {
        self.seed_hex = Some(seed.to_hex());
        self
    }

    #[must_use]
    pub fn calendar_day(&self) -> Date {
        self.day.date()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PlanMode {
    WaveAligned,
    ParticleAligned,
}

impl PlanMode {
    /// Stable name, also mixed into the plan byte pool.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaveAligned => "waveAligned",
            Self::ParticleAligned => "particleAligned",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waveAligned" => Some(Self::WaveAligned),
            "particleAligned" => Some(Self::ParticleAligned),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::WaveAligned => "Wave (explore)",
            Self::ParticleAligned => "Particle (execute)",
        }
    }
}

impl Display for PlanMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ActionStep {
    pub id: StepId,
    pub title: String,
    pub detail: String,
    #[serde(default)]
    pub done: bool,
}

impl ActionStep {
    #[must_use]
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        Self {
            id: StepId::new(),
            title: entry.title.to_string(),
            detail: entry.detail.to_string(),
            done: false,
        }
    }
}

/// The persisted outcome of one derivation cycle.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SavedState {
    pub summary: ActivitySummary,
    pub seed_hex: String,
    pub mode: PlanMode,
    #[serde(default)]
    pub steps: Vec<ActionStep>,
}

impl SavedState {
    /// Whether this state was derived from the day before `today`.
    #[must_use]
    pub fn describes_day_before(&self, today: Date) -> bool {
        today.previous_day().is_some_and(|yesterday| self.summary.calendar_day() == yesterday)
    }

    #[must_use]
    pub fn commitment_hex(&self) -> &str {
        &self.summary.commitment_hex
    }

    /// Check the stored commitment against the revealed seed.
    ///
    /// # Errors
    /// Returns [`PlanError::InvalidSeed`] when `seed_hex` is malformed, or
    /// [`PlanError::Canonical`] when the summary cannot be encoded.
    pub fn verify(&self) -> Result<bool, PlanError> {
        let seed = Seed::from_hex(&self.seed_hex)?;
        verify_commitment(&seed, &self.summary)
    }
}
