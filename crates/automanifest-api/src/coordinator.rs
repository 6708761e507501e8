//! Daily refresh orchestration around the derivation pipeline.
//!
//! Every failure is handled here: collection, entropy and pipeline errors
//! abandon the cycle, storage and scheduling errors are logged and skipped.

use std::sync::mpsc::{channel, Receiver, Sender};

use anyhow::Result;
use automanifest_core::{
    collect_summary, derive_saved_state, plan_nudges, ActivityError, ActivitySource,
    EntropySource, OsEntropy, SavedState, ScheduledNudge,
};
use automanifest_store_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, Time};

use crate::config::PlannerConfig;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOrigin {
    Restored,
    Derived,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PlanUpdate {
    pub origin: UpdateOrigin,
    pub state: SavedState,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Reused { state: SavedState },
    Derived { state: SavedState, nudges: Vec<ScheduledNudge> },
    AccessDenied,
    Abandoned { reason: String },
}

impl RefreshOutcome {
    #[must_use]
    pub fn state(&self) -> Option<&SavedState> {
        match self {
            Self::Reused { state } | Self::Derived { state, .. } => Some(state),
            Self::AccessDenied | Self::Abandoned { .. } => None,
        }
    }
}

pub struct Coordinator<S, K> {
    config: PlannerConfig,
    source: S,
    scheduler: K,
    entropy: Box<dyn EntropySource>,
    current: Option<SavedState>,
    subscribers: Vec<Sender<PlanUpdate>>,
}

impl<S, K> Coordinator<S, K>
where
    S: ActivitySource,
    K: Scheduler,
{
    #[must_use]
    pub fn new(config: PlannerConfig, source: S, scheduler: K) -> Self {
        Self {
            config,
            source,
            scheduler,
            entropy: Box::new(OsEntropy),
            current: None,
            subscribers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_entropy(mut self, entropy: Box<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// The plan currently shown to the user.
    #[must_use]
    pub fn current(&self) -> Option<&SavedState> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn scheduler(&self) -> &K {
        &self.scheduler
    }

    /// Receive every plan applied from now on.
    pub fn subscribe(&mut self) -> Receiver<PlanUpdate> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    fn open_store(&self) -> Result<SqliteStore> {
        let mut store = SqliteStore::open(&self.config.db_path)?;
        store.migrate()?;
        Ok(store)
    }

    /// Launch sequence: request access, refresh without forcing, then ask
    /// for a forced background refresh at the configured time today.
    pub fn bootstrap(&mut self, now: OffsetDateTime) -> RefreshOutcome {
        if let Err(err) = self.source.request_access() {
            tracing::warn!(error = %err, "activity access request failed");
        }

        let outcome = self.refresh_if_needed(false, now);

        let earliest = now.replace_time(self.config.background_refresh_at.time());
        if let Err(err) = self.scheduler.request_background_refresh(earliest) {
            tracing::warn!(error = %err, %earliest, "background refresh request failed");
        }

        outcome
    }

    /// Reuse yesterday's plan when one is saved, otherwise derive a new one.
    pub fn refresh_if_needed(&mut self, force: bool, now: OffsetDateTime) -> RefreshOutcome {
        let today = now.replace_time(Time::MIDNIGHT);

        if !force {
            if let Some(saved) = self.load_saved() {
                if saved.describes_day_before(today.date()) {
                    tracing::info!(day = %saved.summary.day, "reusing saved plan");
                    self.apply(saved.clone(), UpdateOrigin::Restored);
                    return RefreshOutcome::Reused { state: saved };
                }
            }
        }

        let summary = match collect_summary(&self.source, today) {
            Ok(summary) => summary,
            Err(ActivityError::AccessDenied) => {
                tracing::warn!("activity access denied; keeping the previous plan");
                return RefreshOutcome::AccessDenied;
            }
            Err(err) => return Self::abandon("activity collection failed", &err),
        };

        let seed = match self.entropy.next_seed() {
            Ok(seed) => seed,
            Err(err) => return Self::abandon("seed generation failed", &err),
        };

        let intention = self.intention();
        let state = match derive_saved_state(
            summary,
            &seed,
            &intention,
            self.config.derivation_params(),
        ) {
            Ok(state) => state,
            Err(err) => return Self::abandon("plan derivation failed", &err),
        };

        if let Err(err) = self.open_store().and_then(|store| store.save_state(&state)) {
            tracing::error!(error = %err, "failed to persist derived plan");
        }

        tracing::info!(
            mode = %state.mode,
            commitment = %state.commitment_hex(),
            steps = state.steps.len(),
            "derived new plan"
        );

        self.apply(state.clone(), UpdateOrigin::Derived);
        let nudges = self.reschedule(&state, today);
        RefreshOutcome::Derived { state, nudges }
    }

    /// Stored plan, or `None` when missing or unreadable.
    #[must_use]
    pub fn load_saved(&self) -> Option<SavedState> {
        match self.open_store().and_then(|store| store.load_state()) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "ignoring unreadable saved plan");
                None
            }
        }
    }

    /// Stored intention, falling back to the configured default.
    #[must_use]
    pub fn intention(&self) -> String {
        match self.open_store().and_then(|store| store.intention()) {
            Ok(Some(text)) => text,
            Ok(None) => self.config.default_intention.clone(),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "using default intention");
                self.config.default_intention.clone()
            }
        }
    }

    /// # Errors
    /// Returns an error when the intention cannot be persisted.
    pub fn set_intention(&self, text: &str) -> Result<()> {
        self.open_store()?.set_intention(text)
    }

    fn abandon(stage: &str, err: &dyn std::error::Error) -> RefreshOutcome {
        tracing::error!(error = %err, "{stage}; abandoning refresh");
        RefreshOutcome::Abandoned { reason: format!("{stage}: {err}") }
    }

    fn apply(&mut self, state: SavedState, origin: UpdateOrigin) {
        self.current = Some(state.clone());
        let update = PlanUpdate { origin, state };
        self.subscribers.retain(|subscriber| subscriber.send(update.clone()).is_ok());
    }

    fn reschedule(&mut self, state: &SavedState, today: OffsetDateTime) -> Vec<ScheduledNudge> {
        if let Err(err) = self.scheduler.cancel_all() {
            tracing::warn!(error = %err, "failed to cancel pending nudges");
        }

        let planned = plan_nudges(&state.steps, today, &self.config.nudge_clock_times());
        let mut scheduled = Vec::with_capacity(planned.len());
        for nudge in planned {
            match self.scheduler.schedule_daily(nudge.fire_at, &nudge.payload) {
                Ok(()) => scheduled.push(nudge),
                Err(err) => tracing::warn!(
                    error = %err,
                    identifier = %nudge.payload.identifier,
                    "failed to schedule nudge"
                ),
            }
        }
        scheduled
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use anyhow::{anyhow, Context};
    use automanifest_core::{CalendarEvent, NudgePayload, PlanError, PlanMode, Seed, SEED_LEN};
    use time::macros::datetime;
    use ulid::Ulid;

    use super::*;
    use crate::activity_file::{ActivityFile, CompletedReminder, JsonActivitySource};

    #[derive(Debug, Default)]
    struct RecordingScheduler {
        scheduled: Vec<(OffsetDateTime, NudgePayload)>,
        cancellations: usize,
        refresh_requests: Vec<OffsetDateTime>,
        fail_scheduling: bool,
    }

    impl Scheduler for RecordingScheduler {
        fn schedule_daily(&mut self, fire_at: OffsetDateTime, payload: &NudgePayload) -> Result<()> {
            if self.fail_scheduling {
                return Err(anyhow!("notification permission missing"));
            }
            self.scheduled.push((fire_at, payload.clone()));
            Ok(())
        }

        fn cancel_all(&mut self) -> Result<()> {
            self.cancellations += 1;
            self.scheduled.clear();
            Ok(())
        }

        fn request_background_refresh(&mut self, earliest: OffsetDateTime) -> Result<()> {
            self.refresh_requests.push(earliest);
            Ok(())
        }
    }

    struct FixedEntropy(u8);

    impl EntropySource for FixedEntropy {
        fn next_seed(&mut self) -> Result<Seed, PlanError> {
            Ok(Seed::from_bytes([self.0; SEED_LEN]))
        }
    }

    struct FailingEntropy;

    impl EntropySource for FailingEntropy {
        fn next_seed(&mut self) -> Result<Seed, PlanError> {
            Err(PlanError::Entropy("rng offline".to_string()))
        }
    }

    struct TempDb(PathBuf);

    impl TempDb {
        fn new() -> Self {
            Self(std::env::temp_dir().join(format!("automanifest-coord-{}.sqlite3", Ulid::new())))
        }

        fn path(&self) -> &Path {
            &self.0
        }

        fn cleanup(&self) -> Result<()> {
            for suffix in ["", "-wal", "-shm"] {
                let path = PathBuf::from(format!("{}{}", self.0.display(), suffix));
                if path.exists() {
                    fs::remove_file(&path).with_context(|| {
                        format!("failed to cleanup sqlite file {}", path.display())
                    })?;
                }
            }
            Ok(())
        }
    }

    const NOW: OffsetDateTime = datetime!(2026-10-18 07:45 UTC);

    fn busy_yesterday() -> ActivityFile {
        ActivityFile {
            access_granted: true,
            events: (0..7)
                .map(|hour| CalendarEvent {
                    title: format!("Meeting {hour}"),
                    start: datetime!(2026-10-17 09:00 UTC) + time::Duration::hours(hour),
                })
                .collect(),
            completed_reminders: vec![CompletedReminder {
                completed_at: datetime!(2026-10-17 20:00 UTC),
            }],
        }
    }

    fn mk_coordinator(
        db: &TempDb,
        file: ActivityFile,
    ) -> Coordinator<JsonActivitySource, RecordingScheduler> {
        let config = PlannerConfig { db_path: db.path().to_path_buf(), ..PlannerConfig::default() };
        Coordinator::new(config, JsonActivitySource::new(file), RecordingScheduler::default())
            .with_entropy(Box::new(FixedEntropy(5)))
    }

    #[test]
    fn first_refresh_derives_saves_and_schedules() -> Result<()> {
        let db = TempDb::new();
        let mut coordinator = mk_coordinator(&db, busy_yesterday());
        let updates = coordinator.subscribe();

        let (state, nudges) = match coordinator.refresh_if_needed(false, NOW) {
            RefreshOutcome::Derived { state, nudges } => (state, nudges),
            other => return Err(anyhow!("expected a derived plan, got {other:?}")),
        };

        assert_eq!(state.summary.day, datetime!(2026-10-17 00:00 UTC));
        assert_eq!(state.summary.calendar_event_count, 7);
        assert_eq!(state.summary.streak_days, 1);
        assert_eq!(state.mode, PlanMode::ParticleAligned);
        assert_eq!(state.steps.len(), 6);
        assert_eq!(state.verify(), Ok(true));
        assert_eq!(state.seed_hex, "05".repeat(SEED_LEN));

        assert_eq!(nudges.len(), 2);
        assert_eq!(nudges[0].fire_at, datetime!(2026-10-18 09:00 UTC));
        assert_eq!(nudges[1].fire_at, datetime!(2026-10-18 14:00 UTC));
        assert_eq!(nudges[0].payload.title, state.steps[0].title);
        assert_eq!(coordinator.scheduler().scheduled.len(), 2);
        assert_eq!(coordinator.scheduler().cancellations, 1);

        assert_eq!(coordinator.load_saved().as_ref(), Some(&state));
        assert_eq!(coordinator.current(), Some(&state));

        let update = updates.try_recv().map_err(|err| anyhow!("no update received: {err}"))?;
        assert_eq!(update.origin, UpdateOrigin::Derived);
        assert_eq!(update.state, state);

        db.cleanup()
    }

    #[test]
    fn second_refresh_the_same_day_reuses_the_saved_plan() -> Result<()> {
        let db = TempDb::new();
        let mut coordinator = mk_coordinator(&db, busy_yesterday());

        let first = coordinator.refresh_if_needed(false, NOW);
        let second = coordinator.refresh_if_needed(false, NOW + time::Duration::hours(3));

        let Some(first_state) = first.state() else {
            return Err(anyhow!("first refresh should derive: {first:?}"));
        };
        assert_eq!(second, RefreshOutcome::Reused { state: first_state.clone() });
        assert_eq!(coordinator.scheduler().cancellations, 1);

        db.cleanup()
    }

    #[test]
    fn forced_refresh_derives_again() -> Result<()> {
        let db = TempDb::new();
        let mut coordinator = mk_coordinator(&db, busy_yesterday());

        let _first = coordinator.refresh_if_needed(false, NOW);
        let forced = coordinator.refresh_if_needed(true, NOW);

        assert!(matches!(forced, RefreshOutcome::Derived { .. }));
        assert_eq!(coordinator.scheduler().cancellations, 2);
        assert_eq!(coordinator.scheduler().scheduled.len(), 2);

        db.cleanup()
    }

    #[test]
    fn stale_saved_plan_is_replaced() -> Result<()> {
        let db = TempDb::new();
        let mut coordinator = mk_coordinator(&db, busy_yesterday());

        let _first = coordinator.refresh_if_needed(false, NOW);
        let next_day = coordinator.refresh_if_needed(false, NOW + time::Duration::days(1));

        let Some(state) = next_day.state() else {
            return Err(anyhow!("next day should derive: {next_day:?}"));
        };
        assert!(matches!(next_day, RefreshOutcome::Derived { .. }));
        assert_eq!(state.summary.day, datetime!(2026-10-18 00:00 UTC));
        // Nothing happened on the 18th in the fixture.
        assert_eq!(state.mode, PlanMode::WaveAligned);

        db.cleanup()
    }

    #[test]
    fn access_denied_keeps_the_previous_view() -> Result<()> {
        let db = TempDb::new();
        let denied = ActivityFile { access_granted: false, ..busy_yesterday() };
        let mut coordinator = mk_coordinator(&db, denied);
        let updates = coordinator.subscribe();

        assert_eq!(coordinator.refresh_if_needed(false, NOW), RefreshOutcome::AccessDenied);
        assert_eq!(coordinator.current(), None);
        assert_eq!(coordinator.load_saved(), None);
        assert!(updates.try_recv().is_err());
        assert!(coordinator.scheduler().scheduled.is_empty());

        db.cleanup()
    }

    #[test]
    fn entropy_failure_abandons_the_cycle() -> Result<()> {
        let db = TempDb::new();
        let mut coordinator =
            mk_coordinator(&db, busy_yesterday()).with_entropy(Box::new(FailingEntropy));

        let reason = match coordinator.refresh_if_needed(false, NOW) {
            RefreshOutcome::Abandoned { reason } => reason,
            other => return Err(anyhow!("entropy failure should abandon, got {other:?}")),
        };
        assert!(reason.contains("rng offline"));
        assert_eq!(coordinator.load_saved(), None);
        assert_eq!(coordinator.current(), None);

        db.cleanup()
    }

    #[test]
    fn malformed_saved_state_is_treated_as_absent() -> Result<()> {
        let db = TempDb::new();
        {
            let mut store = SqliteStore::open(db.path())?;
            store.migrate()?;
            store.put_value(
                automanifest_store_sqlite::STATE_KEY,
                &serde_json::json!({"mode": "sideways"}),
            )?;
        }
        let mut coordinator = mk_coordinator(&db, busy_yesterday());

        assert_eq!(coordinator.load_saved(), None);
        assert!(matches!(
            coordinator.refresh_if_needed(false, NOW),
            RefreshOutcome::Derived { .. }
        ));
        assert!(coordinator.load_saved().is_some());

        db.cleanup()
    }

    #[test]
    fn intention_defaults_until_set() -> Result<()> {
        let db = TempDb::new();
        let coordinator = mk_coordinator(&db, busy_yesterday());

        assert_eq!(coordinator.intention(), "Ship iOS app milestone");
        coordinator.set_intention("")?;
        assert_eq!(coordinator.intention(), "");

        db.cleanup()
    }

    #[test]
    fn scheduling_failures_do_not_block_the_plan() -> Result<()> {
        let db = TempDb::new();
        let mut coordinator = mk_coordinator(&db, busy_yesterday());
        coordinator.scheduler.fail_scheduling = true;

        let (state, nudges) = match coordinator.refresh_if_needed(false, NOW) {
            RefreshOutcome::Derived { state, nudges } => (state, nudges),
            other => return Err(anyhow!("expected a derived plan, got {other:?}")),
        };
        assert!(nudges.is_empty());
        assert_eq!(coordinator.load_saved(), Some(state));

        db.cleanup()
    }

    #[test]
    fn bootstrap_requests_a_background_refresh_at_half_past_eight() -> Result<()> {
        let db = TempDb::new();
        let mut coordinator = mk_coordinator(&db, busy_yesterday());

        let outcome = coordinator.bootstrap(NOW);

        assert!(matches!(outcome, RefreshOutcome::Derived { .. }));
        assert_eq!(
            coordinator.scheduler().refresh_requests,
            vec![datetime!(2026-10-18 08:30 UTC)]
        );

        db.cleanup()
    }

    #[test]
    fn restored_plan_notifies_subscribers() -> Result<()> {
        let db = TempDb::new();
        let state = {
            let mut first = mk_coordinator(&db, busy_yesterday());
            match first.refresh_if_needed(false, NOW) {
                RefreshOutcome::Derived { state, .. } => state,
                other => return Err(anyhow!("expected a derived plan, got {other:?}")),
            }
        };

        let mut relaunched = mk_coordinator(&db, busy_yesterday());
        let updates = relaunched.subscribe();
        let outcome = relaunched.bootstrap(NOW + time::Duration::hours(1));

        assert_eq!(outcome, RefreshOutcome::Reused { state: state.clone() });
        let update = updates.try_recv().map_err(|err| anyhow!("no update received: {err}"))?;
        assert_eq!(update, PlanUpdate { origin: UpdateOrigin::Restored, state });

        db.cleanup()
    }

    #[test]
    fn collected_summary_matches_a_direct_collection() -> Result<()> {
        let db = TempDb::new();
        let mut coordinator = mk_coordinator(&db, busy_yesterday());
        let direct = collect_summary(
            &JsonActivitySource::new(busy_yesterday()),
            datetime!(2026-10-18 00:00 UTC),
        )
        .map_err(|err| anyhow!("direct collection failed: {err}"))?;

        let outcome = coordinator.refresh_if_needed(false, NOW);
        let Some(state) = outcome.state() else {
            return Err(anyhow!("expected a plan, got {outcome:?}"));
        };
        assert_eq!(state.summary.calendar_event_count, direct.calendar_event_count);
        assert_eq!(state.summary.completed_reminder_count, direct.completed_reminder_count);
        assert_eq!(state.summary.streak_days, direct.streak_days);

        db.cleanup()
    }
}
