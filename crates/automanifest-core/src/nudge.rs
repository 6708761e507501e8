use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, Time};

use crate::ActionStep;

/// Only the top-ranked steps become same-day reminders.
pub const MAX_NUDGES: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NudgePayload {
    pub identifier: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ScheduledNudge {
    #[serde(with = "time::serde::rfc3339")]
    pub fire_at: OffsetDateTime,
    pub repeats: bool,
    pub payload: NudgePayload,
}

#[must_use]
pub fn default_nudge_times() -> Vec<Time> {
    vec![time::macros::time!(09:00), time::macros::time!(14:00)]
}

/// Pair the leading steps with `times` on the calendar day of `today`.
#[must_use]
pub fn plan_nudges(steps: &[ActionStep], today: OffsetDateTime, times: &[Time]) -> Vec<ScheduledNudge> {
    steps
        .iter()
        .take(MAX_NUDGES)
        .zip(times)
        .enumerate()
        .map(|(index, (step, at))| ScheduledNudge {
            fire_at: today.replace_time(*at),
            repeats: false,
            payload: NudgePayload {
                identifier: format!("nudge_{index}"),
                title: step.title.clone(),
                body: step.detail.clone(),
            },
        })
        .collect()
}
