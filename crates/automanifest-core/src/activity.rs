//! Reduce a day of calendar and reminder data to an [`ActivitySummary`].

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::ActivitySummary;

/// Longest run of reminder days counted into a streak.
pub const MAX_STREAK_DAYS: u32 = 30;

const FOCUS_KEYWORDS: [&str; 3] = ["focus", "work", "deep"];

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ActivityError {
    #[error("access to calendar or reminders was denied")]
    AccessDenied,
    #[error("activity source unavailable: {0}")]
    Unavailable(String),
    #[error("invalid day window: {0}")]
    InvalidWindow(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CalendarEvent {
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
}

impl CalendarEvent {
    #[must_use]
    pub fn is_focus_block(&self) -> bool {
        let title = self.title.to_lowercase();
        FOCUS_KEYWORDS.iter().any(|keyword| title.contains(keyword))
    }
}

/// Read access to calendar events and completed reminders.
///
/// Windows are half-open: `start <= t < end`.
pub trait ActivitySource {
    /// # Errors
    /// Returns [`ActivityError::AccessDenied`] when the user has not granted access.
    fn request_access(&mut self) -> Result<(), ActivityError>;

    /// # Errors
    /// Returns an [`ActivityError`] when events cannot be read.
    fn events_between(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<CalendarEvent>, ActivityError>;

    /// # Errors
    /// Returns an [`ActivityError`] when reminders cannot be read.
    fn completed_reminders_between(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<usize, ActivityError>;
}

fn count_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Summarize the day before `today_start`.
///
/// Windows are 24-hour spans in the fixed offset of `today_start`, so on a
/// daylight-saving change day they drift an hour from local midnight.
///
/// # Errors
/// Returns the first [`ActivityError`] raised by `source`, or
/// [`ActivityError::InvalidWindow`] when the window falls outside the calendar range.
pub fn collect_summary<S>(
    source: &S,
    today_start: OffsetDateTime,
) -> Result<ActivitySummary, ActivityError>
where
    S: ActivitySource + ?Sized,
{
    let day = Duration::days(1);
    let yesterday_start = today_start
        .checked_sub(day)
        .ok_or_else(|| ActivityError::InvalidWindow(format!("no day before {today_start}")))?;

    let events = source.events_between(yesterday_start, today_start)?;
    let focus_blocks = events.iter().filter(|event| event.is_focus_block()).count();
    let completed = source.completed_reminders_between(yesterday_start, today_start)?;

    let mut streak = 0_u32;
    let mut window_start = yesterday_start;
    while streak < MAX_STREAK_DAYS {
        let window_end = window_start + day;
        if source.completed_reminders_between(window_start, window_end)? == 0 {
            break;
        }
        streak += 1;
        match window_start.checked_sub(day) {
            Some(previous) => window_start = previous,
            None => break,
        }
    }

    Ok(ActivitySummary::new(
        yesterday_start,
        count_u32(events.len()),
        count_u32(focus_blocks),
        count_u32(completed),
        streak,
    ))
}
