use crate::{ActivitySummary, PlanMode};

/// Classify yesterday's activity into today's planning mode.
///
/// The idle check runs first; a heavy schedule without momentum is checked
/// before momentum alone; anything else falls back to wave-aligned.
#[must_use]
pub fn select_mode(summary: &ActivitySummary) -> PlanMode {
    let heavy_schedule = summary.calendar_event_count >= 6 || summary.focus_block_count >= 3;
    let good_momentum = summary.completed_reminder_count >= 3 || summary.streak_days >= 3;
    let idle = summary.calendar_event_count <= 2
        && summary.completed_reminder_count == 0
        && summary.focus_block_count == 0;

    if idle {
        return PlanMode::WaveAligned;
    }
    if heavy_schedule && !good_momentum {
        return PlanMode::ParticleAligned;
    }
    if good_momentum {
        return PlanMode::ParticleAligned;
    }
    PlanMode::WaveAligned
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn mode_for(events: u32, focus: u32, reminders: u32, streak: u32) -> PlanMode {
        select_mode(&ActivitySummary::new(
            datetime!(2026-10-17 00:00 UTC),
            events,
            focus,
            reminders,
            streak,
        ))
    }

    #[test]
    fn idle_days_are_wave_aligned() {
        assert_eq!(mode_for(0, 0, 0, 0), PlanMode::WaveAligned);
        assert_eq!(mode_for(2, 0, 0, 0), PlanMode::WaveAligned);
    }

    #[test]
    fn idle_short_circuits_streak_momentum() {
        assert_eq!(mode_for(1, 0, 0, 10), PlanMode::WaveAligned);
    }

    #[test]
    fn heavy_schedule_without_momentum_is_particle_aligned() {
        assert_eq!(mode_for(6, 0, 0, 0), PlanMode::ParticleAligned);
        assert_eq!(mode_for(3, 3, 0, 0), PlanMode::ParticleAligned);
    }

    #[test]
    fn momentum_is_particle_aligned() {
        assert_eq!(mode_for(0, 0, 3, 0), PlanMode::ParticleAligned);
        assert_eq!(mode_for(3, 0, 1, 3), PlanMode::ParticleAligned);
        assert_eq!(mode_for(8, 4, 5, 0), PlanMode::ParticleAligned);
    }

    #[test]
    fn moderate_days_without_momentum_fall_back_to_wave() {
        assert_eq!(mode_for(3, 0, 0, 0), PlanMode::WaveAligned);
        assert_eq!(mode_for(5, 2, 2, 2), PlanMode::WaveAligned);
        assert_eq!(mode_for(0, 1, 0, 0), PlanMode::WaveAligned);
    }
}
