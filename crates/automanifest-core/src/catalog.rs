use crate::PlanMode;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CatalogEntry {
    pub title: &'static str,
    pub detail: &'static str,
}

const fn entry(title: &'static str, detail: &'static str) -> CatalogEntry {
    CatalogEntry { title, detail }
}

pub const WAVE_LIBRARY: [CatalogEntry; 6] = [
    entry(
        "Journal: rewrite the story",
        "Describe a past event as a setup for your success. Extract 3 strengths.",
    ),
    entry(
        "Visualization sprint (5 min)",
        "Close eyes; visualize the goal completed. Note one surprising aid.",
    ),
    entry(
        "Skill micro-rep (10 min)",
        "Do a focused micro-practice related to your goal. Log the change.",
    ),
    entry("Idea remix (x10)", "Generate 10 variants of your solution; keep the weirdest 2."),
    entry("Frictions \u{2192} fuel", "List 3 blockers from the past; write 1 advantage from each."),
    entry("Signal to self", "Place a visible token/note that encodes your goal in one word."),
];

pub const PARTICLE_LIBRARY: [CatalogEntry; 6] = [
    entry(
        "Outreach x1",
        "Message one person who can move this forward. Ask a small, specific thing.",
    ),
    entry("Commitment token", "Schedule or pay a small non-refundable item to act this week."),
    entry("Evidence binder", "Collect 3 datapoints that you\u{2019}re closer than last week."),
    entry(
        "Environment tweak",
        "Change one default (home screen, desk, route) to reduce friction.",
    ),
    entry("Ship a slice (45m)", "Publish a thin vertical slice today, however rough."),
    entry("Follow-up now", "Send a 3-line follow-up from a prior thread. Be clear."),
];

#[must_use]
pub fn library(mode: PlanMode) -> &'static [CatalogEntry] {
    match mode {
        PlanMode::WaveAligned => &WAVE_LIBRARY,
        PlanMode::ParticleAligned => &PARTICLE_LIBRARY,
    }
}
