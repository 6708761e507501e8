//! One full derivation cycle: commit, expand, classify, rank, reveal.

use crate::commitment::Seed;
use crate::expand::expand;
use crate::mode::select_mode;
use crate::plan::{build_plan, DEFAULT_STEP_COUNT};
use crate::{ActivitySummary, PlanError, SavedState, EXPANSION_LEN};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DerivationParams {
    pub expansion_len: usize,
    pub step_count: usize,
}

impl Default for DerivationParams {
    fn default() -> Self {
        Self { expansion_len: EXPANSION_LEN, step_count: DEFAULT_STEP_COUNT }
    }
}

/// Derive today's plan from yesterday's `summary` and a fresh `seed`.
///
/// The returned summary carries the commitment and the revealed seed.
///
/// # Errors
/// Returns [`PlanError::Canonical`] when the summary cannot be encoded, or
/// [`PlanError::EmptyPool`] when the ranking pool would be empty.
pub fn derive_saved_state(
    summary: ActivitySummary,
    seed: &Seed,
    intent: &str,
    params: DerivationParams,
) -> Result<SavedState, PlanError> {
    let committed = summary.committed(seed)?;
    let events = expand(seed, &committed, params.expansion_len)?;
    let mode = select_mode(&committed);
    let steps = build_plan(&events, intent, mode, params.step_count)?;
    let revealed = committed.revealed(seed);

    Ok(SavedState { seed_hex: seed.to_hex(), summary: revealed, mode, steps })
}
