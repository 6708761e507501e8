//! Deterministic ranking of catalog entries into today's action steps.

use std::cmp::Ordering;

use crate::catalog::{library, CatalogEntry};
use crate::{ActionStep, PlanError, PlanMode};

pub const DEFAULT_STEP_COUNT: usize = 6;

const KEYWORD_MODULUS: usize = 37;

/// Circular reader over the bytes that drive ranking.
#[derive(Debug, Clone)]
pub struct BytePool {
    bytes: Vec<u8>,
    cursor: usize,
}

impl BytePool {
    /// # Errors
    /// Returns [`PlanError::EmptyPool`] when `bytes` is empty.
    pub fn new(bytes: Vec<u8>) -> Result<Self, PlanError> {
        if bytes.is_empty() {
            return Err(PlanError::EmptyPool);
        }
        Ok(Self { bytes, cursor: 0 })
    }

    /// Pool of `events ++ utf8(mode name) ++ utf8(lowercased intent)`.
    ///
    /// # Errors
    /// Returns [`PlanError::EmptyPool`] when every component is empty.
    pub fn for_plan(events: &[u8], mode: PlanMode, intent: &str) -> Result<Self, PlanError> {
        let lowered = intent.to_lowercase();
        let mut bytes = Vec::with_capacity(events.len() + mode.as_str().len() + lowered.len());
        bytes.extend_from_slice(events);
        bytes.extend_from_slice(mode.as_str().as_bytes());
        bytes.extend_from_slice(lowered.as_bytes());
        Self::new(bytes)
    }

    pub fn next_byte(&mut self) -> u8 {
        let byte = self.bytes[self.cursor];
        self.cursor = (self.cursor + 1) % self.bytes.len();
        byte
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Number of alphabetic runs in the lowercased intent.
#[must_use]
pub fn keyword_count(intent: &str) -> usize {
    intent
        .to_lowercase()
        .split(|ch: char| !ch.is_alphabetic())
        .filter(|token| !token.is_empty())
        .count()
}

/// Intent bonus for the catalog entry at `index`; zero without keywords.
#[must_use]
pub fn keyword_bonus(keyword_count: usize, index: usize) -> u32 {
    if keyword_count == 0 {
        return 0;
    }
    let bonus = keyword_count.wrapping_mul(index + 1) % KEYWORD_MODULUS;
    u32::try_from(bonus).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RankedEntry<'a> {
    pub index: usize,
    pub entry: &'a CatalogEntry,
    pub score: u32,
}

impl RankedEntry<'_> {
    fn cmp(lhs: &Self, rhs: &Self) -> Ordering {
        rhs.score.cmp(&lhs.score).then_with(|| lhs.index.cmp(&rhs.index))
    }
}

/// Score every entry with one pool byte each, in declaration order, then sort
/// by score descending and original index ascending.
pub fn rank_entries<'a>(
    pool: &mut BytePool,
    entries: &'a [CatalogEntry],
    keyword_count: usize,
) -> Vec<RankedEntry<'a>> {
    let mut ranked = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| RankedEntry {
            index,
            entry,
            score: u32::from(pool.next_byte()) + keyword_bonus(keyword_count, index),
        })
        .collect::<Vec<_>>();
    ranked.sort_by(RankedEntry::cmp);
    ranked
}

/// Select and order up to `count` steps from the catalog for `mode`.
///
/// # Errors
/// Returns [`PlanError::EmptyPool`] when the byte pool would be empty.
pub fn build_plan(
    events: &[u8],
    intent: &str,
    mode: PlanMode,
    count: usize,
) -> Result<Vec<ActionStep>, PlanError> {
    let mut pool = BytePool::for_plan(events, mode, intent)?;
    let ranked = rank_entries(&mut pool, library(mode), keyword_count(intent));
    Ok(ranked.iter().take(count).map(|ranked| ActionStep::from_entry(ranked.entry)).collect())
}
