//! Seeds and the hash commitment over a day's activity summary.

use std::fmt::{Debug, Formatter};

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{ActivitySummary, PlanError};

pub const SEED_LEN: usize = 32;

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Seed([u8; SEED_LEN]);

impl Seed {
    #[must_use]
    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a revealed seed from its lowercase or uppercase hex form.
    ///
    /// # Errors
    /// Returns [`PlanError::InvalidSeed`] unless `value` decodes to exactly 32 bytes.
    pub fn from_hex(value: &str) -> Result<Self, PlanError> {
        let bytes = hex::decode(value.trim())
            .map_err(|err| PlanError::InvalidSeed(format!("seed MUST be hex: {err}")))?;
        let array: [u8; SEED_LEN] = bytes.try_into().map_err(|raw: Vec<u8>| {
            PlanError::InvalidSeed(format!(
                "seed MUST decode to {SEED_LEN} bytes (got {})",
                raw.len()
            ))
        })?;
        Ok(Self(array))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Debug for Seed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Seeds stay secret until revealed alongside the plan.
        f.write_str("Seed(..)")
    }
}

/// Draw a fresh seed from the operating system.
///
/// # Errors
/// Returns [`PlanError::Entropy`] when the OS random source fails. There is no
/// silent fallback to a zeroed seed.
pub fn generate_seed() -> Result<Seed, PlanError> {
    let mut bytes = [0_u8; SEED_LEN];
    OsRng.try_fill_bytes(&mut bytes).map_err(|err| PlanError::Entropy(err.to_string()))?;
    Ok(Seed(bytes))
}

/// Supplies seeds to the orchestration layer; replaceable in tests.
pub trait EntropySource {
    /// # Errors
    /// Returns [`PlanError::Entropy`] when no seed can be produced.
    fn next_seed(&mut self) -> Result<Seed, PlanError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn next_seed(&mut self) -> Result<Seed, PlanError> {
        generate_seed()
    }
}

/// Encode `summary` with `seed_hex` forced absent.
///
/// # Errors
/// Returns [`PlanError::Canonical`] when JSON encoding fails.
pub fn canonical_bytes(summary: &ActivitySummary) -> Result<Vec<u8>, PlanError> {
    let mut core = summary.clone();
    core.seed_hex = None;
    serde_json::to_vec(&core).map_err(|err| PlanError::Canonical(err.to_string()))
}

/// Lowercase hex SHA-256 of `seed || canonical_bytes(summary)`.
///
/// # Errors
/// Returns [`PlanError::Canonical`] when the summary cannot be encoded.
pub fn commit(seed: &Seed, summary: &ActivitySummary) -> Result<String, PlanError> {
    let core = canonical_bytes(summary)?;
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(&core);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Recompute the commitment of a revealed summary and compare it.
///
/// # Errors
/// Returns [`PlanError::Canonical`] when the summary cannot be encoded.
pub fn verify_commitment(seed: &Seed, summary: &ActivitySummary) -> Result<bool, PlanError> {
    let mut core = summary.clone();
    core.commitment_hex = String::new();
    let expected = commit(seed, &core)?;
    Ok(expected == summary.commitment_hex)
}
