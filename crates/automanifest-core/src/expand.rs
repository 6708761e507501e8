//! Counter-mode byte expansion over SHA-256.
//!
//! Block `n` is `SHA256(seed || canonical(summary) || n as u64 little-endian)`;
//! the stream is the concatenation of blocks `0, 1, 2, ...`. Output is
//! reproducible for a given seed and summary but is not secret against anyone
//! who can guess the (low-entropy) summary and learns the seed.

use sha2::{Digest, Sha256};

use crate::commitment::{canonical_bytes, Seed};
use crate::{ActivitySummary, PlanError};

pub const DIGEST_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct DerivedByteStream {
    prefix: Vec<u8>,
    counter: u64,
    block: [u8; DIGEST_LEN],
    offset: usize,
}

impl DerivedByteStream {
    /// Start the stream at byte 0.
    ///
    /// # Errors
    /// Returns [`PlanError::Canonical`] when the summary cannot be encoded.
    pub fn new(seed: &Seed, summary: &ActivitySummary) -> Result<Self, PlanError> {
        let core = canonical_bytes(summary)?;
        let mut prefix = Vec::with_capacity(seed.as_bytes().len() + core.len());
        prefix.extend_from_slice(seed.as_bytes());
        prefix.extend_from_slice(&core);
        Ok(Self { prefix, counter: 0, block: [0; DIGEST_LEN], offset: DIGEST_LEN })
    }

    fn block_at(&self, counter: u64) -> [u8; DIGEST_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(&self.prefix);
        hasher.update(counter.to_le_bytes());
        hasher.finalize().into()
    }

    /// Byte `index` of the stream, independent of the iterator position.
    #[must_use]
    pub fn byte_at(&self, index: u64) -> u8 {
        let block = self.block_at(index / DIGEST_LEN as u64);
        #[allow(clippy::cast_possible_truncation)]
        let offset = (index % DIGEST_LEN as u64) as usize;
        block[offset]
    }
}

impl Iterator for DerivedByteStream {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.offset == DIGEST_LEN {
            self.block = self.block_at(self.counter);
            self.counter = self.counter.wrapping_add(1);
            self.offset = 0;
        }
        let byte = self.block[self.offset];
        self.offset += 1;
        Some(byte)
    }
}

/// Expand `seed` and `summary` into exactly `count` bytes.
///
/// # Errors
/// Returns [`PlanError::Canonical`] when the summary cannot be encoded.
pub fn expand(seed: &Seed, summary: &ActivitySummary, count: usize) -> Result<Vec<u8>, PlanError> {
    let stream = DerivedByteStream::new(seed, summary)?;
    Ok(stream.take(count).collect())
}
