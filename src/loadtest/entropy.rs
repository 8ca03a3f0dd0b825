//! Per-virtual-user pseudo-random source for keys, values, and shard picks.
//!
//! Every virtual user owns its own [`EntropySource`]; nothing here is shared
//! between tasks, so no locking is involved. Each call fills every byte
//! position independently, so a key of length `L` can take any of `2^(8L)`
//! values and two consecutive values are independent draws.

use rand::prelude::*;
use rand::rngs::StdRng;

use crate::loadtest::error::LoadTestError;

/// Independent pseudo-random generator owned by a single virtual user.
///
/// Not cryptographically secure, and not meant to be.
#[derive(Debug, Clone)]
pub struct EntropySource {
    rng: StdRng,
}

impl EntropySource {
    /// Seed a new source from the operating system.
    ///
    /// Fails at construction time if the OS entropy source is unavailable;
    /// individual draws never fail.
    pub fn from_os() -> Result<Self, LoadTestError> {
        let rng = StdRng::try_from_os_rng().map_err(|e| LoadTestError::Entropy {
            message: e.to_string(),
        })?;
        Ok(Self { rng })
    }

    /// Deterministic source for reproducible runs and tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded source when `seed` is set, OS-seeded otherwise.
    ///
    /// Virtual user `vu_id` gets `seed + vu_id` so streams stay distinct.
    pub fn for_virtual_user(seed: Option<u64>, vu_id: u32) -> Result<Self, LoadTestError> {
        match seed {
            Some(seed) => Ok(Self::seeded(seed.wrapping_add(u64::from(vu_id)))),
            None => Self::from_os(),
        }
    }

    /// Returns `n` freshly drawn bytes.
    pub fn random_bytes(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.rng.fill_bytes(&mut buf);
        buf
    }

    /// Returns an integer uniformly distributed in `[0, bound)`.
    ///
    /// A `bound` of zero yields zero rather than panicking; callers that
    /// index into a collection guarantee it is non-empty.
    pub fn random_bounded(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.rng.random_range(0..bound)
    }

    /// Mutable access to the underlying generator, for distribution sampling.
    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
