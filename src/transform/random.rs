//! Injectable randomness.
//!
//! Selection and randomized operations draw from a [`RandomSource`] handed in
//! by the caller, so tests can replay an exact sequence of choices.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniformly distributed indices.
pub trait RandomSource: Send {
    /// Return an index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// Production source backed by a seeded [`StdRng`].
#[derive(Debug)]
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    /// Seed from operating system entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible stream for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for StdRandom {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

/// Replays a fixed list of indices, wrapping each into range.
///
/// Once the list is exhausted it keeps returning 0.
#[derive(Debug, Clone, Default)]
pub struct SequenceRandom {
    values: Vec<usize>,
    cursor: usize,
}

impl SequenceRandom {
    pub fn new(values: Vec<usize>) -> Self {
        Self { values, cursor: 0 }
    }

    /// Number of values not yet consumed.
    pub fn remaining(&self) -> usize {
        self.values.len().saturating_sub(self.cursor)
    }
}

impl RandomSource for SequenceRandom {
    fn pick(&mut self, len: usize) -> usize {
        let value = self.values.get(self.cursor).copied().unwrap_or(0);
        self.cursor += 1;
        value % len
    }
}
