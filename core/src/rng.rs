//! Deterministic random number generation for simulated nodes.
//!
//! RULE: Simulation code never calls a platform RNG. All randomness comes
//! from `StreamRng` instances derived from one master seed, so a demo run
//! with a given `--seed` replays the same latencies and failures.
//!
//! Each stream is seeded from (master_seed XOR stream_index * golden),
//! so adding a stream never changes the others.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

pub struct StreamRng {
    inner: Pcg64Mcg,
}

impl StreamRng {
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ stream_index.wrapping_mul(GOLDEN_GAMMA);
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a float in [lo, hi). Returns `lo` when the range is empty.
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        lo + self.next_f64() * (hi - lo)
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}
