use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::classifier::{cascade_accepts, CascadeEntry};
use crate::error::{Error, Result};
use crate::param::ParameterSpace;
use crate::pool::{CancellationToken, WorkerPool};
use crate::value::Sample;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Deterministic per-task seed: folds `(engine_seed, epoch, worker_id,
/// slot_index)` through splitmix64 so the same tuple always yields the same
/// stream regardless of how the pool happens to schedule work.
pub fn derive_seed(engine_seed: u64, epoch: usize, worker_id: usize, slot_index: usize) -> u64 {
    let mut x = splitmix64(engine_seed ^ (epoch as u64));
    x = splitmix64(x ^ (worker_id as u64));
    splitmix64(x ^ (slot_index as u64))
}

/// Parallel rejection sampler: draws raw samples from the parameter space
/// and keeps only those every classifier in the cascade accepts.
pub struct Generator {
    space: Arc<ParameterSpace>,
    attempt_cap: usize,
}

impl Generator {
    pub fn new(space: Arc<ParameterSpace>, attempt_cap: usize) -> Self {
        Self { space, attempt_cap }
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Expected number of raw draws per accepted sample under the halving
    /// invariant, given a cascade of `cascade_len` classifiers.
    pub fn expected_attempts(cascade_len: usize) -> f64 {
        2f64.powi(cascade_len as i32)
    }

    /// Produces `count` accepted samples, ordered deterministically by
    /// `(worker_id, slot_index)` (i.e. by `slot_index`, since worker
    /// assignment is itself a deterministic function of slot index).
    pub fn generate_batch<P: WorkerPool>(
        &self,
        pool: &P,
        cascade: &[CascadeEntry],
        count: usize,
        engine_seed: u64,
        epoch: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Sample>> {
        log::debug!(
            "epoch {epoch}: generating {count} samples, expected attempts/sample = {:.1} ({} classifiers)",
            Self::expected_attempts(cascade.len()),
            cascade.len()
        );
        let worker_count = pool.worker_count().max(1);
        let attempt_cap = self.attempt_cap;
        let space = self.space.as_ref();

        let results: Vec<Result<Sample>> = pool.run_indexed(count, |slot_index| {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled { epoch });
            }
            let worker_id = slot_index % worker_count;
            let seed = derive_seed(engine_seed, epoch, worker_id, slot_index);
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut attempts = 0usize;
            loop {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled { epoch });
                }
                attempts += 1;
                let sample = space.sample(&mut rng);
                let encoded = space.encode(&sample);
                if cascade_accepts(cascade, &encoded) {
                    return Ok(sample);
                }
                if attempts >= attempt_cap {
                    return Err(Error::GeneratorExhausted {
                        attempts,
                        cap: attempt_cap,
                    });
                }
            }
        });

        results.into_iter().collect()
    }
}
