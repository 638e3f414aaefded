use std::time::{SystemTime, UNIX_EPOCH};

use rand::{SeedableRng, distr::Distribution, rngs::StdRng};
use rand_distr::Poisson;
use tracing::warn;

use crate::error::{ForecastError, Result};

/// Seeded random stream shared by every draw of one reconstruction call.
///
/// The stream only moves forward; reusing it for a later call continues the
/// same sequence instead of restarting it.
#[derive(Debug, Clone)]
pub struct RandomStream {
    seed: u64,
    rng: StdRng,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        RandomStream {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeds from the wall clock in milliseconds. Not reproducible across runs.
    pub fn from_time() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        warn!(seed, "no seed given, using a time-derived seed");
        RandomStream::new(seed)
    }

    /// The seed this stream was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draws a Poisson count with the given mean.
    pub fn poisson(&mut self, mean: f64) -> Result<u64> {
        if mean == 0.0 {
            // Poisson requires a non-zero rate
            return Ok(0);
        }
        let dist = Poisson::new(mean)
            .map_err(|e| ForecastError::Sampling(format!("mean {mean}: {e}")))?;
        Ok(dist.sample(&mut self.rng) as u64)
    }
}
