//! Sources for the demand figure the classifier compares power against.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

#[async_trait]
pub trait DemandSource: Send + Sync {
    /// Demand in watts for a unit (or the fleet) rated at `capacity_w`.
    async fn demand(&self, capacity_w: f64) -> f64;
}

/// Randomised demand around a baseline share of capacity.
///
/// `demand = capacity * baseline + (u - 0.5) * capacity * range`, `u` uniform in `[0, 1)`.
pub struct SimulatedDemand {
    baseline_fraction: f64,
    range_fraction: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedDemand {
    pub fn new(baseline_fraction: f64, range_fraction: f64) -> Self {
        Self {
            baseline_fraction,
            range_fraction,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(baseline_fraction: f64, range_fraction: f64, seed: u64) -> Self {
        Self {
            baseline_fraction,
            range_fraction,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn sample(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen::<f64>(),
            Err(poisoned) => poisoned.into_inner().gen::<f64>(),
        }
    }
}

#[async_trait]
impl DemandSource for SimulatedDemand {
    async fn demand(&self, capacity_w: f64) -> f64 {
        let base = capacity_w * self.baseline_fraction;
        let range = capacity_w * self.range_fraction;
        (base + (self.sample() - 0.5) * range).max(0.0)
    }
}

/// Constant demand, e.g. a contracted load.
pub struct FixedDemand(pub f64);

#[async_trait]
impl DemandSource for FixedDemand {
    async fn demand(&self, _capacity_w: f64) -> f64 {
        self.0.max(0.0)
    }
}
