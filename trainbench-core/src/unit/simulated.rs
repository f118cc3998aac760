//! Simulated trainable units for dry runs and demos.
//!
//! Each kind gets a nominal relative step cost; warm-up steps are slower and
//! every step carries a little jitter. Kinds listed as unavailable fail at
//! construction, the same way a missing hardware capability would.

use super::{Configuration, OptimizationKind, TrainableUnit, UnitError, UnitFactory};
use crate::config::SimulatedConfig;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Reference batch size the nominal costs are quoted for.
const REFERENCE_BATCH: f64 = 256.0;

/// Step cost of a kind relative to plain FP32.
pub fn relative_cost(kind: OptimizationKind) -> f64 {
    match kind {
        OptimizationKind::None => 1.0,
        OptimizationKind::ReducedPrecisionA => 0.72,
        OptimizationKind::ReducedPrecisionB => 0.55,
        OptimizationKind::CompiledKernel => 0.44,
        OptimizationKind::FusedAttention => 0.37,
        OptimizationKind::FusedOptimizer => 0.34,
    }
}

pub struct SimulatedFactory {
    config: SimulatedConfig,
    batch_size: usize,
}

impl SimulatedFactory {
    pub fn new(config: SimulatedConfig, batch_size: usize) -> Self {
        Self { config, batch_size }
    }
}

#[async_trait]
impl UnitFactory for SimulatedFactory {
    async fn construct(
        &self,
        configuration: &Configuration,
    ) -> Result<Box<dyn TrainableUnit>, UnitError> {
        if self.config.unavailable.contains(&configuration.kind) {
            return Err(UnitError::Unsupported(format!(
                "{} is not available on the simulated device",
                configuration.kind
            )));
        }

        let scale = self.batch_size as f64 / REFERENCE_BATCH;
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Box::new(SimulatedUnit {
            step_ms: self.config.base_step_ms * relative_cost(configuration.kind) * scale,
            warmup_left: configuration.kind.warmup_steps(),
            warmup_factor: self.config.warmup_factor.max(1.0),
            jitter: self.config.jitter.clamp(0.0, 0.9),
            fault_at_step: self.config.fault_at_step,
            steps_taken: 0,
            rng,
        }))
    }
}

pub struct SimulatedUnit {
    step_ms: f64,
    warmup_left: usize,
    warmup_factor: f64,
    jitter: f64,
    fault_at_step: Option<usize>,
    steps_taken: usize,
    rng: StdRng,
}

impl SimulatedUnit {
    fn next_duration(&mut self) -> Result<Duration, UnitError> {
        let mut ms = self.step_ms * (1.0 + self.rng.gen_range(-self.jitter..=self.jitter));
        if self.warmup_left > 0 {
            self.warmup_left -= 1;
            ms *= self.warmup_factor;
        }
        Duration::try_from_secs_f64(ms.max(0.0) / 1000.0)
            .map_err(|e| UnitError::Failed(format!("step time of {ms} ms: {e}")))
    }
}

#[async_trait]
impl TrainableUnit for SimulatedUnit {
    async fn step(&mut self) -> Result<(), UnitError> {
        let step = self.steps_taken;
        self.steps_taken += 1;
        if self.fault_at_step == Some(step) {
            return Err(UnitError::Failed(format!(
                "simulated device fault at step {step}"
            )));
        }
        let duration = self.next_duration()?;
        tokio::time::sleep(duration).await;
        Ok(())
    }
}
