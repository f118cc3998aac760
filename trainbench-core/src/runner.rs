//! Experiment runner: drives one configuration through a fixed number of steps.

use crate::compare::mean;
use crate::error::BenchError;
use crate::recorder::{Recorder, round_ms};
use crate::unit::{Configuration, UnitFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span};

/// What a successful configuration run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub configuration: String,
    pub steps_recorded: usize,
    pub mean_ms: Option<f64>,
    /// Mean over the steps after the kind's warm-up steps.
    pub steady_state_mean_ms: Option<f64>,
}

/// Runs configurations against units built by a [`UnitFactory`].
///
/// No retries: a training step mutates shared device state and is not safe
/// to repeat.
pub struct ExperimentRunner {
    factory: Arc<dyn UnitFactory>,
}

impl ExperimentRunner {
    pub fn new(factory: Arc<dyn UnitFactory>) -> Self {
        Self { factory }
    }

    /// Run `configuration` for `step_count` steps, recording every step.
    ///
    /// Fails with [`BenchError::ExternalUnit`] if the unit cannot be built
    /// (nothing is recorded) and with [`BenchError::StepExecution`] on the
    /// first failing step (the steps before it stay recorded). A re-run
    /// overwrites earlier timings step by step and only drops a longer
    /// previous tail once every step has succeeded.
    pub async fn run(
        &self,
        configuration: &Configuration,
        step_count: usize,
        recorder: &mut Recorder,
    ) -> Result<RunOutcome, BenchError> {
        let span = info_span!(
            "configuration",
            name = %configuration.name,
            kind = %configuration.kind
        );
        self.run_inner(configuration, step_count, recorder)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        configuration: &Configuration,
        step_count: usize,
        recorder: &mut Recorder,
    ) -> Result<RunOutcome, BenchError> {
        info!(steps = step_count, "Running configuration");

        let mut unit = self
            .factory
            .construct(configuration)
            .await
            .map_err(|e| BenchError::external_unit(&configuration.name, e.to_string()))?;

        let mut elapsed = Vec::with_capacity(step_count);
        for step in 0..step_count {
            let timing = recorder
                .time_step(&configuration.name, step, unit.step())
                .await?;
            debug!(step, elapsed_ms = timing.elapsed_ms, "step done");
            elapsed.push(timing.elapsed_ms);
        }

        // Tear the unit down before the next configuration builds its own.
        drop(unit);
        recorder.finish_configuration(&configuration.name, step_count)?;

        let warmup = configuration.kind.warmup_steps();
        let outcome = RunOutcome {
            configuration: configuration.name.clone(),
            steps_recorded: elapsed.len(),
            mean_ms: mean(&elapsed).map(round_ms),
            steady_state_mean_ms: elapsed.get(warmup..).and_then(mean).map(round_ms),
        };
        info!(
            mean_ms = ?outcome.mean_ms,
            steady_state_mean_ms = ?outcome.steady_state_mean_ms,
            warmup_steps = warmup,
            "Average step time (excluding warm-up steps)"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ResultsStore;
    use crate::table::ResultsTable;
    use crate::unit::{OptimizationKind, TrainableUnit, UnitError};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Fails construction for `unsupported`, fails the step at `fail_at`.
    struct ScriptedFactory {
        unsupported: Option<OptimizationKind>,
        fail_at: Option<usize>,
    }

    struct ScriptedUnit {
        step: usize,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl TrainableUnit for ScriptedUnit {
        async fn step(&mut self) -> Result<(), UnitError> {
            let step = self.step;
            self.step += 1;
            if self.fail_at == Some(step) {
                return Err(UnitError::Failed("device fault".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl UnitFactory for ScriptedFactory {
        async fn construct(
            &self,
            configuration: &Configuration,
        ) -> Result<Box<dyn TrainableUnit>, UnitError> {
            if self.unsupported == Some(configuration.kind) {
                return Err(UnitError::Unsupported("bf16 needs sm_80".into()));
            }
            Ok(Box::new(ScriptedUnit {
                step: 0,
                fail_at: self.fail_at,
            }))
        }
    }

    fn setup(dir: &TempDir) -> (ResultsStore, Recorder) {
        let store = ResultsStore::new(dir.path().join("results.csv"), dir.path().join("plots"), 8);
        let recorder = Recorder::new(store.clone(), ResultsTable::new());
        (store, recorder)
    }

    #[tokio::test]
    async fn test_run_records_every_step() {
        let dir = TempDir::new().unwrap();
        let (store, mut recorder) = setup(&dir);
        let runner = ExperimentRunner::new(Arc::new(ScriptedFactory {
            unsupported: None,
            fail_at: None,
        }));

        let config = Configuration::new("BF16+TC", OptimizationKind::CompiledKernel);
        let outcome = runner.run(&config, 5, &mut recorder).await.unwrap();
        assert_eq!(outcome.steps_recorded, 5);
        assert!(outcome.mean_ms.is_some());
        assert!(outcome.steady_state_mean_ms.is_some());
        assert_eq!(store.load().unwrap().column("BF16+TC").unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_construction_failure_records_nothing() {
        let dir = TempDir::new().unwrap();
        let (_store, mut recorder) = setup(&dir);
        let runner = ExperimentRunner::new(Arc::new(ScriptedFactory {
            unsupported: Some(OptimizationKind::ReducedPrecisionB),
            fail_at: None,
        }));

        let config = Configuration::new("BF16", OptimizationKind::ReducedPrecisionB);
        let err = runner.run(&config, 5, &mut recorder).await.unwrap_err();
        assert!(matches!(err, BenchError::ExternalUnit { .. }));
        assert!(recorder.table().column("BF16").is_none());
    }

    #[tokio::test]
    async fn test_step_failure_keeps_prefix() {
        let dir = TempDir::new().unwrap();
        let (store, mut recorder) = setup(&dir);
        let runner = ExperimentRunner::new(Arc::new(ScriptedFactory {
            unsupported: None,
            fail_at: Some(3),
        }));

        let config = Configuration::new("TF32", OptimizationKind::ReducedPrecisionA);
        let err = runner.run(&config, 10, &mut recorder).await.unwrap_err();
        assert!(matches!(err, BenchError::StepExecution { step: 3, .. }));
        assert_eq!(store.load().unwrap().column("TF32").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rerun_replaces_column() {
        let dir = TempDir::new().unwrap();
        let (_store, mut recorder) = setup(&dir);
        let runner = ExperimentRunner::new(Arc::new(ScriptedFactory {
            unsupported: None,
            fail_at: None,
        }));
        let config = Configuration::new("Baseline", OptimizationKind::None);

        runner.run(&config, 6, &mut recorder).await.unwrap();
        runner.run(&config, 2, &mut recorder).await.unwrap();
        assert_eq!(recorder.table().column("Baseline").unwrap().len(), 2);
        assert_eq!(recorder.table().row_count(), 6);
    }

    #[tokio::test]
    async fn test_failed_rerun_keeps_earlier_results() {
        let dir = TempDir::new().unwrap();
        let (store, mut recorder) = setup(&dir);
        let config = Configuration::new("Baseline", OptimizationKind::None);

        let healthy = ExperimentRunner::new(Arc::new(ScriptedFactory {
            unsupported: None,
            fail_at: None,
        }));
        healthy.run(&config, 5, &mut recorder).await.unwrap();
        let before = store.load().unwrap();

        let faulty = ExperimentRunner::new(Arc::new(ScriptedFactory {
            unsupported: None,
            fail_at: Some(0),
        }));
        let err = faulty.run(&config, 5, &mut recorder).await.unwrap_err();
        assert!(matches!(err, BenchError::StepExecution { step: 0, .. }));

        let after = store.load().unwrap();
        assert_eq!(after.column("Baseline").unwrap().len(), 5);
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_partial_rerun_overwrites_prefix_only() {
        let dir = TempDir::new().unwrap();
        let (store, mut recorder) = setup(&dir);
        let config = Configuration::new("TF32", OptimizationKind::ReducedPrecisionA);

        let healthy = ExperimentRunner::new(Arc::new(ScriptedFactory {
            unsupported: None,
            fail_at: None,
        }));
        healthy.run(&config, 6, &mut recorder).await.unwrap();

        let faulty = ExperimentRunner::new(Arc::new(ScriptedFactory {
            unsupported: None,
            fail_at: Some(2),
        }));
        faulty.run(&config, 3, &mut recorder).await.unwrap_err();
        assert_eq!(store.load().unwrap().column("TF32").unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_short_run_has_no_steady_state_mean() {
        let dir = TempDir::new().unwrap();
        let (_store, mut recorder) = setup(&dir);
        let runner = ExperimentRunner::new(Arc::new(ScriptedFactory {
            unsupported: None,
            fail_at: None,
        }));
        let config = Configuration::new("BF16+TC+FA", OptimizationKind::FusedAttention);

        let outcome = runner.run(&config, 3, &mut recorder).await.unwrap();
        assert_eq!(outcome.steps_recorded, 3);
        assert_eq!(outcome.steady_state_mean_ms, None);
    }
}
