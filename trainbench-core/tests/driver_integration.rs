//! Integration tests for the command driver.
//!
//! Drives full commands through the public API with scripted trainable units:
//! batch failure handling, reset/plot, re-runs and benchmark artifact layout.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use trainbench_core::driver::FailureStage;
use trainbench_core::store::decode;
use trainbench_core::{
    BenchConfig, BenchError, Command, CommandOutcome, Configuration, Driver, DriverState,
    OptimizationKind, TrainableUnit, UnitError, UnitFactory,
};

// ── Scripted units ───────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedFactory {
    /// Configurations whose construction fails.
    unsupported: Vec<&'static str>,
    /// Configuration -> step index that fails.
    faults: HashMap<&'static str, usize>,
}

struct ScriptedUnit {
    step: usize,
    fail_at: Option<usize>,
}

#[async_trait]
impl UnitFactory for ScriptedFactory {
    async fn construct(
        &self,
        configuration: &Configuration,
    ) -> Result<Box<dyn TrainableUnit>, UnitError> {
        if self.unsupported.contains(&configuration.name.as_str()) {
            return Err(UnitError::Unsupported("capability missing".into()));
        }
        Ok(Box::new(ScriptedUnit {
            step: 0,
            fail_at: self.faults.get(configuration.name.as_str()).copied(),
        }))
    }
}

#[async_trait]
impl TrainableUnit for ScriptedUnit {
    async fn step(&mut self) -> Result<(), UnitError> {
        let step = self.step;
        self.step += 1;
        if self.fail_at == Some(step) {
            return Err(UnitError::Failed("device fault".into()));
        }
        tokio::task::yield_now().await;
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn config_in(dir: &TempDir, default_steps: usize) -> BenchConfig {
    let mut config = BenchConfig::default();
    config.store.default_steps = default_steps;
    config.configurations = vec![
        Configuration::new("Baseline", OptimizationKind::None),
        Configuration::new("TF32", OptimizationKind::ReducedPrecisionA),
        Configuration::new("BF16", OptimizationKind::ReducedPrecisionB),
    ];
    config.resolve_paths(dir.path());
    config
}

fn driver_with(dir: &TempDir, factory: ScriptedFactory) -> Driver {
    Driver::new(config_in(dir, 4), Arc::new(factory)).unwrap()
}

// ── Batch failure handling ───────────────────────────────────────────────

#[tokio::test]
async fn test_run_all_skips_configuration_that_cannot_construct() {
    let dir = TempDir::new().unwrap();
    let mut driver = driver_with(
        &dir,
        ScriptedFactory {
            unsupported: vec!["TF32"],
            ..Default::default()
        },
    );

    let CommandOutcome::RunAll(report) = driver
        .execute(Command::RunAll { steps: Some(3) })
        .await
        .unwrap()
    else {
        panic!("expected run-all outcome");
    };

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].configuration, "TF32");
    assert_eq!(report.failures[0].stage, FailureStage::Construction);

    let table = driver.store().load().unwrap();
    assert!(table.column("TF32").is_none());
    assert_eq!(table.column("Baseline").unwrap().len(), 3);
    assert_eq!(table.column("BF16").unwrap().len(), 3);
    assert_eq!(driver.state(), DriverState::Idle);
}

#[tokio::test]
async fn test_step_failure_keeps_recorded_prefix() {
    let dir = TempDir::new().unwrap();
    let mut driver = driver_with(
        &dir,
        ScriptedFactory {
            faults: HashMap::from([("TF32", 2)]),
            ..Default::default()
        },
    );

    let CommandOutcome::RunAll(report) = driver
        .execute(Command::RunAll { steps: Some(5) })
        .await
        .unwrap()
    else {
        panic!("expected run-all outcome");
    };

    assert_eq!(report.failures[0].stage, FailureStage::Step { step: 2 });
    let table = driver.store().load().unwrap();
    assert_eq!(table.column("TF32").unwrap().len(), 2);
    assert_eq!(table.column("BF16").unwrap().len(), 5);
}

#[tokio::test]
async fn test_single_run_reports_failure() {
    let dir = TempDir::new().unwrap();
    let mut driver = driver_with(
        &dir,
        ScriptedFactory {
            unsupported: vec!["BF16"],
            ..Default::default()
        },
    );

    let CommandOutcome::Run(report) = driver
        .execute(Command::Run {
            kind: OptimizationKind::ReducedPrecisionB,
            steps: None,
        })
        .await
        .unwrap()
    else {
        panic!("expected run outcome");
    };
    assert!(!report.is_success());
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn test_rerun_replaces_column() {
    let dir = TempDir::new().unwrap();
    let mut driver = driver_with(&dir, ScriptedFactory::default());

    for steps in [4, 2] {
        driver
            .execute(Command::Run {
                kind: OptimizationKind::None,
                steps: Some(steps),
            })
            .await
            .unwrap();
    }
    let table = driver.store().load().unwrap();
    assert_eq!(table.column("Baseline").unwrap().len(), 2);
    assert_eq!(table.row_count(), 4);
}

// ── Reset / plot ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reset_then_plot_fails_with_empty_table() {
    let dir = TempDir::new().unwrap();
    let mut driver = driver_with(&dir, ScriptedFactory::default());

    driver.execute(Command::Compare { steps: Some(2) }).await.unwrap();
    let plots_dir = driver.config().store.plots_dir.clone();
    assert!(plots_dir.join("step_times.svg").exists());

    driver.execute(Command::Reset).await.unwrap();
    assert!(!plots_dir.exists());

    let err = driver
        .execute(Command::Plot { prefix: None })
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::EmptyTable));
    assert_eq!(driver.state(), DriverState::Idle);
}

#[tokio::test]
async fn test_plot_without_baseline_data() {
    let dir = TempDir::new().unwrap();
    let mut driver = driver_with(&dir, ScriptedFactory::default());
    driver
        .execute(Command::Run {
            kind: OptimizationKind::ReducedPrecisionA,
            steps: Some(2),
        })
        .await
        .unwrap();

    let err = driver
        .execute(Command::Plot { prefix: None })
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::MissingBaseline(name) if name == "Baseline"));
}

#[tokio::test]
async fn test_plot_prefix_only_changes_file_names() {
    let dir = TempDir::new().unwrap();
    let mut driver = driver_with(&dir, ScriptedFactory::default());
    driver.execute(Command::RunAll { steps: Some(2) }).await.unwrap();

    let CommandOutcome::Plotted(plain) = driver
        .execute(Command::Plot { prefix: None })
        .await
        .unwrap()
    else {
        panic!("expected plot outcome");
    };
    let CommandOutcome::Plotted(tagged) = driver
        .execute(Command::Plot {
            prefix: Some("nightly_".into()),
        })
        .await
        .unwrap()
    else {
        panic!("expected plot outcome");
    };

    assert_eq!(plain.summary, tagged.summary);
    for (a, b) in plain.paths.iter().zip(&tagged.paths) {
        let a_name = a.file_name().unwrap().to_string_lossy().into_owned();
        let b_name = b.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(format!("nightly_{a_name}"), b_name);
        assert_eq!(
            std::fs::read_to_string(a).unwrap(),
            std::fs::read_to_string(b).unwrap()
        );
    }
}

// ── Benchmark ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_benchmark_writes_two_artifact_sets() {
    let dir = TempDir::new().unwrap();
    let mut driver = Driver::new(config_in(&dir, 2), Arc::new(ScriptedFactory::default())).unwrap();

    let CommandOutcome::Benchmarked { rounds } = driver
        .execute(Command::Benchmark { steps: None })
        .await
        .unwrap()
    else {
        panic!("expected benchmark outcome");
    };
    assert_eq!(rounds.len(), 2);
    assert_eq!(rounds[0].prefix, "steps_2_");
    assert_eq!(rounds[1].prefix, "steps_4_");

    let plots_dir = driver.config().store.plots_dir.clone();
    for prefix in ["steps_2_", "steps_4_"] {
        for stem in ["step_times.svg", "step_heatmap.svg", "speedup.svg", "results.csv", "manifest.json"] {
            let path = plots_dir.join(format!("{prefix}{stem}"));
            assert!(path.exists(), "missing {}", path.display());
        }
    }

    let first = decode(&std::fs::read(&rounds[0].archive).unwrap()).unwrap();
    let second = decode(&std::fs::read(&rounds[1].archive).unwrap()).unwrap();
    assert_eq!(first.max_steps(), 2);
    assert_eq!(second.max_steps(), 4);
    assert_eq!(second.column("Baseline").unwrap().len(), 4);

    let manifest: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(plots_dir.join("steps_4_manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["step_count"], 4);
    assert_eq!(manifest["run_id"], rounds[1].report.run_id.to_string());
}
