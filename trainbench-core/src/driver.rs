//! Driver: dispatches typed commands over the runner, store, comparison engine
//! and plot generator.
//!
//! State machine: `Idle -> Running(step_count) -> Aggregating -> Plotting -> Idle`.
//! `plot` and `summary` enter at `Aggregating`; any state may fall back to
//! `Idle`, which is how a failed command (corrupt store included) is surfaced.

use crate::compare::{ComparisonSummary, column_means, summarize, summarize_steady_state};
use crate::config::BenchConfig;
use crate::error::BenchError;
use crate::persistence;
use crate::plot::PlotGenerator;
use crate::recorder::Recorder;
use crate::runner::{ExperimentRunner, RunOutcome};
use crate::store::ResultsStore;
use crate::table::ResultsTable;
use crate::unit::{Configuration, OptimizationKind, UnitFactory};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Where the driver is in a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DriverState {
    Idle,
    Running { step_count: usize },
    Aggregating,
    Plotting,
}

impl DriverState {
    pub fn can_transition_to(&self, next: &DriverState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running { .. })
                | (Self::Idle, Self::Aggregating)
                | (Self::Running { .. }, Self::Aggregating)
                | (Self::Aggregating, Self::Plotting)
                | (_, Self::Idle)
        )
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Running { step_count } => write!(f, "RUNNING({step_count})"),
            Self::Aggregating => write!(f, "AGGREGATING"),
            Self::Plotting => write!(f, "PLOTTING"),
        }
    }
}

/// Commands the driver understands. `steps: None` means the configured default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run {
        kind: OptimizationKind,
        steps: Option<usize>,
    },
    RunAll {
        steps: Option<usize>,
    },
    Compare {
        steps: Option<usize>,
    },
    Benchmark {
        steps: Option<usize>,
    },
    Plot {
        prefix: Option<String>,
    },
    Reset,
    Summary {
        skip_warmup: usize,
    },
}

/// Where a configuration gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FailureStage {
    Construction,
    Step { step: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationFailure {
    pub configuration: String,
    #[serde(flatten)]
    pub stage: FailureStage,
    pub message: String,
}

impl ConfigurationFailure {
    fn from_error(configuration: &str, err: &BenchError) -> Self {
        let stage = match err {
            BenchError::StepExecution { step, .. } => FailureStage::Step { step: *step },
            _ => FailureStage::Construction,
        };
        Self {
            configuration: configuration.to_string(),
            stage,
            message: err.to_string(),
        }
    }
}

/// Result of running a batch of configurations.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub step_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<RunOutcome>,
    pub failures: Vec<ConfigurationFailure>,
    /// Set when Ctrl-C stopped the batch between configurations.
    pub cancelled: bool,
    #[serde(skip)]
    pub table: ResultsTable,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Summary plus the plot files rendered from it.
#[derive(Debug, Clone, Serialize)]
pub struct PlotReport {
    pub summary: ComparisonSummary,
    pub paths: Vec<PathBuf>,
}

/// One half of a `benchmark` command.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkRound {
    pub prefix: String,
    pub report: BatchReport,
    pub plots: PlotReport,
    /// Copy of the results file taken after the round.
    pub archive: PathBuf,
}

/// Output of `summary`. `comparison` is absent when the baseline has no data.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub means: Vec<(String, f64)>,
    pub comparison: Option<ComparisonSummary>,
    pub skipped_warmup: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandOutcome {
    Run(BatchReport),
    RunAll(BatchReport),
    Compared {
        report: BatchReport,
        plots: PlotReport,
    },
    Benchmarked {
        rounds: Vec<BenchmarkRound>,
    },
    Plotted(PlotReport),
    Reset {
        results_path: PathBuf,
        plots_dir: PathBuf,
    },
    Summary(SummaryReport),
}

/// Orchestrates commands. One command at a time; configurations run in
/// declared order.
pub struct Driver {
    config: BenchConfig,
    store: ResultsStore,
    runner: ExperimentRunner,
    plots: PlotGenerator,
    state: DriverState,
    cancellation: CancellationToken,
    reset_on_corrupt: bool,
}

impl Driver {
    pub fn new(config: BenchConfig, factory: Arc<dyn UnitFactory>) -> Result<Self, BenchError> {
        config.validate()?;
        let store = ResultsStore::from_config(&config.store);
        let plots = PlotGenerator::new(config.store.plots_dir.clone());
        Ok(Self {
            config,
            store,
            runner: ExperimentRunner::new(factory),
            plots,
            state: DriverState::Idle,
            cancellation: CancellationToken::new(),
            reset_on_corrupt: false,
        })
    }

    /// Reset a corrupt store instead of failing when it is loaded.
    pub fn with_reset_on_corrupt(mut self, enabled: bool) -> Self {
        self.reset_on_corrupt = enabled;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Token that stops a batch before its next configuration.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn store(&self) -> &ResultsStore {
        &self.store
    }

    /// Run one command to completion. The driver is back in `Idle` afterwards,
    /// whether or not the command succeeded.
    pub async fn execute(&mut self, command: Command) -> Result<CommandOutcome, BenchError> {
        debug!(?command, "Executing command");
        let result = self.dispatch(command).await;
        if self.state != DriverState::Idle {
            self.transition(DriverState::Idle)?;
        }
        result
    }

    async fn dispatch(&mut self, command: Command) -> Result<CommandOutcome, BenchError> {
        match command {
            Command::Run { kind, steps } => self.run_one(kind, steps).await.map(CommandOutcome::Run),
            Command::RunAll { steps } => self.run_all(steps).await.map(CommandOutcome::RunAll),
            Command::Compare { steps } => {
                let (report, plots) = self.compare(steps).await?;
                Ok(CommandOutcome::Compared { report, plots })
            }
            Command::Benchmark { steps } => {
                let rounds = self.benchmark(steps).await?;
                Ok(CommandOutcome::Benchmarked { rounds })
            }
            Command::Plot { prefix } => self.plot(prefix.as_deref()).map(CommandOutcome::Plotted),
            Command::Reset => {
                self.reset()?;
                Ok(CommandOutcome::Reset {
                    results_path: self.store.path().to_path_buf(),
                    plots_dir: self.store.artifacts_dir().to_path_buf(),
                })
            }
            Command::Summary { skip_warmup } => {
                self.summary(skip_warmup).map(CommandOutcome::Summary)
            }
        }
    }

    /// Run the declared configuration of `kind`.
    async fn run_one(
        &mut self,
        kind: OptimizationKind,
        steps: Option<usize>,
    ) -> Result<BatchReport, BenchError> {
        let configuration = self
            .config
            .configuration_for(kind)
            .cloned()
            .ok_or_else(|| {
                BenchError::invalid_input(format!("no configuration declared for kind '{kind}'"))
            })?;
        let step_count = self.step_count(steps)?;
        let report = self.run_batch(&[configuration], step_count).await?;
        self.transition(DriverState::Idle)?;
        Ok(report)
    }

    /// Run every declared configuration, continuing past per-configuration failures.
    async fn run_all(&mut self, steps: Option<usize>) -> Result<BatchReport, BenchError> {
        let step_count = self.step_count(steps)?;
        let configurations = self.config.configurations.clone();
        let report = self.run_batch(&configurations, step_count).await?;
        self.transition(DriverState::Idle)?;
        Ok(report)
    }

    /// Run every configuration, then summarize and render all plots.
    async fn compare(
        &mut self,
        steps: Option<usize>,
    ) -> Result<(BatchReport, PlotReport), BenchError> {
        let step_count = self.step_count(steps)?;
        let configurations = self.config.configurations.clone();
        let report = self.run_batch(&configurations, step_count).await?;
        if report.cancelled {
            return Err(BenchError::Cancelled("compare".into()));
        }
        let plots = self.aggregate_and_plot(&report.table, None)?;
        Ok((report, plots))
    }

    /// Clear the store, run every configuration and plot, at `N` then `2N`
    /// steps. Each round's plots, results copy and manifest carry the prefix
    /// `steps_<count>_`.
    async fn benchmark(
        &mut self,
        steps: Option<usize>,
    ) -> Result<Vec<BenchmarkRound>, BenchError> {
        let base = self.step_count(steps)?;
        let doubled = base.checked_mul(2).ok_or_else(|| {
            BenchError::invalid_input(format!("step count {base} is too large to double"))
        })?;
        let configurations = self.config.configurations.clone();
        let mut rounds = Vec::with_capacity(2);

        for step_count in [base, doubled] {
            let prefix = format!("steps_{step_count}_");
            info!(step_count, prefix = %prefix, "Benchmark round");

            // Plots from the other round live in the same directory, so only
            // the results file is cleared.
            self.store.clear()?;
            let report = self.run_batch(&configurations, step_count).await?;
            if report.cancelled {
                return Err(BenchError::Cancelled("benchmark".into()));
            }
            let plots = self.aggregate_and_plot(&report.table, Some(&prefix))?;

            let dir = self.store.artifacts_dir();
            let archive = dir.join(format!("{prefix}results.csv"));
            self.store.archive(&archive)?;
            persistence::atomic_write_json(&dir.join(format!("{prefix}manifest.json")), &report)?;

            rounds.push(BenchmarkRound {
                prefix,
                report,
                plots,
                archive,
            });
        }
        Ok(rounds)
    }

    /// Render all plots from the current store.
    fn plot(&mut self, prefix: Option<&str>) -> Result<PlotReport, BenchError> {
        let table = self.load_table()?;
        self.aggregate_and_plot(&table, prefix)
    }

    /// Delete the results file and plots. Only allowed from `Idle`.
    fn reset(&mut self) -> Result<(), BenchError> {
        if self.state != DriverState::Idle {
            return Err(BenchError::InvalidTransition {
                from: self.state.to_string(),
                to: "reset".into(),
            });
        }
        self.store.reset()?;
        Ok(())
    }

    /// Per-configuration means from the current store, with speedups when the
    /// baseline has data.
    fn summary(&mut self, skip_warmup: usize) -> Result<SummaryReport, BenchError> {
        let table = self.load_table()?;
        self.transition(DriverState::Aggregating)?;
        let means = column_means(&table, skip_warmup);
        let comparison =
            match summarize_steady_state(&table, &self.config.store.baseline, skip_warmup) {
                Ok(summary) => Some(summary),
                Err(BenchError::MissingBaseline(name)) => {
                    debug!(baseline = %name, "No baseline data; means only");
                    None
                }
                Err(e) => return Err(e),
            };
        self.transition(DriverState::Idle)?;
        Ok(SummaryReport {
            means,
            comparison,
            skipped_warmup: skip_warmup,
        })
    }

    async fn run_batch(
        &mut self,
        configurations: &[Configuration],
        step_count: usize,
    ) -> Result<BatchReport, BenchError> {
        self.transition(DriverState::Running { step_count })?;
        let table = match self.load_table() {
            Ok(table) => table,
            Err(e) => {
                error!(error = %e, "Cannot load results store");
                self.transition(DriverState::Idle)?;
                return Err(e);
            }
        };

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, step_count, configurations = configurations.len(), "Starting batch");

        let mut recorder = Recorder::new(self.store.clone(), table);
        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        let mut cancelled = false;

        for configuration in configurations {
            if self.cancellation.is_cancelled() {
                warn!(
                    next = %configuration.name,
                    "Cancelled; remaining configurations skipped"
                );
                cancelled = true;
                break;
            }
            match self.runner.run(configuration, step_count, &mut recorder).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if e.is_configuration_scoped() => {
                    warn!(configuration = %configuration.name, error = %e, "Configuration failed; continuing");
                    failures.push(ConfigurationFailure::from_error(&configuration.name, &e));
                }
                Err(e) => {
                    error!(configuration = %configuration.name, error = %e, "Batch aborted");
                    self.transition(DriverState::Idle)?;
                    return Err(e);
                }
            }
        }

        info!(
            %run_id,
            succeeded = outcomes.len(),
            failed = failures.len(),
            cancelled,
            "Batch finished"
        );
        Ok(BatchReport {
            run_id,
            step_count,
            started_at,
            finished_at: Utc::now(),
            outcomes,
            failures,
            cancelled,
            table: recorder.into_table(),
        })
    }

    fn aggregate_and_plot(
        &mut self,
        table: &ResultsTable,
        prefix: Option<&str>,
    ) -> Result<PlotReport, BenchError> {
        self.transition(DriverState::Aggregating)?;
        if table.is_empty() {
            return Err(BenchError::EmptyTable);
        }
        let summary = summarize(table, &self.config.store.baseline)?;

        self.transition(DriverState::Plotting)?;
        let paths = self.plots.render_all(table, &summary, prefix)?;

        self.transition(DriverState::Idle)?;
        Ok(PlotReport { summary, paths })
    }

    fn load_table(&self) -> Result<ResultsTable, BenchError> {
        match self.store.load() {
            Err(e @ BenchError::CorruptStore { .. }) if self.reset_on_corrupt => {
                warn!(error = %e, "Resetting corrupt results store");
                self.store.reset()?;
                self.store.load()
            }
            other => other,
        }
    }

    fn step_count(&self, steps: Option<usize>) -> Result<usize, BenchError> {
        match steps.unwrap_or(self.config.store.default_steps) {
            0 => Err(BenchError::invalid_input("step count must be at least 1")),
            n => Ok(n),
        }
    }

    fn transition(&mut self, next: DriverState) -> Result<(), BenchError> {
        if !self.state.can_transition_to(&next) {
            return Err(BenchError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %self.state, to = %next, "Driver state");
        self.state = next;
        Ok(())
    }
}
