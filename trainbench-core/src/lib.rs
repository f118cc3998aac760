//! # trainbench-core
//!
//! Measurement core for comparing GPU training-loop optimizations by wall-clock
//! step time: step timing and recording, the experiment runner, the CSV results
//! store, the comparison engine, SVG plots, and the command driver.
//!
//! Data flows one way: driver -> runner (per configuration) -> recorder ->
//! store -> comparison -> plots. The model, data and framework calls live
//! behind [`unit::TrainableUnit`].

// Foundation
pub mod config;
pub mod error;
pub mod persistence;

// Measurement
pub mod recorder;
pub mod runner;
pub mod unit;

// Results
pub mod store;
pub mod table;

// Aggregation & rendering
pub mod compare;
pub mod plot;

// Orchestration
pub mod driver;

// Re-exports
pub use compare::{ComparisonSummary, ConfigurationSummary, summarize, summarize_steady_state};
pub use config::{BenchConfig, load_config};
pub use driver::{BatchReport, Command, CommandOutcome, Driver, DriverState};
pub use error::BenchError;
pub use plot::{PlotGenerator, PlotKind};
pub use recorder::{Recorder, StepTimer};
pub use runner::{ExperimentRunner, RunOutcome};
pub use store::ResultsStore;
pub use table::{ResultsTable, StepTiming};
pub use unit::{Configuration, OptimizationKind, TrainableUnit, UnitError, UnitFactory};
