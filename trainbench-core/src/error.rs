//! Error types for the trainbench core.
//!
//! Configuration-scoped failures (`ExternalUnit`, `StepExecution`) are caught at
//! configuration boundaries by the driver; everything else ends the command.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for benchmark operations.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Configuration '{configuration}' could not construct its trainable unit: {message}")]
    ExternalUnit {
        configuration: String,
        message: String,
    },

    #[error("Configuration '{configuration}' failed at step {step}: {message}")]
    StepExecution {
        configuration: String,
        step: usize,
        message: String,
    },

    #[error("Results store {} is corrupt: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("Baseline configuration '{0}' has no recorded steps")]
    MissingBaseline(String),

    #[error("Results table has no populated columns; nothing to plot")]
    EmptyTable,

    #[error("Step {got} for '{configuration}' would leave a gap (next expected step is {expected})")]
    StepGap {
        configuration: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid timing for '{configuration}' step {step}: {elapsed_ms}ms")]
    InvalidTiming {
        configuration: String,
        step: usize,
        elapsed_ms: f64,
    },

    #[error("Driver cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Cancelled before {0} could finish")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Plot rendering error: {0}")]
    Render(#[from] std::fmt::Error),
}

impl BenchError {
    pub fn external_unit(configuration: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ExternalUnit {
            configuration: configuration.into(),
            message: msg.into(),
        }
    }

    pub fn step_execution(
        configuration: impl Into<String>,
        step: usize,
        msg: impl Into<String>,
    ) -> Self {
        Self::StepExecution {
            configuration: configuration.into(),
            step,
            message: msg.into(),
        }
    }

    pub fn corrupt_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the error only affects the configuration that raised it.
    ///
    /// A batch keeps going past these; every other error ends the command.
    pub fn is_configuration_scoped(&self) -> bool {
        matches!(self, Self::ExternalUnit { .. } | Self::StepExecution { .. })
    }
}
