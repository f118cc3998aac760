//! Trainable units: the external training step the harness times.
//!
//! The harness never looks inside a unit. It asks a [`UnitFactory`] for one
//! unit per configuration, calls [`TrainableUnit::step`] a fixed number of
//! times, and drops the unit before the next configuration starts so no
//! device state leaks between configurations.

pub mod command;
pub mod simulated;

use crate::config::{UnitBackend, UnitConfig};
use crate::error::BenchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use command::CommandFactory;
pub use simulated::SimulatedFactory;

/// GPU optimization toggled by a configuration.
///
/// Kinds are cumulative in the declared order: each one keeps the
/// optimizations of the kinds before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationKind {
    /// Plain FP32 training.
    None,
    /// TF32 matmuls.
    ReducedPrecisionA,
    /// BF16 autocast.
    ReducedPrecisionB,
    /// Ahead-of-step kernel compilation.
    CompiledKernel,
    /// Fused (flash / memory-efficient) attention.
    FusedAttention,
    /// Fused optimizer step.
    FusedOptimizer,
}

impl OptimizationKind {
    pub const ALL: [OptimizationKind; 6] = [
        OptimizationKind::None,
        OptimizationKind::ReducedPrecisionA,
        OptimizationKind::ReducedPrecisionB,
        OptimizationKind::CompiledKernel,
        OptimizationKind::FusedAttention,
        OptimizationKind::FusedOptimizer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ReducedPrecisionA => "reduced-precision-a",
            Self::ReducedPrecisionB => "reduced-precision-b",
            Self::CompiledKernel => "compiled-kernel",
            Self::FusedAttention => "fused-attention",
            Self::FusedOptimizer => "fused-optimizer",
        }
    }

    /// Results column name used when no configuration overrides it.
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::None => "Baseline",
            Self::ReducedPrecisionA => "TF32",
            Self::ReducedPrecisionB => "BF16",
            Self::CompiledKernel => "BF16+TC",
            Self::FusedAttention => "BF16+TC+FA",
            Self::FusedOptimizer => "BF16+TC+FA+FuOp",
        }
    }

    /// Leading steps dominated by one-off costs (autotuning, compilation).
    pub fn warmup_steps(&self) -> usize {
        match self {
            Self::None => 0,
            Self::ReducedPrecisionA | Self::ReducedPrecisionB => 1,
            Self::CompiledKernel | Self::FusedAttention | Self::FusedOptimizer => 3,
        }
    }
}

impl fmt::Display for OptimizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let kind = match lowered.as_str() {
            "none" | "baseline" | "fp32" => Self::None,
            "reduced-precision-a" | "tf32" => Self::ReducedPrecisionA,
            "reduced-precision-b" | "bf16" => Self::ReducedPrecisionB,
            "compiled-kernel" | "compile" | "tc" => Self::CompiledKernel,
            "fused-attention" | "flash-attention" | "fa" => Self::FusedAttention,
            "fused-optimizer" | "fuop" => Self::FusedOptimizer,
            _ => {
                return Err(BenchError::invalid_input(format!(
                    "unknown optimization kind '{s}' (expected one of: {})",
                    Self::ALL.map(|k| k.as_str()).join(", ")
                )));
            }
        };
        Ok(kind)
    }
}

/// A named benchmark configuration. Owns no other state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    pub kind: OptimizationKind,
}

impl Configuration {
    pub fn new(name: &str, kind: OptimizationKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }

    /// The six configurations in their declared run order.
    pub fn defaults() -> Vec<Configuration> {
        OptimizationKind::ALL
            .iter()
            .map(|kind| Configuration::new(kind.default_name(), *kind))
            .collect()
    }
}

/// Errors raised by a trainable unit or its factory.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("unsupported on this device: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One constructed training setup for a single configuration.
#[async_trait]
pub trait TrainableUnit: Send {
    /// Run one training step. Must not return before the device has finished
    /// the step, otherwise the harness times only the kernel launches.
    async fn step(&mut self) -> Result<(), UnitError>;
}

/// Builds trainable units for configurations.
#[async_trait]
pub trait UnitFactory: Send + Sync {
    async fn construct(
        &self,
        configuration: &Configuration,
    ) -> Result<Box<dyn TrainableUnit>, UnitError>;
}

/// Build the factory selected by `config.backend`.
pub fn build_factory(config: &UnitConfig) -> Arc<dyn UnitFactory> {
    match config.backend {
        UnitBackend::Simulated => Arc::new(SimulatedFactory::new(
            config.simulated.clone(),
            config.batch_size,
        )),
        UnitBackend::Command => Arc::new(CommandFactory::new(
            config.command.clone(),
            config.batch_size,
        )),
    }
}
