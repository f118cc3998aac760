//! Configuration for trainbench.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit config file -> environment.

use crate::error::BenchError;
use crate::unit::{Configuration, OptimizationKind};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Workspace-relative directory holding `config.toml`.
pub const WORKSPACE_CONFIG_DIR: &str = ".trainbench";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Results store and artifact locations.
    #[serde(default)]
    pub store: StoreConfig,
    /// Trainable-unit backend.
    #[serde(default)]
    pub unit: UnitConfig,
    /// Log file settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Configurations in the order `run-all` executes them.
    #[serde(default = "Configuration::defaults")]
    pub configurations: Vec<Configuration>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            unit: UnitConfig::default(),
            logging: LoggingConfig::default(),
            configurations: Configuration::defaults(),
        }
    }
}

impl BenchConfig {
    /// Resolve relative paths against `workspace`.
    pub fn resolve_paths(&mut self, workspace: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = workspace.join(&*path);
            }
        };
        resolve(&mut self.store.results_path);
        resolve(&mut self.store.plots_dir);
        resolve(&mut self.logging.dir);
        if let Some(dir) = self.unit.command.working_dir.as_mut() {
            resolve(dir);
        }
    }

    /// Check invariants the rest of the harness relies on.
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.store.default_steps == 0 {
            return Err(BenchError::config("store.default_steps must be at least 1"));
        }
        if self.unit.batch_size == 0 {
            return Err(BenchError::config("unit.batch_size must be at least 1"));
        }
        self.unit.simulated.validate()?;
        if self.configurations.is_empty() {
            return Err(BenchError::config("at least one configuration is required"));
        }
        let mut seen = HashSet::new();
        for configuration in &self.configurations {
            let name = configuration.name.as_str();
            if name.trim().is_empty() || name == crate::store::STEP_HEADER {
                return Err(BenchError::config(format!(
                    "'{name}' is not a valid configuration name"
                )));
            }
            if !seen.insert(name) {
                return Err(BenchError::config(format!(
                    "configuration name '{name}' is declared twice"
                )));
            }
        }
        Ok(())
    }

    /// First declared configuration of `kind`.
    pub fn configuration_for(&self, kind: OptimizationKind) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.kind == kind)
    }
}

/// Results store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Results CSV file.
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,
    /// Directory for rendered plots and benchmark archives.
    #[serde(default = "default_plots_dir")]
    pub plots_dir: PathBuf,
    /// Step count used when a command does not specify one.
    #[serde(default = "default_steps")]
    pub default_steps: usize,
    /// Column that speedups are measured against.
    #[serde(default = "default_baseline")]
    pub baseline: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            results_path: default_results_path(),
            plots_dir: default_plots_dir(),
            default_steps: default_steps(),
            baseline: default_baseline(),
        }
    }
}

fn default_results_path() -> PathBuf {
    PathBuf::from("results.csv")
}

fn default_plots_dir() -> PathBuf {
    PathBuf::from("plots")
}

fn default_steps() -> usize {
    50
}

fn default_baseline() -> String {
    OptimizationKind::None.default_name().to_string()
}

/// Which trainable-unit implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitBackend {
    #[default]
    Simulated,
    Command,
}

/// Trainable-unit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    #[serde(default)]
    pub backend: UnitBackend,
    /// Training batch size passed to every unit.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub simulated: SimulatedConfig,
    #[serde(default)]
    pub command: CommandConfig,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            backend: UnitBackend::default(),
            batch_size: default_batch_size(),
            simulated: SimulatedConfig::default(),
            command: CommandConfig::default(),
        }
    }
}

fn default_batch_size() -> usize {
    256
}

/// Simulated backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    /// FP32 step time at the reference batch size (ms).
    #[serde(default = "default_base_step_ms")]
    pub base_step_ms: f64,
    /// Relative jitter applied to every step (0.05 = ±5%).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Slowdown multiplier for warm-up steps.
    #[serde(default = "default_warmup_factor")]
    pub warmup_factor: f64,
    /// Kinds whose construction fails, emulating missing hardware support.
    #[serde(default)]
    pub unavailable: Vec<OptimizationKind>,
    /// Inject a step failure at this index.
    #[serde(default)]
    pub fault_at_step: Option<usize>,
    /// Fixed RNG seed for reproducible jitter.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            base_step_ms: default_base_step_ms(),
            jitter: default_jitter(),
            warmup_factor: default_warmup_factor(),
            unavailable: Vec::new(),
            fault_at_step: None,
            seed: None,
        }
    }
}

impl SimulatedConfig {
    /// Every timing knob must be a finite, non-negative number.
    pub fn validate(&self) -> Result<(), BenchError> {
        for (key, value) in [
            ("base_step_ms", self.base_step_ms),
            ("jitter", self.jitter),
            ("warmup_factor", self.warmup_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BenchError::config(format!(
                    "unit.simulated.{key} must be a finite non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

fn default_base_step_ms() -> f64 {
    20.0
}

fn default_jitter() -> f64 {
    0.05
}

fn default_warmup_factor() -> f64 {
    4.0
}

/// Worker-subprocess backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Worker executable.
    #[serde(default)]
    pub program: Option<PathBuf>,
    /// Arguments placed before the harness-supplied flags.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the worker.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Limit for the handshake and for each step (seconds).
    #[serde(default = "default_worker_timeout")]
    pub timeout_secs: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            working_dir: None,
            timeout_secs: default_worker_timeout(),
        }
    }
}

fn default_worker_timeout() -> u64 {
    300
}

/// Structured log file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the daily JSON log file.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    /// Write the JSON log file at all.
    #[serde(default = "default_true")]
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            json_file: true,
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(WORKSPACE_CONFIG_DIR).join("logs")
}

fn default_true() -> bool {
    true
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_CONFIG_DIR).join("config.toml")
}

/// Load configuration with layered merging.
///
/// Relative paths in the result are resolved against `workspace`.
pub fn load_config(
    workspace: &Path,
    explicit: Option<&Path>,
) -> Result<BenchConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(BenchConfig::default()));

    // User-level config
    if let Some(dirs) = directories::ProjectDirs::from("dev", "trainbench", "trainbench") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    let ws_config = workspace_config_path(workspace);
    if ws_config.exists() {
        figment = figment.merge(Toml::file(&ws_config));
    }

    // Explicit --config file
    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (TRAINBENCH_STORE__DEFAULT_STEPS, TRAINBENCH_UNIT__BACKEND, ...)
    figment = figment.merge(Env::prefixed("TRAINBENCH_").split("__"));

    let mut config: BenchConfig = figment.extract().map_err(Box::new)?;
    config.resolve_paths(workspace);
    Ok(config)
}
