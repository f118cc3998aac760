//! trainbench CLI: run optimization configurations, compare and plot step times.

mod commands;
mod output;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use trainbench_core::OptimizationKind;
use trainbench_core::config::LoggingConfig;

/// Wall-clock benchmarking of GPU training-loop optimizations
#[derive(Parser, Debug)]
#[command(name = "trainbench", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (relative paths in the config resolve against it)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Results CSV file, overriding `store.results_path`
    #[arg(long)]
    results: Option<PathBuf>,

    /// Reset the results store if it is corrupt instead of failing
    #[arg(long)]
    reset_on_corrupt: bool,

    /// Print command results as JSON
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run one configuration and record its step times
    Run {
        /// Optimization kind (baseline, tf32, bf16, compiled-kernel, fused-attention, fused-optimizer)
        kind: OptimizationKind,
        /// Number of training steps
        #[arg(short, long)]
        steps: Option<usize>,
    },
    /// Run every configuration in declared order
    RunAll {
        #[arg(short, long)]
        steps: Option<usize>,
    },
    /// Run every configuration, then render all plots
    Compare {
        #[arg(short, long)]
        steps: Option<usize>,
    },
    /// Full reset + run + plot at N and 2N steps, with separate artifacts
    Benchmark {
        #[arg(short, long)]
        steps: Option<usize>,
    },
    /// Render plots from the current results
    Plot {
        /// Prefix for output file names
        #[arg(short, long)]
        prefix: Option<String>,
    },
    /// Delete the results file and all plots
    Reset,
    /// Print per-configuration means and speedups
    Summary {
        /// Leading steps of each configuration to leave out
        #[arg(long, default_value = "0")]
        skip_warmup: usize,
    },
    /// List declared configurations
    List,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default config file into the workspace
    Init,
    /// Show the effective configuration
    Show,
}

/// Flags that apply to every command.
#[derive(Debug, Clone, Default)]
struct GlobalOptions {
    config: Option<PathBuf>,
    results: Option<PathBuf>,
    reset_on_corrupt: bool,
    json: bool,
}

/// Human-readable stderr layer plus an optional daily JSON log file.
///
/// The returned guard must live until exit so buffered lines are flushed.
fn init_tracing(
    verbose: u8,
    quiet: bool,
    logging: &LoggingConfig,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let (json_layer, guard) = if logging.json_file && std::fs::create_dir_all(&logging.dir).is_ok()
    {
        let file_appender = tracing_appender::rolling::daily(&logging.dir, "trainbench.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("Workspace {}: {}", cli.workspace.display(), e))?;

    let options = GlobalOptions {
        config: cli.config,
        results: cli.results,
        reset_on_corrupt: cli.reset_on_corrupt,
        json: cli.json,
    };

    // `config init` must work even when the existing config does not parse.
    if let Commands::Config {
        action: ConfigAction::Init,
    } = cli.command
    {
        return commands::init_config(&workspace);
    }

    let config = commands::load(&workspace, &options)?;
    let _guard = init_tracing(cli.verbose, cli.quiet, &config.logging);

    commands::handle_command(cli.command, config, &workspace, &options).await
}
