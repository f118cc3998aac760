//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::GlobalOptions;
use crate::output;
use std::path::Path;
use tracing::warn;
use trainbench_core::config::{WORKSPACE_CONFIG_DIR, load_config, workspace_config_path};
use trainbench_core::unit::build_factory;
use trainbench_core::{BenchConfig, Command, Driver};

/// Load the layered configuration and apply command-line overrides.
pub fn load(workspace: &Path, options: &GlobalOptions) -> anyhow::Result<BenchConfig> {
    let mut config = load_config(workspace, options.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(results) = &options.results {
        config.store.results_path = results.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Write the default configuration to `<workspace>/.trainbench/config.toml`.
pub fn init_config(workspace: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(workspace.join(WORKSPACE_CONFIG_DIR))?;

    let config_path = workspace_config_path(workspace);
    if config_path.exists() {
        println!(
            "Configuration file already exists at: {}",
            config_path.display()
        );
        return Ok(());
    }

    let toml_str = toml::to_string_pretty(&BenchConfig::default())?;
    std::fs::write(&config_path, &toml_str)?;
    println!(
        "Created default configuration at: {}",
        config_path.display()
    );
    Ok(())
}

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config: BenchConfig,
    workspace: &Path,
    options: &GlobalOptions,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, &config, workspace),
        Commands::List => {
            output::print_configurations(&config);
            Ok(())
        }
        other => match driver_command(other) {
            Some(command) => run_driver(command, config, options).await,
            None => Ok(()),
        },
    }
}

fn handle_config(action: ConfigAction, config: &BenchConfig, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => init_config(workspace),
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

/// Map a measurement subcommand onto the driver's command type.
fn driver_command(command: Commands) -> Option<Command> {
    let command = match command {
        Commands::Run { kind, steps } => Command::Run { kind, steps },
        Commands::RunAll { steps } => Command::RunAll { steps },
        Commands::Compare { steps } => Command::Compare { steps },
        Commands::Benchmark { steps } => Command::Benchmark { steps },
        Commands::Plot { prefix } => Command::Plot { prefix },
        Commands::Reset => Command::Reset,
        Commands::Summary { skip_warmup } => Command::Summary { skip_warmup },
        Commands::List | Commands::Config { .. } => return None,
    };
    Some(command)
}

async fn run_driver(
    command: Command,
    config: BenchConfig,
    options: &GlobalOptions,
) -> anyhow::Result<()> {
    let factory = build_factory(&config.unit);
    let mut driver = Driver::new(config, factory)?.with_reset_on_corrupt(options.reset_on_corrupt);

    // Ctrl-C stops the batch before its next configuration; the step in
    // flight and everything already recorded are kept.
    let token = driver.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current configuration");
            token.cancel();
        }
    });

    let result = driver.execute(command).await;
    interrupt.abort();
    let outcome = result?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        output::print_outcome(&outcome);
    }
    output::ensure_success(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use trainbench_core::OptimizationKind;

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        init_config(workspace).unwrap();

        let config_path = workspace.join(".trainbench").join("config.toml");
        assert!(config_path.exists());

        // Verify it's valid TOML
        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: BenchConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.store.default_steps, 50);
        assert_eq!(parsed.configurations.len(), 6);
    }

    #[test]
    fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        init_config(workspace).unwrap();
        let config_path = workspace_config_path(workspace);
        std::fs::write(&config_path, "[store]\ndefault_steps = 7\n").unwrap();

        // Second init should not overwrite
        init_config(workspace).unwrap();
        let content = std::fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("default_steps = 7"));
    }

    #[test]
    fn test_load_applies_results_override() {
        let dir = TempDir::new().unwrap();
        let options = GlobalOptions {
            results: Some(dir.path().join("other.csv")),
            ..Default::default()
        };
        let config = load(dir.path(), &options).unwrap();
        assert_eq!(config.store.results_path, dir.path().join("other.csv"));
        assert_eq!(config.store.plots_dir, dir.path().join("plots"));
    }

    #[test]
    fn test_load_reads_workspace_config() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".trainbench")).unwrap();
        std::fs::write(
            workspace_config_path(dir.path()),
            "[store]\ndefault_steps = 12\nbaseline = \"FP32\"\n\n[[configurations]]\nname = \"FP32\"\nkind = \"none\"\n",
        )
        .unwrap();

        let config = load(dir.path(), &GlobalOptions::default()).unwrap();
        assert_eq!(config.store.default_steps, 12);
        assert_eq!(config.configurations.len(), 1);
        assert_eq!(config.configurations[0].kind, OptimizationKind::None);
    }

    #[test]
    fn test_driver_command_mapping() {
        assert_eq!(
            driver_command(Commands::Run {
                kind: OptimizationKind::FusedAttention,
                steps: Some(3),
            }),
            Some(Command::Run {
                kind: OptimizationKind::FusedAttention,
                steps: Some(3),
            })
        );
        assert_eq!(driver_command(Commands::Reset), Some(Command::Reset));
        assert_eq!(driver_command(Commands::List), None);
    }

    #[tokio::test]
    async fn test_summary_on_empty_store_succeeds() {
        let dir = TempDir::new().unwrap();
        let config = load(dir.path(), &GlobalOptions::default()).unwrap();
        run_driver(
            Command::Summary { skip_warmup: 0 },
            config,
            &GlobalOptions::default(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_plot_on_empty_store_fails() {
        let dir = TempDir::new().unwrap();
        let config = load(dir.path(), &GlobalOptions::default()).unwrap();
        let err = run_driver(Command::Plot { prefix: None }, config, &GlobalOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nothing to plot"));
    }
}
