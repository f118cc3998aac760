//! Terminal rendering of command outcomes and the exit policy.

use trainbench_core::BenchConfig;
use trainbench_core::compare::render_ascii;
use trainbench_core::driver::{BatchReport, CommandOutcome, PlotReport, SummaryReport};

pub fn print_outcome(outcome: &CommandOutcome) {
    match outcome {
        CommandOutcome::Run(report) | CommandOutcome::RunAll(report) => print_batch(report),
        CommandOutcome::Compared { report, plots } => {
            print_batch(report);
            println!();
            print_plots(plots);
        }
        CommandOutcome::Benchmarked { rounds } => {
            for round in rounds {
                println!("== {} steps ({}) ==", round.report.step_count, round.prefix);
                print_batch(&round.report);
                println!();
                print_plots(&round.plots);
                println!("  results copy: {}", round.archive.display());
                println!();
            }
        }
        CommandOutcome::Plotted(plots) => print_plots(plots),
        CommandOutcome::Reset {
            results_path,
            plots_dir,
        } => {
            println!("Cleared {}", results_path.display());
            println!("Removed {}", plots_dir.display());
        }
        CommandOutcome::Summary(summary) => print_summary(summary),
    }
}

fn print_batch(report: &BatchReport) {
    println!("Run {} ({} steps)", report.run_id, report.step_count);
    for outcome in &report.outcomes {
        let mean = outcome
            .mean_ms
            .map(|m| format!("{m:.2} ms"))
            .unwrap_or_else(|| "-".into());
        let steady = outcome
            .steady_state_mean_ms
            .map(|m| format!("{m:.2} ms"))
            .unwrap_or_else(|| "-".into());
        println!(
            "  ok      {:<20} {:>4} steps  mean {:>12}  after warm-up {:>12}",
            outcome.configuration, outcome.steps_recorded, mean, steady
        );
    }
    for failure in &report.failures {
        println!("  failed  {:<20} {}", failure.configuration, failure.message);
    }
    if report.cancelled {
        println!("  cancelled; remaining configurations were not run");
    }
}

fn print_plots(plots: &PlotReport) {
    print!("{}", render_ascii(&plots.summary));
    for path in &plots.paths {
        println!("  wrote {}", path.display());
    }
}

fn print_summary(summary: &SummaryReport) {
    if summary.means.is_empty() {
        println!("No results recorded.");
        return;
    }
    match &summary.comparison {
        Some(comparison) => print!("{}", render_ascii(comparison)),
        None => {
            let width = summary
                .means
                .iter()
                .map(|(name, _)| name.chars().count())
                .max()
                .unwrap_or(0)
                .max("configuration".len());
            println!("{:<width$}  {:>10}", "configuration", "mean (ms)");
            for (name, mean) in &summary.means {
                println!("{name:<width$}  {mean:>10.2}");
            }
            println!("(no baseline data; speedups unavailable)");
        }
    }
}

pub fn print_configurations(config: &BenchConfig) {
    println!("{:<20} {:<20} {:>7}", "name", "kind", "warm-up");
    for configuration in &config.configurations {
        let marker = if configuration.name == config.store.baseline {
            "  (baseline)"
        } else {
            ""
        };
        println!(
            "{:<20} {:<20} {:>7}{}",
            configuration.name,
            configuration.kind.as_str(),
            configuration.kind.warmup_steps(),
            marker
        );
    }
}

/// A single `run` that did not finish, or a batch stopped by Ctrl-C, exits
/// non-zero. `run-all` keeps a zero status when individual configurations fail.
pub fn ensure_success(outcome: &CommandOutcome) -> anyhow::Result<()> {
    match outcome {
        CommandOutcome::Run(report) => {
            if let Some(failure) = report.failures.first() {
                anyhow::bail!("{}", failure.message);
            }
            if report.cancelled {
                anyhow::bail!("cancelled");
            }
            Ok(())
        }
        CommandOutcome::RunAll(report) if report.cancelled => anyhow::bail!("cancelled"),
        _ => Ok(()),
    }
}
