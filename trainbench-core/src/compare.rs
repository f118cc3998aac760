//! Comparison engine: means, speedups and ranking over a results table.
//!
//! Summaries are derived values; they are recomputed from the table on every
//! call and never persisted.

use crate::error::BenchError;
use crate::table::ResultsTable;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Write as FmtWrite;

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// One configuration's aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSummary {
    pub name: String,
    pub mean_ms: f64,
    /// `baseline_mean / mean_ms`; above 1.0 is faster than the baseline.
    pub speedup: f64,
    pub steps: usize,
}

/// Per-configuration summary in table column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub baseline: String,
    pub baseline_mean_ms: f64,
    /// Leading steps skipped in every column before averaging.
    pub skipped_warmup: usize,
    pub entries: Vec<ConfigurationSummary>,
}

impl ComparisonSummary {
    pub fn get(&self, name: &str) -> Option<&ConfigurationSummary> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entries ordered fastest first. Equal means keep column order.
    pub fn ranked(&self) -> Vec<&ConfigurationSummary> {
        let mut ranked: Vec<&ConfigurationSummary> = self.entries.iter().collect();
        ranked.sort_by(|a, b| a.mean_ms.partial_cmp(&b.mean_ms).unwrap_or(Ordering::Equal));
        ranked
    }

    /// Non-baseline entries ordered by descending speedup. Ties keep column order.
    pub fn by_speedup(&self) -> Vec<&ConfigurationSummary> {
        let mut ordered: Vec<&ConfigurationSummary> = self
            .entries
            .iter()
            .filter(|e| e.name != self.baseline)
            .collect();
        ordered.sort_by(|a, b| b.speedup.partial_cmp(&a.speedup).unwrap_or(Ordering::Equal));
        ordered
    }

    pub fn fastest(&self) -> Option<&ConfigurationSummary> {
        self.ranked().into_iter().next()
    }
}

/// Summarize every populated column against `baseline`.
pub fn summarize(table: &ResultsTable, baseline: &str) -> Result<ComparisonSummary, BenchError> {
    summarize_steady_state(table, baseline, 0)
}

/// Like [`summarize`], but ignores the first `warmup` steps of every column.
///
/// Columns with no steps left after the cut are excluded; a baseline with no
/// steps left is reported as missing. A non-baseline column without a
/// finite speedup (a mean of exactly zero) is excluded too.
pub fn summarize_steady_state(
    table: &ResultsTable,
    baseline: &str,
    warmup: usize,
) -> Result<ComparisonSummary, BenchError> {
    let steady = |cells: &[f64]| cells.get(warmup..).and_then(mean);

    let baseline_mean = table
        .column(baseline)
        .and_then(|c| steady(c.cells()))
        .ok_or_else(|| BenchError::MissingBaseline(baseline.to_string()))?;

    let entries = table
        .populated_columns()
        .filter_map(|column| {
            let mean_ms = steady(column.cells())?;
            let speedup = if column.name() == baseline {
                1.0
            } else {
                Some(baseline_mean / mean_ms).filter(|s| s.is_finite())?
            };
            Some(ConfigurationSummary {
                name: column.name().to_string(),
                mean_ms,
                speedup,
                steps: column.len().saturating_sub(warmup),
            })
        })
        .collect();

    Ok(ComparisonSummary {
        baseline: baseline.to_string(),
        baseline_mean_ms: baseline_mean,
        skipped_warmup: warmup,
        entries,
    })
}

/// Per-column means without a baseline, in column order.
pub fn column_means(table: &ResultsTable, warmup: usize) -> Vec<(String, f64)> {
    table
        .populated_columns()
        .filter_map(|c| {
            c.cells()
                .get(warmup..)
                .and_then(mean)
                .map(|m| (c.name().to_string(), m))
        })
        .collect()
}

/// Render a ranked summary as an aligned text table with speedup bars.
pub fn render_ascii(summary: &ComparisonSummary) -> String {
    const BAR_WIDTH: usize = 30;

    let name_width = summary
        .entries
        .iter()
        .map(|e| e.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("configuration".len());
    let max_speedup = summary
        .entries
        .iter()
        .map(|e| e.speedup)
        .fold(1.0_f64, f64::max);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<name_width$}  {:>10}  {:>8}  {:>6}",
        "configuration", "mean (ms)", "speedup", "steps"
    );
    for entry in summary.ranked() {
        let marker = if entry.name == summary.baseline { " (baseline)" } else { "" };
        let _ = writeln!(
            out,
            "{:<name_width$}  {:>10.2}  {:>7.2}x  {:>6}  {}{}",
            entry.name,
            entry.mean_ms,
            entry.speedup,
            entry.steps,
            render_bar(entry.speedup, max_speedup, BAR_WIDTH),
            marker
        );
    }
    if summary.skipped_warmup > 0 {
        let _ = writeln!(
            out,
            "(first {} step(s) of each configuration excluded)",
            summary.skipped_warmup
        );
    }
    out
}

fn render_bar(value: f64, max: f64, width: usize) -> String {
    let ratio = if max > 0.0 { (value / max).clamp(0.0, 1.0) } else { 0.0 };
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}
