//! Plot generator: SVG charts rendered from a results table or a summary.
//!
//! Rendering never touches the table or summary it is given; the optional
//! prefix only changes the output file name.

mod bar;
mod heatmap;
mod line;
mod svg;

use crate::compare::ComparisonSummary;
use crate::error::BenchError;
use crate::persistence;
use crate::table::ResultsTable;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotKind {
    Line,
    Heatmap,
    SpeedupBar,
}

impl PlotKind {
    pub const ALL: [PlotKind; 3] = [PlotKind::Line, PlotKind::Heatmap, PlotKind::SpeedupBar];

    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Line => "step_times",
            Self::Heatmap => "step_heatmap",
            Self::SpeedupBar => "speedup",
        }
    }

    /// `<prefix><stem>.svg`
    pub fn file_name(&self, prefix: Option<&str>) -> String {
        format!("{}{}.svg", prefix.unwrap_or_default(), self.file_stem())
    }
}

/// A rendered chart, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct RenderedPlot {
    pub kind: PlotKind,
    pub file_name: String,
    pub svg: String,
}

impl RenderedPlot {
    /// Atomically write the chart into `dir`, returning its path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, BenchError> {
        let path = dir.join(&self.file_name);
        persistence::atomic_write(&path, self.svg.as_bytes())?;
        Ok(path)
    }
}

/// Time vs. step, one line per configuration over its populated prefix.
pub fn render_line(table: &ResultsTable, prefix: Option<&str>) -> Result<RenderedPlot, BenchError> {
    ensure_populated(table)?;
    Ok(RenderedPlot {
        kind: PlotKind::Line,
        file_name: PlotKind::Line.file_name(prefix),
        svg: line::draw(table)?,
    })
}

/// Configurations × steps, absent cells marked as "no data".
pub fn render_heatmap(
    table: &ResultsTable,
    prefix: Option<&str>,
) -> Result<RenderedPlot, BenchError> {
    ensure_populated(table)?;
    Ok(RenderedPlot {
        kind: PlotKind::Heatmap,
        file_name: PlotKind::Heatmap.file_name(prefix),
        svg: heatmap::draw(table)?,
    })
}

/// Mean speedup of every non-baseline configuration, descending.
pub fn render_speedup_bar(
    summary: &ComparisonSummary,
    prefix: Option<&str>,
) -> Result<RenderedPlot, BenchError> {
    if summary.entries.is_empty() {
        return Err(BenchError::EmptyTable);
    }
    Ok(RenderedPlot {
        kind: PlotKind::SpeedupBar,
        file_name: PlotKind::SpeedupBar.file_name(prefix),
        svg: bar::draw(summary)?,
    })
}

fn ensure_populated(table: &ResultsTable) -> Result<(), BenchError> {
    if table.is_empty() {
        Err(BenchError::EmptyTable)
    } else {
        Ok(())
    }
}

/// Renders all three charts into one directory.
#[derive(Debug, Clone)]
pub struct PlotGenerator {
    dir: PathBuf,
}

impl PlotGenerator {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Render and write the line chart, heatmap and speedup bars.
    pub fn render_all(
        &self,
        table: &ResultsTable,
        summary: &ComparisonSummary,
        prefix: Option<&str>,
    ) -> Result<Vec<PathBuf>, BenchError> {
        let plots = [
            render_line(table, prefix)?,
            render_heatmap(table, prefix)?,
            render_speedup_bar(summary, prefix)?,
        ];
        let mut paths = Vec::with_capacity(plots.len());
        for plot in &plots {
            let path = plot.write_to(&self.dir)?;
            info!(path = %path.display(), "Wrote plot");
            paths.push(path);
        }
        Ok(paths)
    }
}
