//! The wide results table: one row per step, one column per configuration.
//!
//! A column stores only its populated prefix, so "cells for steps `0..len` are
//! present, everything after is absent" holds by construction. Mutation goes
//! through [`ResultsTable::record`], which refuses to open a gap.

use crate::error::BenchError;
use serde::{Deserialize, Serialize};

/// A single measured step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTiming {
    pub configuration: String,
    pub step: usize,
    pub elapsed_ms: f64,
}

impl StepTiming {
    pub fn new(configuration: &str, step: usize, elapsed_ms: f64) -> Self {
        Self {
            configuration: configuration.to_string(),
            step,
            elapsed_ms,
        }
    }
}

/// One configuration's timings, steps `0..cells.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    cells: Vec<f64>,
}

impl Column {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Sparse wide table of step timings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsTable {
    rows: usize,
    columns: Vec<Column>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty table whose `step` column already spans `rows` steps.
    pub fn with_rows(rows: usize) -> Self {
        Self {
            rows,
            columns: Vec::new(),
        }
    }

    /// Number of step rows (at least the longest column).
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Grow the step index to cover `rows` steps. Never shrinks.
    pub fn extend_rows(&mut self, rows: usize) {
        self.rows = self.rows.max(rows);
    }

    /// All columns in first-seen order, including ones with no cells.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Columns with at least one recorded step.
    pub fn populated_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.is_empty())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn cell(&self, name: &str, step: usize) -> Option<f64> {
        self.column(name).and_then(|c| c.cells.get(step).copied())
    }

    /// Longest populated prefix across all columns.
    pub fn max_steps(&self) -> usize {
        self.columns.iter().map(Column::len).max().unwrap_or(0)
    }

    /// True when no column holds any data.
    pub fn is_empty(&self) -> bool {
        self.populated_columns().next().is_none()
    }

    /// Append or overwrite one cell.
    ///
    /// `step` may overwrite an existing cell or extend the column by one; any
    /// larger index is rejected with [`BenchError::StepGap`].
    pub fn record(&mut self, timing: &StepTiming) -> Result<(), BenchError> {
        if !timing.elapsed_ms.is_finite() || timing.elapsed_ms < 0.0 {
            return Err(BenchError::InvalidTiming {
                configuration: timing.configuration.clone(),
                step: timing.step,
                elapsed_ms: timing.elapsed_ms,
            });
        }
        if timing.configuration.is_empty() || timing.configuration == crate::store::STEP_HEADER {
            return Err(BenchError::invalid_input(format!(
                "'{}' is not a valid configuration name",
                timing.configuration
            )));
        }

        let expected = self.column(&timing.configuration).map_or(0, Column::len);
        if timing.step > expected {
            return Err(BenchError::StepGap {
                configuration: timing.configuration.clone(),
                expected,
                got: timing.step,
            });
        }

        let column = self.column_mut_or_insert(&timing.configuration);
        if timing.step < column.cells.len() {
            column.cells[timing.step] = timing.elapsed_ms;
        } else {
            column.cells.push(timing.elapsed_ms);
        }
        let len = column.cells.len();
        self.extend_rows(len);
        Ok(())
    }

    /// Cut a configuration down to its first `len` cells, keeping its column
    /// position.
    ///
    /// Returns whether any cells were dropped.
    pub fn truncate_column(&mut self, name: &str, len: usize) -> bool {
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) if column.cells.len() > len => {
                column.cells.truncate(len);
                true
            }
            _ => false,
        }
    }

    /// Insert a fully formed column; used by the store when decoding.
    pub(crate) fn push_column(&mut self, name: &str, cells: Vec<f64>) {
        self.extend_rows(cells.len());
        self.columns.push(Column {
            name: name.to_string(),
            cells,
        });
    }

    fn column_mut_or_insert(&mut self, name: &str) -> &mut Column {
        let idx = match self.columns.iter().position(|c| c.name == name) {
            Some(idx) => idx,
            None => {
                self.columns.push(Column::new(name));
                self.columns.len() - 1
            }
        };
        &mut self.columns[idx]
    }
}
