//! Durable CSV results store.
//!
//! File layout: a `step` header followed by one column per configuration in
//! first-seen order; each body row is the step index then one cell per
//! configuration, empty where that configuration has no data for the step.

use crate::config::StoreConfig;
use crate::error::BenchError;
use crate::persistence;
use crate::table::ResultsTable;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the leading step-index column.
pub const STEP_HEADER: &str = "step";

/// Single-writer results store backed by one CSV file.
#[derive(Debug, Clone)]
pub struct ResultsStore {
    path: PathBuf,
    artifacts_dir: PathBuf,
    default_steps: usize,
}

impl ResultsStore {
    pub fn new(path: PathBuf, artifacts_dir: PathBuf, default_steps: usize) -> Self {
        Self {
            path,
            artifacts_dir,
            default_steps,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            config.results_path.clone(),
            config.plots_dir.clone(),
            config.default_steps,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding derived artifacts (plots, archives).
    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn default_steps(&self) -> usize {
        self.default_steps
    }

    /// Load the current table. A missing file is an empty table.
    pub fn load(&self) -> Result<ResultsTable, BenchError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No results file yet");
                return Ok(ResultsTable::new());
            }
            Err(e) => return Err(e.into()),
        };
        decode(&bytes).map_err(|reason| BenchError::corrupt_store(&self.path, reason))
    }

    /// Replace the file with `table` (atomic write).
    pub fn save(&self, table: &ResultsTable) -> Result<(), BenchError> {
        let bytes = encode(table)?;
        persistence::atomic_write(&self.path, &bytes)?;
        Ok(())
    }

    /// Delete the results file and start over with an empty table sized to
    /// the default step count. Plot artifacts are left alone.
    pub fn clear(&self) -> Result<ResultsTable, BenchError> {
        persistence::remove_if_exists(&self.path)?;
        let table = ResultsTable::with_rows(self.default_steps);
        self.save(&table)?;
        debug!(path = %self.path.display(), rows = self.default_steps, "Results store cleared");
        Ok(table)
    }

    /// Delete the results file and every derived artifact, then re-initialize.
    pub fn reset(&self) -> Result<ResultsTable, BenchError> {
        match std::fs::remove_dir_all(&self.artifacts_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let table = self.clear()?;
        info!(
            path = %self.path.display(),
            artifacts = %self.artifacts_dir.display(),
            "Results store reset"
        );
        Ok(table)
    }

    /// Copy the current results file to `dest` (atomic write).
    pub fn archive(&self, dest: &Path) -> Result<(), BenchError> {
        let bytes = std::fs::read(&self.path)?;
        persistence::atomic_write(dest, &bytes)?;
        Ok(())
    }
}

/// Serialize a table to CSV bytes.
pub fn encode(table: &ResultsTable) -> Result<Vec<u8>, BenchError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = Vec::with_capacity(table.columns().len() + 1);
    header.push(STEP_HEADER.to_string());
    header.extend(table.columns().iter().map(|c| c.name().to_string()));
    writer.write_record(&header)?;

    for step in 0..table.row_count() {
        let mut record = Vec::with_capacity(header.len());
        record.push(step.to_string());
        for column in table.columns() {
            record.push(
                column
                    .cells()
                    .get(step)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&record)?;
    }

    writer.into_inner().map_err(|e| BenchError::Io(e.into_error()))
}

/// Parse CSV bytes into a table, checking every structural invariant.
///
/// The error is a human-readable reason; [`ResultsStore::load`] attaches the path.
pub fn decode(bytes: &[u8]) -> Result<ResultsTable, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| format!("unreadable header: {e}"))?
        .clone();
    let mut fields = headers.iter();
    match fields.next() {
        Some(STEP_HEADER) => {}
        Some(other) => {
            return Err(format!(
                "first column must be '{STEP_HEADER}', found '{other}'"
            ));
        }
        None => return Err("missing header row".to_string()),
    }

    let names: Vec<String> = fields.map(str::to_string).collect();
    let mut seen = HashSet::new();
    for name in &names {
        if name.is_empty() {
            return Err("empty configuration name in header".to_string());
        }
        if name == STEP_HEADER || !seen.insert(name.as_str()) {
            return Err(format!("duplicate column '{name}'"));
        }
    }

    let mut cells: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    let mut ended = vec![false; names.len()];
    let mut rows = 0usize;

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("row {row}: {e}"))?;
        let step_field = record.get(0).unwrap_or_default();
        let step: usize = step_field
            .trim()
            .parse()
            .map_err(|_| format!("row {row}: step index '{step_field}' is not a non-negative integer"))?;
        if step < row {
            return Err(format!("duplicate or out-of-order step index {step} at row {row}"));
        }
        if step > row {
            return Err(format!("step index jumps to {step} at row {row}; expected {row}"));
        }

        for (col, field) in record.iter().skip(1).enumerate() {
            if field.is_empty() {
                ended[col] = true;
                continue;
            }
            if ended[col] {
                return Err(format!(
                    "column '{}' has data at step {step} after a missing step",
                    names[col]
                ));
            }
            let value: f64 = field.trim().parse().map_err(|_| {
                format!("column '{}' step {step}: '{field}' is not a number", names[col])
            })?;
            if !value.is_finite() || value < 0.0 {
                return Err(format!(
                    "column '{}' step {step}: {value} is not a valid elapsed time",
                    names[col]
                ));
            }
            cells[col].push(value);
        }
        rows += 1;
    }

    let mut table = ResultsTable::with_rows(rows);
    for (name, column) in names.iter().zip(cells) {
        table.push_column(name, column);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::StepTiming;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ResultsStore {
        ResultsStore::new(dir.path().join("results.csv"), dir.path().join("plots"), 10)
    }

    fn sparse_table() -> ResultsTable {
        let mut table = ResultsTable::with_rows(4);
        for (step, ms) in [101.25, 99.5, 100.0].iter().enumerate() {
            table.record(&StepTiming::new("Baseline", step, *ms)).unwrap();
        }
        table.record(&StepTiming::new("BF16", 0, 48.12)).unwrap();
        table
    }

    #[test]
    fn test_encode_layout() {
        let bytes = encode(&sparse_table()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "step,Baseline,BF16\n0,101.25,48.12\n1,99.5,\n2,100,\n3,,\n"
        );
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let table = sparse_table();

        store.save(&table).unwrap();
        assert_eq!(store.load().unwrap(), table);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let table = store_in(&dir).load().unwrap();
        assert!(table.is_empty());
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_decode_accepts_quoted_names() {
        let table = decode(b"step,\"BF16, compiled\"\n0,12.5\n").unwrap();
        assert_eq!(table.cell("BF16, compiled", 0), Some(12.5));
    }

    #[test]
    fn test_decode_rejects_structural_violations() {
        let cases: &[&[u8]] = &[
            b"",
            b"index,Baseline\n0,1\n",
            b"step,Baseline,Baseline\n0,1,2\n",
            b"step,Baseline,\n0,1,\n",
            b"step,Baseline\n0,1\n0,2\n",
            b"step,Baseline\n0,1\n2,2\n",
            b"step,Baseline\n1,1\n",
            b"step,Baseline\n0,\n1,5\n",
            b"step,Baseline\n0,fast\n",
            b"step,Baseline\n0,-3\n",
            b"step,Baseline\n0,1,2\n",
            b"step,Baseline\nzero,1\n",
        ];
        for case in cases {
            assert!(
                decode(case).is_err(),
                "expected rejection of {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_load_reports_corrupt_store_with_path() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "step,TF32\n0,1\n0,1\n").unwrap();

        match store.load().unwrap_err() {
            BenchError::CorruptStore { path, reason } => {
                assert_eq!(path, store.path());
                assert!(reason.contains("duplicate"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reset_removes_artifacts_and_sizes_rows() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sparse_table()).unwrap();
        std::fs::create_dir_all(store.artifacts_dir()).unwrap();
        std::fs::write(store.artifacts_dir().join("speedup.svg"), "<svg/>").unwrap();

        let table = store.reset().unwrap();
        assert!(table.is_empty());
        assert_eq!(table.row_count(), 10);
        assert!(!store.artifacts_dir().exists());
        assert_eq!(store.load().unwrap(), table);
    }

    #[test]
    fn test_clear_keeps_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.artifacts_dir()).unwrap();
        std::fs::write(store.artifacts_dir().join("speedup.svg"), "<svg/>").unwrap();

        store.clear().unwrap();
        assert!(store.artifacts_dir().join("speedup.svg").exists());
    }

    #[test]
    fn test_archive_copies_results() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sparse_table()).unwrap();

        let dest = store.artifacts_dir().join("steps_10_results.csv");
        store.archive(&dest).unwrap();
        assert_eq!(
            std::fs::read(&dest).unwrap(),
            std::fs::read(store.path()).unwrap()
        );
    }
}
