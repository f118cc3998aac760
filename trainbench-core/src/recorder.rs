//! Step timing and recording.
//!
//! The recorder owns the working [`ResultsTable`] for a batch and persists it
//! after every recorded step, so a crash mid-run loses at most the step that
//! was in flight.

use crate::error::BenchError;
use crate::store::ResultsStore;
use crate::table::{ResultsTable, StepTiming};
use crate::unit::UnitError;
use std::future::Future;
use std::time::Instant;

/// Round to the 0.01 ms resolution timings are reported at.
pub fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Wall-clock timer for one step.
#[derive(Debug)]
pub struct StepTimer {
    started: Instant,
}

impl StepTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Stop the timer and return elapsed milliseconds at 0.01 ms resolution.
    pub fn stop(self) -> f64 {
        round_ms(self.started.elapsed().as_secs_f64() * 1000.0)
    }
}

pub struct Recorder {
    store: ResultsStore,
    table: ResultsTable,
}

impl Recorder {
    pub fn new(store: ResultsStore, table: ResultsTable) -> Self {
        Self { store, table }
    }

    pub fn table(&self) -> &ResultsTable {
        &self.table
    }

    pub fn into_table(self) -> ResultsTable {
        self.table
    }

    /// Drop cells a previous, longer run of `configuration` left past `steps`.
    ///
    /// Called once a re-run has recorded all of its steps; until then the
    /// earlier timings stay on disk and are overwritten one step at a time.
    pub fn finish_configuration(
        &mut self,
        configuration: &str,
        steps: usize,
    ) -> Result<(), BenchError> {
        if self.table.truncate_column(configuration, steps) {
            self.store.save(&self.table)?;
        }
        Ok(())
    }

    pub fn start_step(&self) -> StepTimer {
        StepTimer::start()
    }

    /// Stop `timer` and record the step it measured.
    pub fn stop_step(
        &mut self,
        timer: StepTimer,
        configuration: &str,
        step: usize,
    ) -> Result<StepTiming, BenchError> {
        let elapsed_ms = timer.stop();
        self.record(configuration, step, elapsed_ms)
    }

    /// Write one cell and persist the table.
    pub fn record(
        &mut self,
        configuration: &str,
        step: usize,
        elapsed_ms: f64,
    ) -> Result<StepTiming, BenchError> {
        let timing = StepTiming::new(configuration, step, elapsed_ms);
        self.table.record(&timing)?;
        self.store.save(&self.table)?;
        Ok(timing)
    }

    /// Time one unit step and record it.
    ///
    /// The timer stops whether or not the step succeeds. A failed step writes
    /// nothing and comes back as [`BenchError::StepExecution`].
    pub async fn time_step<F>(
        &mut self,
        configuration: &str,
        step: usize,
        fut: F,
    ) -> Result<StepTiming, BenchError>
    where
        F: Future<Output = Result<(), UnitError>>,
    {
        let timer = self.start_step();
        let outcome = fut.await;
        let elapsed_ms = timer.stop();
        match outcome {
            Ok(()) => self.record(configuration, step, elapsed_ms),
            Err(e) => Err(BenchError::step_execution(configuration, step, e.to_string())),
        }
    }
}
