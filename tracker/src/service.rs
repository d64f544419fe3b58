//! Orchestration of lifecycle operations against a [`TestStore`].
//!
//! Every mutating operation is load → pure transition → save. A failed
//! transition leaves the stored record untouched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::core::lifecycle::{self, build_test};
use crate::core::report::{TestStatusReport, status_report};
use crate::core::types::{NewReading, NewTest, TransitionSummary};
use crate::error::{RecordKind, TrackerError, TrackerResult};
use crate::io::config::TrackerConfig;
use crate::io::export::{ExportScope, render_csv};
use crate::io::store::TestStore;
use crate::record::{Bank, Cycle, Reading, ReadingKind, Test};

/// Result of `submit_reading`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingRecorded {
    pub reading: Reading,
    pub transition: TransitionSummary,
}

/// Result of `complete_cycle`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleCompleted {
    pub cycle: Cycle,
    pub transition: TransitionSummary,
}

/// Rendered CSV plus its suggested file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub file_name: String,
    pub contents: String,
}

pub struct TestLifecycle<S: TestStore> {
    store: S,
    config: TrackerConfig,
}

impl<S: TestStore> TestLifecycle<S> {
    pub fn new(store: S, config: TrackerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Create a scheduled test. Job numbers are unique.
    #[instrument(skip_all, fields(job_number = %input.job_number))]
    pub fn create_test(&mut self, input: &NewTest) -> TrackerResult<Test> {
        let test = build_test(input, Utc::now())?;
        if self.store.job_number_taken(&test.job_number)? {
            return Err(TrackerError::Conflict(format!(
                "job number '{}' already exists",
                test.job_number
            )));
        }
        self.store.insert(&test)?;
        info!(
            test_id = %test.id,
            banks = test.banks.len(),
            cycles = test.number_of_cycles,
            "test created"
        );
        Ok(test)
    }

    /// Record a reading on a cycle and persist the owning test.
    #[instrument(skip_all, fields(cycle_id = %cycle_id, kind = input.kind.label()))]
    pub fn submit_reading(
        &mut self,
        cycle_id: Uuid,
        input: &NewReading,
    ) -> TrackerResult<ReadingRecorded> {
        let mut test = self.test_owning_cycle(cycle_id)?;
        let transition = lifecycle::record_reading(&mut test, cycle_id, input, Utc::now())?;
        self.store.save(&test)?;

        let reading_id = transition
            .reading_id
            .ok_or_else(|| TrackerError::not_found(RecordKind::Reading, cycle_id))?;
        let reading = test
            .reading(reading_id)
            .cloned()
            .ok_or_else(|| TrackerError::not_found(RecordKind::Reading, reading_id))?;
        info!(
            test_id = %test.id,
            reading_id = %reading.id,
            reading_number = reading.reading_number,
            cycle_started = transition.cycle_started,
            status = transition.status.label(),
            "reading recorded"
        );
        Ok(ReadingRecorded {
            reading,
            transition,
        })
    }

    /// Close a cycle. `end_time` defaults to now.
    #[instrument(skip_all, fields(cycle_id = %cycle_id))]
    pub fn complete_cycle(
        &mut self,
        cycle_id: Uuid,
        end_time: Option<DateTime<Utc>>,
    ) -> TrackerResult<CycleCompleted> {
        let mut test = self.test_owning_cycle(cycle_id)?;
        let end_time = end_time.unwrap_or_else(Utc::now);
        let transition = lifecycle::complete_cycle(&mut test, cycle_id, end_time)?;
        self.store.save(&test)?;

        let (_, cycle) = test
            .cycle(cycle_id)
            .ok_or_else(|| TrackerError::not_found(RecordKind::Cycle, cycle_id))?;
        info!(
            test_id = %test.id,
            duration = ?cycle.duration,
            status = transition.status.label(),
            status_changed = transition.status_changed(),
            "cycle completed"
        );
        Ok(CycleCompleted {
            cycle: cycle.clone(),
            transition,
        })
    }

    pub fn get_test_status(&self, test_id: Uuid) -> TrackerResult<TestStatusReport> {
        Ok(status_report(&self.get_test(test_id)?))
    }

    pub fn get_test(&self, test_id: Uuid) -> TrackerResult<Test> {
        self.store
            .fetch(test_id)?
            .ok_or_else(|| TrackerError::not_found(RecordKind::Test, test_id))
    }

    /// Tests ordered by creation time. `limit` is clamped by config.
    pub fn list_tests(&self, skip: usize, limit: Option<usize>) -> TrackerResult<Vec<Test>> {
        let limit = self.config.page_limit(limit);
        let tests = self.store.list()?;
        debug!(total = tests.len(), skip, limit, "listing tests");
        Ok(tests.into_iter().skip(skip).take(limit).collect())
    }

    pub fn get_bank(&self, bank_id: Uuid) -> TrackerResult<Bank> {
        self.store
            .locate_bank(bank_id)?
            .and_then(|test| test.bank(bank_id).cloned())
            .ok_or_else(|| TrackerError::not_found(RecordKind::Bank, bank_id))
    }

    pub fn get_cycle(&self, cycle_id: Uuid) -> TrackerResult<Cycle> {
        let test = self.test_owning_cycle(cycle_id)?;
        test.cycle(cycle_id)
            .map(|(_, cycle)| cycle.clone())
            .ok_or_else(|| TrackerError::not_found(RecordKind::Cycle, cycle_id))
    }

    /// Readings of a cycle, OCV first.
    pub fn get_cycle_readings(&self, cycle_id: Uuid) -> TrackerResult<Vec<Reading>> {
        Ok(self.get_cycle(cycle_id)?.readings)
    }

    pub fn get_reading(&self, reading_id: Uuid) -> TrackerResult<Reading> {
        self.store
            .locate_reading(reading_id)?
            .and_then(|test| test.reading(reading_id).cloned())
            .ok_or_else(|| TrackerError::not_found(RecordKind::Reading, reading_id))
    }

    /// Highest-numbered reading of a cycle, optionally restricted to one kind.
    pub fn get_latest_reading(
        &self,
        cycle_id: Uuid,
        kind: Option<ReadingKind>,
    ) -> TrackerResult<Option<Reading>> {
        let cycle = self.get_cycle(cycle_id)?;
        Ok(cycle
            .readings
            .into_iter()
            .filter(|reading| kind.is_none_or(|kind| reading.kind == kind))
            .max_by_key(|reading| reading.reading_number))
    }

    /// Delete a test with all its banks, cycles and readings.
    #[instrument(skip_all, fields(test_id = %test_id))]
    pub fn delete_test(&mut self, test_id: Uuid) -> TrackerResult<()> {
        if !self.store.remove(test_id)? {
            return Err(TrackerError::not_found(RecordKind::Test, test_id));
        }
        info!("test deleted");
        Ok(())
    }

    /// Render a CSV export for a test, bank or cycle.
    pub fn export_csv(&self, scope: ExportScope) -> TrackerResult<CsvExport> {
        let test = match scope {
            ExportScope::Test(id) => self.get_test(id)?,
            ExportScope::Bank(id) => self
                .store
                .locate_bank(id)?
                .ok_or_else(|| TrackerError::not_found(RecordKind::Bank, id))?,
            ExportScope::Cycle(id) => self.test_owning_cycle(id)?,
        };
        let contents = render_csv(&test, scope, self.config.export_precision);
        debug!(test_id = %test.id, bytes = contents.len(), "rendered export");
        Ok(CsvExport {
            file_name: scope.file_name(),
            contents,
        })
    }

    fn test_owning_cycle(&self, cycle_id: Uuid) -> TrackerResult<Test> {
        self.store
            .locate_cycle(cycle_id)?
            .ok_or_else(|| TrackerError::not_found(RecordKind::Cycle, cycle_id))
    }
}
