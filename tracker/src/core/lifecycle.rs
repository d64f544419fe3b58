//! Test lifecycle transitions.
//!
//! A test's status is never set directly. It is recomputed from its cycles
//! after every transition that touches them:
//!
//! - `completed` iff every cycle of every bank has an `end_time`;
//! - `in_progress` once any reading exists;
//! - `scheduled` otherwise.
//!
//! Cycles cannot be reopened and readings cannot be removed, so the derived
//! status only ever moves forward.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::types::{NewReading, NewTest, TransitionSummary};
use crate::core::validation::{validate_cell_values, validate_new_test, validate_time_interval};
use crate::error::{RecordKind, TrackerError, TrackerResult};
use crate::record::{
    Bank, CellValue, Cycle, CyclePhase, Reading, ReadingKind, Test, TestStatus,
};

/// Build a new scheduled test from a validated request.
///
/// Every bank receives `number_of_cycles` unstarted cycles.
pub fn build_test(input: &NewTest, now: DateTime<Utc>) -> TrackerResult<Test> {
    TrackerError::check(validate_new_test(input))?;

    let mut banks: Vec<Bank> = input
        .banks
        .iter()
        .map(|bank| Bank {
            id: Uuid::new_v4(),
            bank_number: bank.bank_number,
            cell_type: bank.cell_type,
            cell_rate: bank.cell_rate,
            percentage_capacity: bank.percentage_capacity,
            discharge_current: discharge_current(bank.cell_rate, bank.percentage_capacity),
            number_of_cells: bank.number_of_cells,
            cycles: (1..=input.number_of_cycles)
                .map(|cycle_number| Cycle {
                    id: Uuid::new_v4(),
                    cycle_number,
                    phase: CyclePhase::default(),
                    start_time: None,
                    end_time: None,
                    duration: None,
                    readings: Vec::new(),
                })
                .collect(),
        })
        .collect();
    banks.sort_by_key(|bank| bank.bank_number);

    Ok(Test {
        id: Uuid::new_v4(),
        job_number: input.job_number.trim().to_string(),
        customer_name: input.customer_name.trim().to_string(),
        start_date: input.start_date,
        start_time: input.start_date,
        number_of_cycles: input.number_of_cycles,
        status: TestStatus::Scheduled,
        created_at: now,
        banks,
    })
}

/// Discharge current for a bank: `cell_rate × percentage_capacity / 100`.
pub fn discharge_current(cell_rate: f64, percentage_capacity: f64) -> f64 {
    cell_rate * percentage_capacity / 100.0
}

/// Record one OCV or CCV reading on a cycle.
///
/// The first reading of a cycle sets its `start_time` to the reading's
/// timestamp. OCV comes first (reading 0, at most one); CCV readings follow,
/// numbered from 1.
pub fn record_reading(
    test: &mut Test,
    cycle_id: Uuid,
    input: &NewReading,
    now: DateTime<Utc>,
) -> TrackerResult<TransitionSummary> {
    let (bank_idx, cycle_idx) = test
        .locate_cycle(cycle_id)
        .ok_or_else(|| TrackerError::not_found(RecordKind::Cycle, cycle_id))?;
    let bank_number = test.banks[bank_idx].bank_number;
    let number_of_cells = test.banks[bank_idx].number_of_cells;
    let cycle = &mut test.banks[bank_idx].cycles[cycle_idx];

    if cycle.is_completed() {
        return Err(TrackerError::Conflict(format!(
            "bank {} cycle {} is already completed",
            bank_number, cycle.cycle_number
        )));
    }

    let timestamp = input.timestamp.unwrap_or(now);
    let mut errors = validate_cell_values(&input.cell_values, number_of_cells);
    if input.kind == ReadingKind::Ccv {
        errors.extend(validate_time_interval(input.time_interval));
    }
    if let Some(previous) = cycle.last_reading_time()
        && timestamp < previous
    {
        errors.push(format!(
            "reading timestamp {} precedes previous reading at {}",
            timestamp.to_rfc3339(),
            previous.to_rfc3339()
        ));
    } else if let Some(start) = cycle.start_time
        && timestamp < start
    {
        errors.push(format!(
            "reading timestamp {} precedes cycle start {}",
            timestamp.to_rfc3339(),
            start.to_rfc3339()
        ));
    }
    TrackerError::check(errors)?;

    let reading_number = match input.kind {
        ReadingKind::Ocv => {
            if !cycle.readings.is_empty() {
                return Err(TrackerError::Conflict(format!(
                    "bank {} cycle {} already has an OCV reading",
                    bank_number, cycle.cycle_number
                )));
            }
            0
        }
        ReadingKind::Ccv => {
            if cycle.ocv().is_none() {
                return Err(TrackerError::Conflict(format!(
                    "bank {} cycle {} needs an OCV reading before CCV readings",
                    bank_number, cycle.cycle_number
                )));
            }
            cycle.ccv_readings().count() as u32 + 1
        }
    };

    let cycle_started = cycle.start_time.is_none();
    if cycle_started {
        cycle.start_time = Some(timestamp);
    }

    let reading = Reading {
        id: Uuid::new_v4(),
        reading_number,
        kind: input.kind,
        timestamp,
        time_interval: match input.kind {
            ReadingKind::Ocv => None,
            ReadingKind::Ccv => input.time_interval,
        },
        cell_values: input
            .cell_values
            .iter()
            .enumerate()
            .map(|(idx, value)| CellValue {
                cell_number: idx as u32 + 1,
                value: *value,
            })
            .collect(),
    };
    let reading_id = reading.id;
    cycle.readings.push(reading);

    let previous_status = test.status;
    let status = check_completion(test);

    Ok(TransitionSummary {
        test_id: test.id,
        cycle_id,
        reading_id: Some(reading_id),
        cycle_started,
        previous_status,
        status,
    })
}

/// Close a cycle at `end_time` and recompute the test status.
///
/// `duration` is the elapsed time since `start_time` in whole minutes,
/// truncated.
pub fn complete_cycle(
    test: &mut Test,
    cycle_id: Uuid,
    end_time: DateTime<Utc>,
) -> TrackerResult<TransitionSummary> {
    let (bank_idx, cycle_idx) = test
        .locate_cycle(cycle_id)
        .ok_or_else(|| TrackerError::not_found(RecordKind::Cycle, cycle_id))?;
    let bank_number = test.banks[bank_idx].bank_number;
    let cycle = &mut test.banks[bank_idx].cycles[cycle_idx];

    if cycle.is_completed() {
        return Err(TrackerError::Conflict(format!(
            "bank {} cycle {} is already completed",
            bank_number, cycle.cycle_number
        )));
    }
    let start_time = cycle.start_time.ok_or_else(|| {
        TrackerError::Conflict(format!(
            "bank {} cycle {} has not started (no readings)",
            bank_number, cycle.cycle_number
        ))
    })?;
    if end_time < start_time {
        return Err(TrackerError::Invalid(vec![format!(
            "end_time {} precedes cycle start {}",
            end_time.to_rfc3339(),
            start_time.to_rfc3339()
        )]));
    }
    if let Some(last) = cycle.last_reading_time()
        && end_time < last
    {
        return Err(TrackerError::Invalid(vec![format!(
            "end_time {} precedes last reading at {}",
            end_time.to_rfc3339(),
            last.to_rfc3339()
        )]));
    }

    cycle.end_time = Some(end_time);
    cycle.duration = Some((end_time - start_time).num_minutes());

    let previous_status = test.status;
    let status = check_completion(test);

    Ok(TransitionSummary {
        test_id: test.id,
        cycle_id,
        reading_id: None,
        cycle_started: false,
        previous_status,
        status,
    })
}

/// Recompute and store the test's status. Returns the new status.
pub fn check_completion(test: &mut Test) -> TestStatus {
    test.status = derive_status(test);
    test.status
}

/// Status implied by the test's cycles and readings.
pub fn derive_status(test: &Test) -> TestStatus {
    let mut cycles = test.cycles().peekable();
    if cycles.peek().is_none() {
        return TestStatus::Scheduled;
    }
    if cycles.all(Cycle::is_completed) {
        TestStatus::Completed
    } else if test.has_readings() {
        TestStatus::InProgress
    } else {
        TestStatus::Scheduled
    }
}
