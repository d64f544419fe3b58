//! Semantic invariants of a test record not expressible via JSON Schema.

use std::collections::HashSet;

use uuid::Uuid;

use crate::core::lifecycle::{derive_status, discharge_current};
use crate::core::validation::{MAX_BANKS, is_valid_cell_voltage};
use crate::record::{Bank, Cycle, ReadingKind, Test, TestStatus};

/// Check semantic invariants of a test record:
/// - status matches the status derived from its cycles
/// - 1..=2 banks with unique bank numbers
/// - each bank has cycles `1..=number_of_cycles` in order
/// - `start_time` set iff the cycle has readings; `end_time` iff `duration`
/// - readings numbered OCV 0 then CCV 1.., cell values complete and in range
/// - no duplicate ids
pub fn validate_invariants(test: &Test) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    note_id(test.id, "test", &mut seen, &mut errors);

    let derived = derive_status(test);
    if test.status != derived {
        errors.push(format!(
            "status is {} but cycles imply {}",
            test.status.label(),
            derived.label()
        ));
    }
    if test.status == TestStatus::Scheduled && test.has_readings() {
        errors.push("scheduled test has readings".to_string());
    }

    if test.banks.is_empty() || test.banks.len() > MAX_BANKS {
        errors.push(format!(
            "test must have 1..={} banks (has {})",
            MAX_BANKS,
            test.banks.len()
        ));
    }

    let mut bank_numbers = HashSet::new();
    for bank in &test.banks {
        let path = format!("bank {}", bank.bank_number);
        if !bank_numbers.insert(bank.bank_number) {
            errors.push(format!("duplicate bank_number {}", bank.bank_number));
        }
        note_id(bank.id, &path, &mut seen, &mut errors);
        validate_bank(bank, test.number_of_cycles, &path, &mut seen, &mut errors);
    }

    errors
}

fn validate_bank(
    bank: &Bank,
    number_of_cycles: u32,
    path: &str,
    seen: &mut HashSet<Uuid>,
    errors: &mut Vec<String>,
) {
    for (field, value) in [
        ("cell_rate", bank.cell_rate),
        ("percentage_capacity", bank.percentage_capacity),
        ("discharge_current", bank.discharge_current),
    ] {
        if !value.is_finite() {
            errors.push(format!("{}: {} must be finite (got {})", path, field, value));
        }
    }

    let expected = discharge_current(bank.cell_rate, bank.percentage_capacity);
    let drift = (bank.discharge_current - expected).abs();
    if drift.is_nan() || drift > 1e-9 {
        errors.push(format!(
            "{}: discharge_current {} does not match rate x capacity ({})",
            path, bank.discharge_current, expected
        ));
    }

    let numbers: Vec<u32> = bank.cycles.iter().map(|c| c.cycle_number).collect();
    let expected_numbers: Vec<u32> = (1..=number_of_cycles).collect();
    if numbers != expected_numbers {
        errors.push(format!(
            "{}: cycles must be numbered 1..={} in order (got {:?})",
            path, number_of_cycles, numbers
        ));
    }

    for cycle in &bank.cycles {
        let cycle_path = format!("{}/cycle {}", path, cycle.cycle_number);
        note_id(cycle.id, &cycle_path, seen, errors);
        validate_cycle(cycle, bank.number_of_cells, &cycle_path, seen, errors);
    }
}

fn validate_cycle(
    cycle: &Cycle,
    number_of_cells: u32,
    path: &str,
    seen: &mut HashSet<Uuid>,
    errors: &mut Vec<String>,
) {
    match (cycle.start_time, cycle.readings.is_empty()) {
        (None, false) => errors.push(format!("{}: has readings but no start_time", path)),
        (Some(_), true) => errors.push(format!("{}: start_time set before any reading", path)),
        _ => {}
    }

    match (cycle.end_time, cycle.duration) {
        (Some(end), Some(_)) => {
            if let Some(start) = cycle.start_time
                && end < start
            {
                errors.push(format!("{}: end_time precedes start_time", path));
            }
            if cycle.start_time.is_none() {
                errors.push(format!("{}: completed without start_time", path));
            }
        }
        (None, None) => {}
        _ => errors.push(format!("{}: end_time and duration must be set together", path)),
    }

    let mut expected_ccv = 1;
    for (idx, reading) in cycle.readings.iter().enumerate() {
        let reading_path = format!("{}/reading {}", path, reading.reading_number);
        note_id(reading.id, &reading_path, seen, errors);

        match reading.kind {
            ReadingKind::Ocv => {
                if idx != 0 || reading.reading_number != 0 {
                    errors.push(format!(
                        "{}: OCV must be the first reading, numbered 0",
                        reading_path
                    ));
                }
            }
            ReadingKind::Ccv => {
                if reading.reading_number != expected_ccv {
                    errors.push(format!(
                        "{}: expected CCV reading number {}",
                        reading_path, expected_ccv
                    ));
                }
                expected_ccv = reading.reading_number + 1;
            }
        }

        let cell_numbers: Vec<u32> = reading.cell_values.iter().map(|c| c.cell_number).collect();
        if cell_numbers != (1..=number_of_cells).collect::<Vec<u32>>() {
            errors.push(format!(
                "{}: expected cells 1..={}",
                reading_path, number_of_cells
            ));
        }
        for cell in &reading.cell_values {
            if !is_valid_cell_voltage(cell.value) {
                errors.push(format!(
                    "{}: cell {} voltage {} out of range",
                    reading_path, cell.cell_number, cell.value
                ));
            }
        }
    }

    if cycle.readings.iter().any(|r| r.kind == ReadingKind::Ccv) && cycle.ocv().is_none() {
        errors.push(format!("{}: CCV readings without an OCV reading", path));
    }
}

fn note_id(id: Uuid, path: &str, seen: &mut HashSet<Uuid>, errors: &mut Vec<String>) {
    if !seen.insert(id) {
        errors.push(format!("duplicate id '{}' at {}", id, path));
    }
}
