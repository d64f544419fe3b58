//! Input validation for test creation and reading submission.
//!
//! Validators return every violation as a stable message (empty on success)
//! so callers can report all problems in one response.

use std::collections::HashSet;

use crate::core::lifecycle::discharge_current;
use crate::core::types::{NewBank, NewTest};

/// Lowest accepted cell voltage, inclusive.
pub const MIN_CELL_VOLTAGE: f64 = 2.0;
/// Highest accepted cell voltage, inclusive.
pub const MAX_CELL_VOLTAGE: f64 = 5.0;

pub const MAX_CYCLES: u32 = 5;
pub const MAX_BANKS: usize = 2;
pub const MIN_CELLS: u32 = 10;
pub const MAX_CELLS: u32 = 200;
pub const MAX_TIME_INTERVAL_MINUTES: u32 = 120;

/// True if `value` is a finite voltage within the accepted range.
pub fn is_valid_cell_voltage(value: f64) -> bool {
    value.is_finite() && (MIN_CELL_VOLTAGE..=MAX_CELL_VOLTAGE).contains(&value)
}

/// Validate a test creation request.
pub fn validate_new_test(test: &NewTest) -> Vec<String> {
    let mut errors = Vec::new();

    if test.job_number.trim().is_empty() {
        errors.push("job_number must not be blank".to_string());
    }
    if test.customer_name.trim().is_empty() {
        errors.push("customer_name must not be blank".to_string());
    }
    if !(1..=MAX_CYCLES).contains(&test.number_of_cycles) {
        errors.push(format!(
            "number_of_cycles must be between 1 and {} (got {})",
            MAX_CYCLES, test.number_of_cycles
        ));
    }

    if test.banks.is_empty() || test.banks.len() > MAX_BANKS {
        errors.push(format!(
            "a test needs between 1 and {} banks (got {})",
            MAX_BANKS,
            test.banks.len()
        ));
    }

    let mut seen = HashSet::new();
    for bank in &test.banks {
        if !seen.insert(bank.bank_number) {
            errors.push(format!("duplicate bank_number {}", bank.bank_number));
        }
        validate_bank(bank, &mut errors);
    }

    errors
}

fn validate_bank(bank: &NewBank, errors: &mut Vec<String>) {
    let label = format!("bank {}", bank.bank_number);

    if !(1..=MAX_BANKS as u32).contains(&bank.bank_number) {
        errors.push(format!(
            "{}: bank_number must be between 1 and {}",
            label, MAX_BANKS
        ));
    }
    if !(bank.cell_rate.is_finite() && bank.cell_rate > 0.0) {
        errors.push(format!(
            "{}: cell_rate must be > 0 (got {})",
            label, bank.cell_rate
        ));
    }
    if !(bank.percentage_capacity.is_finite()
        && bank.percentage_capacity > 0.0
        && bank.percentage_capacity <= 100.0)
    {
        errors.push(format!(
            "{}: percentage_capacity must be in (0, 100] (got {})",
            label, bank.percentage_capacity
        ));
    }
    let current = discharge_current(bank.cell_rate, bank.percentage_capacity);
    if bank.cell_rate.is_finite() && !current.is_finite() {
        errors.push(format!(
            "{}: discharge_current overflows (cell_rate {} x percentage_capacity {})",
            label, bank.cell_rate, bank.percentage_capacity
        ));
    }
    if !(MIN_CELLS..=MAX_CELLS).contains(&bank.number_of_cells) {
        errors.push(format!(
            "{}: number_of_cells must be between {} and {} (got {})",
            label, MIN_CELLS, MAX_CELLS, bank.number_of_cells
        ));
    }
}

/// Validate one reading's cell values against the bank's cell count.
///
/// Cell numbers in messages are 1-based.
pub fn validate_cell_values(values: &[f64], expected_cells: u32) -> Vec<String> {
    let mut errors = Vec::new();

    if values.len() != expected_cells as usize {
        errors.push(format!(
            "expected {} cell values, got {}",
            expected_cells,
            values.len()
        ));
    }

    for (idx, value) in values.iter().enumerate() {
        if !is_valid_cell_voltage(*value) {
            errors.push(format!(
                "cell {}: voltage {} outside {:.1}-{:.1} V",
                idx + 1,
                value,
                MIN_CELL_VOLTAGE,
                MAX_CELL_VOLTAGE
            ));
        }
    }

    errors
}

/// Validate the optional CCV interval in minutes.
pub fn validate_time_interval(interval: Option<u32>) -> Vec<String> {
    match interval {
        Some(minutes) if !(1..=MAX_TIME_INTERVAL_MINUTES).contains(&minutes) => vec![format!(
            "time_interval must be between 1 and {} minutes (got {})",
            MAX_TIME_INTERVAL_MINUTES, minutes
        )],
        _ => Vec::new(),
    }
}
