//! Inputs and outputs of the lifecycle core.
//!
//! These types are the contract between the pure core and its callers (the
//! service facade, CLI, and HTTP layer). They carry no I/O handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::{CellType, ReadingKind, TestStatus};

/// Request to create a test with its banks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTest {
    pub job_number: String,
    pub customer_name: String,
    pub start_date: DateTime<Utc>,
    pub number_of_cycles: u32,
    pub banks: Vec<NewBank>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBank {
    pub bank_number: u32,
    pub cell_type: CellType,
    pub cell_rate: f64,
    pub percentage_capacity: f64,
    pub number_of_cells: u32,
}

/// One OCV or CCV sample across every cell of a bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub kind: ReadingKind,
    pub cell_values: Vec<f64>,
    /// Defaults to the time the reading is recorded.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Minutes since the previous CCV reading. Ignored for OCV.
    #[serde(default)]
    pub time_interval: Option<u32>,
}

/// Summary of a status-affecting transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionSummary {
    pub test_id: Uuid,
    pub cycle_id: Uuid,
    /// Reading created by the transition, if any.
    pub reading_id: Option<Uuid>,
    /// True when this transition set the cycle's `start_time`.
    pub cycle_started: bool,
    pub previous_status: TestStatus,
    pub status: TestStatus,
}

impl TransitionSummary {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.status
    }
}

/// Observable state of a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// No reading yet; `start_time` unset.
    Pending,
    /// Started but not completed.
    Running,
    Completed,
}
