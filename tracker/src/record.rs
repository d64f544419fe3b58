//! Persisted record tree: Test → Bank → Cycle → Reading → CellValue.
//!
//! A [`Test`] is the aggregate root. Everything below it is owned by value and
//! persisted in the same document, so a single load/save covers a whole test.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a test, derived from its cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Scheduled,
    InProgress,
    Completed,
}

impl TestStatus {
    pub fn label(self) -> &'static str {
        match self {
            TestStatus::Scheduled => "scheduled",
            TestStatus::InProgress => "in_progress",
            TestStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    #[serde(rename = "KPL")]
    Kpl,
    #[serde(rename = "KPM")]
    Kpm,
    #[serde(rename = "KPH")]
    Kph,
}

/// Direction of current during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Charge,
    #[default]
    Discharge,
}

impl CyclePhase {
    pub fn label(self) -> &'static str {
        match self {
            CyclePhase::Charge => "Charge",
            CyclePhase::Discharge => "Discharge",
        }
    }
}

/// Open-circuit or closed-circuit sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingKind {
    #[serde(rename = "OCV")]
    Ocv,
    #[serde(rename = "CCV")]
    Ccv,
}

impl ReadingKind {
    pub fn label(self) -> &'static str {
        match self {
            ReadingKind::Ocv => "OCV",
            ReadingKind::Ccv => "CCV",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Test {
    pub id: Uuid,
    pub job_number: String,
    pub customer_name: String,
    pub start_date: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub number_of_cycles: u32,
    pub status: TestStatus,
    pub created_at: DateTime<Utc>,
    pub banks: Vec<Bank>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Bank {
    pub id: Uuid,
    pub bank_number: u32,
    pub cell_type: CellType,
    pub cell_rate: f64,
    pub percentage_capacity: f64,
    pub discharge_current: f64,
    pub number_of_cells: u32,
    pub cycles: Vec<Cycle>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Cycle {
    pub id: Uuid,
    pub cycle_number: u32,
    pub phase: CyclePhase,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Whole minutes between `start_time` and `end_time`.
    pub duration: Option<i64>,
    pub readings: Vec<Reading>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub id: Uuid,
    /// 0 for the OCV reading, 1.. for CCV readings.
    pub reading_number: u32,
    pub kind: ReadingKind,
    pub timestamp: DateTime<Utc>,
    /// Minutes since the previous CCV reading.
    pub time_interval: Option<u32>,
    pub cell_values: Vec<CellValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CellValue {
    pub cell_number: u32,
    pub value: f64,
}

impl Test {
    pub fn cycles(&self) -> impl Iterator<Item = &Cycle> {
        self.banks.iter().flat_map(|bank| bank.cycles.iter())
    }

    pub fn bank(&self, bank_id: Uuid) -> Option<&Bank> {
        self.banks.iter().find(|bank| bank.id == bank_id)
    }

    /// Find a cycle and its owning bank.
    pub fn cycle(&self, cycle_id: Uuid) -> Option<(&Bank, &Cycle)> {
        self.banks.iter().find_map(|bank| {
            bank.cycles
                .iter()
                .find(|cycle| cycle.id == cycle_id)
                .map(|cycle| (bank, cycle))
        })
    }

    /// Index path `(bank, cycle)` of a cycle, for callers that need `&mut`.
    pub fn locate_cycle(&self, cycle_id: Uuid) -> Option<(usize, usize)> {
        self.banks.iter().enumerate().find_map(|(bank_idx, bank)| {
            bank.cycles
                .iter()
                .position(|cycle| cycle.id == cycle_id)
                .map(|cycle_idx| (bank_idx, cycle_idx))
        })
    }

    pub fn reading(&self, reading_id: Uuid) -> Option<&Reading> {
        self.cycles()
            .flat_map(|cycle| cycle.readings.iter())
            .find(|reading| reading.id == reading_id)
    }

    pub fn has_readings(&self) -> bool {
        self.cycles().any(|cycle| !cycle.readings.is_empty())
    }
}

impl Cycle {
    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn ocv(&self) -> Option<&Reading> {
        self.readings
            .iter()
            .find(|reading| reading.kind == ReadingKind::Ocv)
    }

    pub fn ccv_readings(&self) -> impl Iterator<Item = &Reading> {
        self.readings
            .iter()
            .filter(|reading| reading.kind == ReadingKind::Ccv)
    }

    /// Timestamp of the newest reading, if any.
    pub fn last_reading_time(&self) -> Option<DateTime<Utc>> {
        self.readings.iter().map(|reading| reading.timestamp).max()
    }
}
