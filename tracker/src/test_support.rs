//! Test-only helpers for constructing tests, readings and stores.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use crate::core::lifecycle::build_test;
use crate::core::types::{NewBank, NewReading, NewTest};
use crate::io::init::{InitOptions, TrackerPaths, init_tracker};
use crate::io::store::{JsonStore, TestStore};
use crate::record::{CellType, CellValue, Reading, ReadingKind, Test};

/// 2024-03-01T08:00:00Z.
const BASE_TIMESTAMP: i64 = 1_709_280_000;

/// Deterministic timestamp `minutes` after a fixed base.
pub fn at(minutes: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_TIMESTAMP, 0).expect("base timestamp") + Duration::minutes(minutes)
}

/// KPL bank at 100 Ah, 80% capacity.
pub fn new_bank(bank_number: u32, number_of_cells: u32) -> NewBank {
    NewBank {
        bank_number,
        cell_type: CellType::Kpl,
        cell_rate: 100.0,
        percentage_capacity: 80.0,
        number_of_cells,
    }
}

pub fn new_test(job_number: &str, number_of_cycles: u32, banks: Vec<NewBank>) -> NewTest {
    NewTest {
        job_number: job_number.to_string(),
        customer_name: "Northern Rail Depot".to_string(),
        start_date: at(0),
        number_of_cycles,
        banks,
    }
}

/// OCV request with the same voltage on every cell.
pub fn ocv(cells: u32, value: f64, timestamp: Option<DateTime<Utc>>) -> NewReading {
    NewReading {
        kind: ReadingKind::Ocv,
        cell_values: vec![value; cells as usize],
        timestamp,
        time_interval: None,
    }
}

/// CCV request with the same voltage on every cell, timestamped on record.
pub fn ccv(cells: u32, value: f64, time_interval: Option<u32>) -> NewReading {
    NewReading {
        kind: ReadingKind::Ccv,
        cell_values: vec![value; cells as usize],
        timestamp: None,
        time_interval,
    }
}

/// Scheduled test with `banks` banks numbered from 1.
pub fn scheduled_test(banks: u32, cycles: u32, cells: u32) -> Test {
    let banks = (1..=banks).map(|number| new_bank(number, cells)).collect();
    build_test(&new_test("JOB-100", cycles, banks), at(0)).expect("build scheduled test")
}

/// Stored reading, bypassing lifecycle checks (for invariant tests).
pub fn reading(
    kind: ReadingKind,
    reading_number: u32,
    cells: u32,
    value: f64,
    timestamp: DateTime<Utc>,
) -> Reading {
    Reading {
        id: Uuid::new_v4(),
        reading_number,
        kind,
        timestamp,
        time_interval: match kind {
            ReadingKind::Ocv => None,
            ReadingKind::Ccv => Some(30),
        },
        cell_values: (1..=cells)
            .map(|cell_number| CellValue { cell_number, value })
            .collect(),
    }
}

/// In-memory [`TestStore`] keyed by test id.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tests: BTreeMap<Uuid, Test>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TestStore for MemoryStore {
    fn insert(&mut self, test: &Test) -> Result<()> {
        if self.tests.contains_key(&test.id) {
            return Err(anyhow!("test {} already exists", test.id));
        }
        self.tests.insert(test.id, test.clone());
        Ok(())
    }

    fn fetch(&self, test_id: Uuid) -> Result<Option<Test>> {
        Ok(self.tests.get(&test_id).cloned())
    }

    fn save(&mut self, test: &Test) -> Result<()> {
        match self.tests.get_mut(&test.id) {
            Some(slot) => {
                *slot = test.clone();
                Ok(())
            }
            None => Err(anyhow!("test {} does not exist", test.id)),
        }
    }

    fn remove(&mut self, test_id: Uuid) -> Result<bool> {
        Ok(self.tests.remove(&test_id).is_some())
    }

    fn list(&self) -> Result<Vec<Test>> {
        let mut tests: Vec<Test> = self.tests.values().cloned().collect();
        tests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tests)
    }
}

/// Initialized `.tracker/` project in a temporary directory.
pub struct TrackerProject {
    pub temp: TempDir,
    pub paths: TrackerPaths,
}

impl TrackerProject {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_tracker(temp.path(), &InitOptions { force: false }).expect("init");
        Self { temp, paths }
    }

    pub fn store(&self) -> JsonStore {
        JsonStore::new(&self.paths.tests_dir)
    }
}

impl Default for TrackerProject {
    fn default() -> Self {
        Self::new()
    }
}
