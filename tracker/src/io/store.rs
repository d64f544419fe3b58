//! Test record persistence.
//!
//! The [`TestStore`] trait is the CRUD seam between the lifecycle service and
//! storage. [`JsonStore`] keeps one JSON document per test under
//! `.tracker/tests/`; tests use an in-memory store from `test_support`.
//!
//! Banks, cycles and readings live inside their test's document, so nested
//! lookups first locate the owning test.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::invariants::validate_invariants;
use crate::io::atomic::write_atomic;
use crate::record::Test;

/// JSON Schema every stored test document must satisfy.
pub const TEST_RECORD_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/test_record/v1.schema.json"
));

/// Abstraction over test record storage.
pub trait TestStore {
    /// Persist a new test. Fails if a test with the same id exists.
    fn insert(&mut self, test: &Test) -> Result<()>;

    fn fetch(&self, test_id: Uuid) -> Result<Option<Test>>;

    /// Overwrite an existing test.
    fn save(&mut self, test: &Test) -> Result<()>;

    /// Delete a test and everything it owns. Returns false if it was absent.
    fn remove(&mut self, test_id: Uuid) -> Result<bool>;

    /// All tests ordered by `(created_at, id)`.
    fn list(&self) -> Result<Vec<Test>>;

    fn locate_bank(&self, bank_id: Uuid) -> Result<Option<Test>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|test| test.bank(bank_id).is_some()))
    }

    fn locate_cycle(&self, cycle_id: Uuid) -> Result<Option<Test>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|test| test.cycle(cycle_id).is_some()))
    }

    fn locate_reading(&self, reading_id: Uuid) -> Result<Option<Test>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|test| test.reading(reading_id).is_some()))
    }

    fn job_number_taken(&self, job_number: &str) -> Result<bool> {
        Ok(self
            .list()?
            .iter()
            .any(|test| test.job_number == job_number))
    }
}

/// Directory of `<test_id>.json` documents.
#[derive(Debug, Clone)]
pub struct JsonStore {
    tests_dir: PathBuf,
}

impl JsonStore {
    pub fn new(tests_dir: impl Into<PathBuf>) -> Self {
        Self {
            tests_dir: tests_dir.into(),
        }
    }

    pub fn tests_dir(&self) -> &Path {
        &self.tests_dir
    }

    pub fn test_path(&self, test_id: Uuid) -> PathBuf {
        self.tests_dir.join(format!("{test_id}.json"))
    }
}

impl TestStore for JsonStore {
    fn insert(&mut self, test: &Test) -> Result<()> {
        let path = self.test_path(test.id);
        if path.exists() {
            return Err(anyhow!("test {} already exists", test.id));
        }
        write_test(&path, test)
    }

    fn fetch(&self, test_id: Uuid) -> Result<Option<Test>> {
        let path = self.test_path(test_id);
        if !path.exists() {
            return Ok(None);
        }
        load_test(&path).map(Some)
    }

    fn save(&mut self, test: &Test) -> Result<()> {
        let path = self.test_path(test.id);
        if !path.exists() {
            return Err(anyhow!("test {} does not exist", test.id));
        }
        write_test(&path, test)
    }

    fn remove(&mut self, test_id: Uuid) -> Result<bool> {
        let path = self.test_path(test_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("remove test {}", path.display()))?;
        debug!(test_id = %test_id, "removed test document");
        Ok(true)
    }

    fn list(&self) -> Result<Vec<Test>> {
        if !self.tests_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.tests_dir)
            .with_context(|| format!("read directory {}", self.tests_dir.display()))?;

        let mut tests = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("read entry in {}", self.tests_dir.display()))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match load_test(&path) {
                Ok(test) => tests.push(test),
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %format!("{err:#}"),
                        "skipping unreadable test document"
                    );
                }
            }
        }
        tests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tests)
    }
}

/// Load and validate a test document (schema + invariants).
pub fn load_test(path: &Path) -> Result<Test> {
    debug!(path = %path.display(), "loading test");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read test {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse test {}", path.display()))?;
    validate_schema(&value).with_context(|| format!("validate test {}", path.display()))?;
    let test: Test = serde_json::from_value(value)
        .with_context(|| format!("deserialize test {}", path.display()))?;
    validate_record_invariants(&test)
        .with_context(|| format!("validate test {}", path.display()))?;
    Ok(test)
}

/// Atomically write a test document (temp file + rename).
pub fn write_test(path: &Path, test: &Test) -> Result<()> {
    debug!(path = %path.display(), test_id = %test.id, status = test.status.label(), "writing test");
    validate_record_invariants(test)?;
    let mut buf = serde_json::to_string_pretty(test)?;
    buf.push('\n');
    write_atomic(path, &buf).with_context(|| format!("write test {}", path.display()))
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TEST_RECORD_SCHEMA).context("parse test schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "test schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn validate_record_invariants(test: &Test) -> Result<()> {
    let errors = validate_invariants(test);
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!("test invariants failed: {}", errors.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lifecycle::record_reading;
    use crate::test_support::{at, ocv, scheduled_test};

    fn store() -> (tempfile::TempDir, JsonStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(temp.path().join("tests"));
        (temp, store)
    }

    /// Verifies insert → fetch preserves the record, including readings.
    #[test]
    fn insert_then_fetch_round_trips() {
        let (_temp, mut store) = store();
        let mut test = scheduled_test(2, 2, 10);
        let cycle_id = test.banks[1].cycles[0].id;
        record_reading(&mut test, cycle_id, &ocv(10, 3.72, Some(at(3))), at(3)).expect("ocv");

        store.insert(&test).expect("insert");
        let loaded = store.fetch(test.id).expect("fetch").expect("present");
        assert_eq!(loaded, test);
    }

    #[test]
    fn insert_refuses_existing_and_save_refuses_missing() {
        let (_temp, mut store) = store();
        let test = scheduled_test(1, 1, 10);
        assert!(store.save(&test).is_err());
        store.insert(&test).expect("insert");
        assert!(store.insert(&test).is_err());
        store.save(&test).expect("save");
    }

    #[test]
    fn fetch_missing_is_none() {
        let (_temp, store) = store();
        assert!(store.fetch(Uuid::new_v4()).expect("fetch").is_none());
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn list_orders_by_created_at() {
        let (_temp, mut store) = store();
        let mut later = scheduled_test(1, 1, 10);
        later.created_at = at(50);
        let mut earlier = scheduled_test(1, 1, 10);
        earlier.created_at = at(10);
        store.insert(&later).expect("insert");
        store.insert(&earlier).expect("insert");

        let ids: Vec<Uuid> = store.list().expect("list").iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![earlier.id, later.id]);
    }

    #[test]
    fn locate_nested_records() {
        let (_temp, mut store) = store();
        let mut test = scheduled_test(1, 2, 10);
        let cycle_id = test.banks[0].cycles[1].id;
        let summary =
            record_reading(&mut test, cycle_id, &ocv(10, 3.7, None), at(0)).expect("ocv");
        store.insert(&test).expect("insert");

        let bank_id = test.banks[0].id;
        let reading_id = summary.reading_id.expect("reading id");
        assert_eq!(store.locate_bank(bank_id).expect("bank").map(|t| t.id), Some(test.id));
        assert_eq!(store.locate_cycle(cycle_id).expect("cycle").map(|t| t.id), Some(test.id));
        assert_eq!(
            store.locate_reading(reading_id).expect("reading").map(|t| t.id),
            Some(test.id)
        );
        assert!(store.job_number_taken(&test.job_number).expect("job"));
        assert!(!store.job_number_taken("OTHER").expect("job"));
    }

    #[test]
    fn remove_deletes_document() {
        let (_temp, mut store) = store();
        let test = scheduled_test(1, 1, 10);
        store.insert(&test).expect("insert");
        assert!(store.remove(test.id).expect("remove"));
        assert!(!store.test_path(test.id).exists());
        assert!(!store.remove(test.id).expect("remove again"));
    }

    /// Documents edited by hand into an inconsistent state are rejected on load.
    #[test]
    fn load_rejects_invariant_violations() {
        let (_temp, mut store) = store();
        let test = scheduled_test(1, 1, 10);
        store.insert(&test).expect("insert");

        let path = store.test_path(test.id);
        let contents = fs::read_to_string(&path).expect("read");
        fs::write(&path, contents.replace("\"scheduled\"", "\"completed\"")).expect("write");

        let err = store.fetch(test.id).expect_err("invalid");
        assert!(format!("{err:#}").contains("test invariants failed"));
    }

    #[test]
    fn load_rejects_schema_violations() {
        let (_temp, mut store) = store();
        let test = scheduled_test(1, 1, 10);
        store.insert(&test).expect("insert");

        let path = store.test_path(test.id);
        let contents = fs::read_to_string(&path).expect("read");
        fs::write(&path, contents.replace("\"KPL\"", "\"XYZ\"")).expect("write");

        let err = store.fetch(test.id).expect_err("invalid");
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    /// One damaged document must not hide the healthy ones from scans.
    #[test]
    fn list_skips_unreadable_documents() {
        let (_temp, mut store) = store();
        let healthy = scheduled_test(1, 1, 10);
        let damaged = scheduled_test(1, 1, 10);
        store.insert(&healthy).expect("insert healthy");
        store.insert(&damaged).expect("insert damaged");

        let path = store.test_path(damaged.id);
        let contents = fs::read_to_string(&path).expect("read");
        let tampered = contents.replace("\"discharge_current\": 80.0", "\"discharge_current\": null");
        assert_ne!(tampered, contents);
        fs::write(&path, tampered).expect("write");

        let ids: Vec<Uuid> = store.list().expect("list").iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![healthy.id]);
        let cycle_id = healthy.banks[0].cycles[0].id;
        assert_eq!(
            store.locate_cycle(cycle_id).expect("locate").map(|t| t.id),
            Some(healthy.id)
        );
        assert!(!store.job_number_taken("JOB-OTHER").expect("job"));

        let err = store.fetch(damaged.id).expect_err("damaged");
        assert!(format!("{err:#}").contains("schema validation failed"));
    }
}
