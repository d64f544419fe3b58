//! CSV export of recorded readings.
//!
//! One row per (bank, cycle, cell). CCV columns are the union of CCV reading
//! numbers seen in the exported scope; the header time comes from the first
//! reading with that number.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::io::atomic::write_atomic;
use crate::record::{Bank, Cycle, Reading, Test};

const FIXED_COLUMNS: [&str; 5] = ["Bank", "Cycle", "Phase", "Cell No.", "OCV"];
const MISSING: &str = "-";

/// Which part of a test to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    Test(Uuid),
    Bank(Uuid),
    Cycle(Uuid),
}

impl ExportScope {
    /// Attachment name, e.g. `bank_<id>_export.csv`.
    pub fn file_name(&self) -> String {
        match self {
            ExportScope::Test(id) => format!("test_{id}_export.csv"),
            ExportScope::Bank(id) => format!("bank_{id}_export.csv"),
            ExportScope::Cycle(id) => format!("cycle_{id}_export.csv"),
        }
    }

    fn includes(&self, bank: &Bank, cycle: &Cycle) -> bool {
        match *self {
            ExportScope::Test(_) => true,
            ExportScope::Bank(id) => bank.id == id,
            ExportScope::Cycle(id) => cycle.id == id,
        }
    }
}

/// Render the readings of `test` within `scope` as CSV.
///
/// Voltages are printed with `precision` decimals.
pub fn render_csv(test: &Test, scope: ExportScope, precision: usize) -> String {
    let selected: Vec<(&Bank, &Cycle)> = test
        .banks
        .iter()
        .flat_map(|bank| bank.cycles.iter().map(move |cycle| (bank, cycle)))
        .filter(|(bank, cycle)| scope.includes(bank, cycle))
        .collect();

    let mut ccv_columns: BTreeMap<u32, DateTime<Utc>> = BTreeMap::new();
    for (_, cycle) in &selected {
        for reading in cycle.ccv_readings() {
            ccv_columns
                .entry(reading.reading_number)
                .or_insert(reading.timestamp);
        }
    }

    let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(
        ccv_columns
            .iter()
            .map(|(number, ts)| format!("CCV-{number} ({})", ts.format("%I:%M %p"))),
    );

    let mut out = String::new();
    push_row(&mut out, &header);
    for (bank, cycle) in selected {
        let ccv_by_number: BTreeMap<u32, &Reading> = cycle
            .ccv_readings()
            .map(|reading| (reading.reading_number, reading))
            .collect();
        for cell_number in 1..=bank.number_of_cells {
            let mut row = vec![
                bank.bank_number.to_string(),
                cycle.cycle_number.to_string(),
                cycle.phase.label().to_string(),
                cell_number.to_string(),
                cell_value(cycle.ocv(), cell_number, precision),
            ];
            row.extend(ccv_columns.keys().map(|number| {
                cell_value(ccv_by_number.get(number).copied(), cell_number, precision)
            }));
            push_row(&mut out, &row);
        }
    }
    out
}

/// Write rendered CSV to `path`, replacing any previous export atomically.
pub fn write_csv(path: &Path, contents: &str) -> Result<()> {
    write_atomic(path, contents).context("write csv export")
}

fn cell_value(reading: Option<&Reading>, cell_number: u32, precision: usize) -> String {
    reading
        .and_then(|r| r.cell_values.iter().find(|c| c.cell_number == cell_number))
        .map(|c| format!("{:.*}", precision, c.value))
        .unwrap_or_else(|| MISSING.to_string())
}

fn push_row(out: &mut String, fields: &[String]) {
    let line = fields
        .iter()
        .map(|field| quote(field))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push_str("\r\n");
}

/// RFC 4180 field quoting.
fn quote(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use crate::core::lifecycle::record_reading;
    use crate::test_support::{at, ccv, ocv, scheduled_test};

    fn lines(csv: &str) -> Vec<&str> {
        csv.split("\r\n").filter(|line| !line.is_empty()).collect()
    }

    #[test]
    fn empty_test_exports_dashes() {
        let test = scheduled_test(1, 1, 10);
        let csv = render_csv(&test, ExportScope::Test(test.id), 2);
        let rows = lines(&csv);
        assert_eq!(rows[0], "Bank,Cycle,Phase,Cell No.,OCV");
        assert_eq!(rows.len(), 11);
        assert_eq!(rows[1], "1,1,Discharge,1,-");
    }

    #[test]
    fn ccv_columns_carry_first_timestamp() {
        let mut test = scheduled_test(1, 1, 10);
        let cycle_id = test.banks[0].cycles[0].id;
        record_reading(&mut test, cycle_id, &ocv(10, 3.714, None), at(0)).expect("ocv");
        record_reading(&mut test, cycle_id, &ccv(10, 3.2, Some(30)), at(30)).expect("ccv");

        let csv = render_csv(&test, ExportScope::Cycle(cycle_id), 2);
        let rows = lines(&csv);
        assert_eq!(rows[0], "Bank,Cycle,Phase,Cell No.,OCV,CCV-1 (08:30 AM)");
        assert_eq!(rows[1], "1,1,Discharge,1,3.71,3.20");
    }

    #[test]
    fn bank_scope_excludes_other_banks_and_pads_missing_ccv() {
        let mut test = scheduled_test(2, 2, 10);
        let first = test.banks[1].cycles[0].id;
        record_reading(&mut test, first, &ocv(10, 3.7, None), at(0)).expect("ocv");
        record_reading(&mut test, first, &ccv(10, 3.1, Some(15)), at(15)).expect("ccv");

        let bank_id = test.banks[1].id;
        let csv = render_csv(&test, ExportScope::Bank(bank_id), 1);
        let rows = lines(&csv);
        assert_eq!(rows.len(), 1 + 2 * 10);
        assert!(rows[1..].iter().all(|row| row.starts_with("2,")));
        assert_eq!(rows[1], "2,1,Discharge,1,3.7,3.1");
        assert_eq!(rows[11], "2,2,Discharge,1,-,-");
    }

    #[test]
    fn quotes_fields_with_separators() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("a,b"), "\"a,b\"");
        assert_eq!(quote("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn write_csv_creates_parent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out").join("export.csv");
        write_csv(&path, "Bank\r\n").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "Bank\r\n");
    }

    #[test]
    fn file_names_follow_scope() {
        let id = Uuid::nil();
        assert_eq!(
            ExportScope::Cycle(id).file_name(),
            format!("cycle_{id}_export.csv")
        );
    }
}
