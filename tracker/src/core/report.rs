//! Read-only status report derived from a test record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::types::CycleState;
use crate::record::{Cycle, CyclePhase, Test, TestStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStatusReport {
    pub test_id: Uuid,
    pub job_number: String,
    pub status: TestStatus,
    pub cycles_total: u32,
    pub cycles_completed: u32,
    /// `floor(cycles_completed * 100 / cycles_total)`.
    pub progress_percent: u32,
    pub banks: Vec<BankProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankProgress {
    pub bank_id: Uuid,
    pub bank_number: u32,
    pub cycles: Vec<CycleProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleProgress {
    pub cycle_id: Uuid,
    pub cycle_number: u32,
    pub phase: CyclePhase,
    pub state: CycleState,
    pub ocv_taken: bool,
    pub ccv_count: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
}

pub fn cycle_state(cycle: &Cycle) -> CycleState {
    match (cycle.start_time, cycle.end_time) {
        (_, Some(_)) => CycleState::Completed,
        (Some(_), None) => CycleState::Running,
        (None, None) => CycleState::Pending,
    }
}

/// Build the status report for `test`.
pub fn status_report(test: &Test) -> TestStatusReport {
    let cycles_total = test.cycles().count() as u32;
    let cycles_completed = test.cycles().filter(|c| c.is_completed()).count() as u32;
    let progress_percent = if cycles_total == 0 {
        0
    } else {
        cycles_completed * 100 / cycles_total
    };

    let banks = test
        .banks
        .iter()
        .map(|bank| BankProgress {
            bank_id: bank.id,
            bank_number: bank.bank_number,
            cycles: bank
                .cycles
                .iter()
                .map(|cycle| CycleProgress {
                    cycle_id: cycle.id,
                    cycle_number: cycle.cycle_number,
                    phase: cycle.phase,
                    state: cycle_state(cycle),
                    ocv_taken: cycle.ocv().is_some(),
                    ccv_count: cycle.ccv_readings().count() as u32,
                    start_time: cycle.start_time,
                    end_time: cycle.end_time,
                    duration: cycle.duration,
                })
                .collect(),
        })
        .collect();

    TestStatusReport {
        test_id: test.id,
        job_number: test.job_number.clone(),
        status: test.status,
        cycles_total,
        cycles_completed,
        progress_percent,
        banks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lifecycle::{complete_cycle, record_reading};
    use crate::test_support::{at, ccv, ocv, scheduled_test};

    #[test]
    fn report_for_fresh_test_is_all_pending() {
        let test = scheduled_test(2, 2, 10);
        let report = status_report(&test);
        assert_eq!(report.status, TestStatus::Scheduled);
        assert_eq!(report.cycles_total, 4);
        assert_eq!(report.cycles_completed, 0);
        assert_eq!(report.progress_percent, 0);
        assert!(
            report
                .banks
                .iter()
                .flat_map(|b| b.cycles.iter())
                .all(|c| c.state == CycleState::Pending)
        );
    }

    #[test]
    fn report_tracks_cycle_states_and_progress() {
        let mut test = scheduled_test(1, 3, 10);
        let first = test.banks[0].cycles[0].id;
        let second = test.banks[0].cycles[1].id;
        record_reading(&mut test, first, &ocv(10, 3.7, Some(at(0))), at(0)).expect("ocv");
        record_reading(&mut test, first, &ccv(10, 3.3, Some(30)), at(30)).expect("ccv");
        complete_cycle(&mut test, first, at(75)).expect("complete");
        record_reading(&mut test, second, &ocv(10, 3.7, Some(at(80))), at(80)).expect("ocv");

        let report = status_report(&test);
        assert_eq!(report.status, TestStatus::InProgress);
        assert_eq!(report.cycles_completed, 1);
        assert_eq!(report.progress_percent, 33);

        let cycles = &report.banks[0].cycles;
        assert_eq!(cycles[0].state, CycleState::Completed);
        assert_eq!(cycles[0].ccv_count, 1);
        assert_eq!(cycles[0].duration, Some(75));
        assert_eq!(cycles[1].state, CycleState::Running);
        assert!(cycles[1].ocv_taken);
        assert_eq!(cycles[2].state, CycleState::Pending);
    }
}
