mod common;

use common::{load, statuses, with_cell, without_column, ScriptedEngine, Silent, TIMESERIES};
use sebal_batch::cli::select_jobs;
use sebal_batch::error::FailureKind;
use sebal_batch::orchestrator::Orchestrator;
use sebal_batch::range::DateWindow;
use sebal_batch::report::{BatchEvent, BatchState, JobStatus, Reporter};
use sebal_batch::BatchError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use time::macros::date;

#[derive(Default)]
struct EventLog(Vec<String>);

impl Reporter for EventLog {
    fn on_event(&mut self, event: &BatchEvent<'_>) {
        let line = match event {
            BatchEvent::BatchStarted { total, .. } => format!("batch {total}"),
            BatchEvent::JobStarted {
                position,
                total,
                job,
            } => format!("start {position}/{total} row {}", job.row),
            BatchEvent::JobFinished { result, .. } => {
                format!("done row {} {:?}", result.row, result.status)
            }
            BatchEvent::BatchFinished { report } => format!("end {:?}", report.state),
        };
        self.0.push(line);
    }
}

#[test]
fn no_range_runs_every_row_in_order() {
    let rows = load(TIMESERIES).unwrap();
    let (range, jobs) = select_jobs(&rows, None, None, DateWindow::default()).unwrap();
    assert_eq!((range.start, range.end), (1, 8));

    let engine = ScriptedEngine::new(&[]);
    let report = Orchestrator::new(&engine).run("b", &jobs, &mut Silent);
    assert_eq!(engine.calls(), (1..=8).collect::<Vec<_>>());
    assert_eq!(report.state, BatchState::Completed);
    assert_eq!(report.succeeded(), 8);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn start_row_only_runs_to_the_end() {
    let rows = load(TIMESERIES).unwrap();
    let (_, jobs) = select_jobs(&rows, Some(3), None, DateWindow::default()).unwrap();

    let engine = ScriptedEngine::new(&[]);
    let mut log = EventLog::default();
    let report = Orchestrator::new(&engine).run("b", &jobs, &mut log);

    assert_eq!(engine.calls(), vec![3, 4, 5, 6, 7, 8]);
    assert_eq!(report.results.len(), 6);
    assert_eq!(log.0[0], "batch 6");
    assert_eq!(log.0[1], "start 1/6 row 3");
    assert_eq!(log.0[2], "done row 3 Succeeded");
    assert_eq!(log.0.last().unwrap(), "end Completed");
}

#[test]
fn out_of_range_selection_fails_before_any_job() {
    let rows = load(TIMESERIES).unwrap();
    for (start, end) in [(Some(5), Some(4)), (Some(1), Some(9)), (Some(0), None)] {
        let err = select_jobs(&rows, start, end, DateWindow::default()).unwrap_err();
        assert!(matches!(err, BatchError::Range { total: 8, .. }));
    }
}

#[test]
fn schema_error_means_zero_engine_calls() {
    let csv = without_column(TIMESERIES, "DEM_fileName");
    let engine = ScriptedEngine::new(&[]);
    let outcome = load(&csv).and_then(|rows| select_jobs(&rows, None, None, DateWindow::default()));
    let err = outcome.unwrap_err();
    assert_eq!(err.missing_columns(), ["DEM_fileName"]);
    assert!(engine.calls().is_empty());
}

#[test]
fn failing_job_is_isolated() {
    let rows = load(TIMESERIES).unwrap();
    let (_, jobs) = select_jobs(&rows, None, None, DateWindow::default()).unwrap();

    let engine = ScriptedEngine::new(&[4]);
    let report = Orchestrator::new(&engine).run("b", &jobs, &mut Silent);

    assert_eq!(engine.calls().len(), 8);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.succeeded(), 7);
    assert_eq!(report.exit_code(), 2);

    let failed = &report.results[3];
    assert_eq!(failed.row, 4);
    assert_eq!(failed.status, JobStatus::Failed);
    let failure = failed.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Engine);
    assert!(failure.detail.contains("cold pixel not found for row 4"));
    assert!(failed.outputs.is_empty());

    for r in report.results.iter().filter(|r| r.row != 4) {
        assert_eq!(r.status, JobStatus::Succeeded, "row {}", r.row);
        assert!(r.failure.is_none());
        assert_eq!(r.outputs.len(), 1);
    }
}

#[test]
fn failure_count_matches_failing_rows_whatever_their_position() {
    let rows = load(TIMESERIES).unwrap();
    let (_, jobs) = select_jobs(&rows, None, None, DateWindow::default()).unwrap();

    let baseline = Orchestrator::new(ScriptedEngine::new(&[])).run("b", &jobs, &mut Silent);
    for fail in [vec![1], vec![8], vec![2, 3, 7], vec![1, 2, 3, 4, 5, 6, 7, 8]] {
        let report = Orchestrator::new(ScriptedEngine::new(&fail)).run("b", &jobs, &mut Silent);
        assert_eq!(report.failed(), fail.len());
        for (r, base) in report.results.iter().zip(&baseline.results) {
            if !fail.contains(&r.row) {
                assert_eq!(r.status, base.status);
                assert_eq!(r.outputs, base.outputs);
            }
        }
    }
}

#[test]
fn deterministic_engine_gives_identical_statuses() {
    let rows = load(TIMESERIES).unwrap();
    let (_, jobs) = select_jobs(&rows, Some(2), Some(7), DateWindow::default()).unwrap();

    let first = Orchestrator::new(ScriptedEngine::new(&[5])).run("b", &jobs, &mut Silent);
    let second = Orchestrator::new(ScriptedEngine::new(&[5])).run("b", &jobs, &mut Silent);
    assert_eq!(statuses(&first), statuses(&second));
}

#[test]
fn interrupt_keeps_recorded_results() {
    let rows = load(TIMESERIES).unwrap();
    let (_, jobs) = select_jobs(&rows, None, None, DateWindow::default()).unwrap();

    let flag = Arc::new(AtomicBool::new(false));
    let mut engine = ScriptedEngine::new(&[1]);
    engine.interrupt_after = Some((3, Arc::clone(&flag)));

    let orchestrator = Orchestrator::new(&engine).with_interrupt(flag);
    let report = orchestrator.run("b", &jobs, &mut Silent);

    assert_eq!(engine.calls(), vec![1, 2, 3]);
    assert_eq!(report.state, BatchState::Interrupted);
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.results[0].status, JobStatus::Failed);
    assert_eq!(report.pending(), 5);
    assert_eq!(report.exit_code(), 2);
}

#[test]
fn date_window_narrows_the_selected_range() {
    let rows = load(TIMESERIES).unwrap();
    let window = DateWindow {
        from: Some(date!(2025 - 02 - 01)),
        to: Some(date!(2025 - 04 - 10)),
    };
    let (range, jobs) = select_jobs(&rows, Some(4), None, window).unwrap();
    assert_eq!((range.start, range.end), (4, 8));
    let picked: Vec<usize> = jobs.iter().map(|j| j.row).collect();
    assert_eq!(picked, vec![4, 5, 6]);
}

#[test]
fn radiation_is_resolved_per_row() {
    let rows = load(TIMESERIES).unwrap();
    let (_, jobs) = select_jobs(&rows, Some(7), Some(8), DateWindow::default()).unwrap();
    let json = serde_json::to_value(&jobs).unwrap();
    assert_eq!(json[0]["radiation"]["daily"]["method"], "direct");
    assert_eq!(json[0]["radiation"]["instantaneous"]["method"], "transmissivity");
    assert_eq!(json[1]["radiation"]["daily"]["method"], "transmissivity");
    assert_eq!(json[1]["general"]["day_of_year"], 124);
}

#[test]
fn validation_error_stops_before_execution() {
    let csv = with_cell(TIMESERIES, 5, "RH_24", "abc");
    let err = load(&csv).unwrap_err();
    assert!(matches!(err, BatchError::Validation { row: 5, .. }));
}
