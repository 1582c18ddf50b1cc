#![allow(dead_code)]

use sebal_batch::config::Validation;
use sebal_batch::descriptor::{self, JobDescriptor};
use sebal_batch::engine::{Engine, EngineOutput};
use sebal_batch::error::EngineError;
use sebal_batch::job::EngineConfig;
use sebal_batch::report::{BatchEvent, BatchReport, JobStatus, Reporter};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const TIMESERIES: &str = include_str!("../fixtures/timeseries.csv");

pub fn load(csv: &str) -> Result<Vec<JobDescriptor>, sebal_batch::BatchError> {
    descriptor::load_reader(csv.as_bytes(), &Validation::default())
}

/// The fixture with one column removed.
pub fn without_column(csv: &str, column: &str) -> String {
    let mut lines = csv.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();
    let idx = header.iter().position(|h| *h == column).unwrap();
    let mut out = String::new();
    for line in std::iter::once(header.join(",")).chain(lines.map(str::to_string)) {
        let mut cells: Vec<&str> = line.split(',').collect();
        cells.remove(idx);
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

/// The fixture with one cell (1-based data row) replaced.
pub fn with_cell(csv: &str, row: usize, column: &str, value: &str) -> String {
    let mut lines: Vec<String> = csv.lines().map(str::to_string).collect();
    let idx = lines[0].split(',').position(|h| h == column).unwrap();
    let mut cells: Vec<String> = lines[row].split(',').map(str::to_string).collect();
    cells[idx] = value.to_string();
    lines[row] = cells.join(",");
    lines.join("\n") + "\n"
}

/// Fails for the listed rows, succeeds for the rest, and remembers the order
/// it was called in.
pub struct ScriptedEngine {
    pub fail_rows: Vec<usize>,
    pub calls: RefCell<Vec<usize>>,
    pub interrupt_after: Option<(usize, Arc<AtomicBool>)>,
}

impl ScriptedEngine {
    pub fn new(fail_rows: &[usize]) -> Self {
        Self {
            fail_rows: fail_rows.to_vec(),
            calls: RefCell::new(Vec::new()),
            interrupt_after: None,
        }
    }

    pub fn calls(&self) -> Vec<usize> {
        self.calls.borrow().clone()
    }
}

impl Engine for ScriptedEngine {
    fn run(&self, job: &EngineConfig) -> Result<EngineOutput, EngineError> {
        self.calls.borrow_mut().push(job.row);
        if let Some((row, flag)) = &self.interrupt_after {
            if *row == job.row {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if self.fail_rows.contains(&job.row) {
            return Err(EngineError::Failed(format!(
                "cold pixel not found for row {}",
                job.row
            )));
        }
        Ok(EngineOutput {
            outputs: vec![format!(
                "ET/L8_ET_30m_{}_{:03}.tif",
                job.general.date_acquired.year(),
                job.general.day_of_year
            )],
            warnings: vec![],
        })
    }
}

/// Discards every event.
pub struct Silent;

impl Reporter for Silent {
    fn on_event(&mut self, _event: &BatchEvent<'_>) {}
}

pub fn statuses(report: &BatchReport) -> Vec<(usize, JobStatus)> {
    report.results.iter().map(|r| (r.row, r.status)).collect()
}
