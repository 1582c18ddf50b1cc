use crate::error::FailureKind;
use crate::job::EngineConfig;
use crate::util::{ensure_dir, format_elapsed, iso_date};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use time::Date;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
}

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub row: usize,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub image: String,
    pub output_folder: PathBuf,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(default)]
    pub outputs: Vec<String>,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_ms: u64,
}

impl RunResult {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// Results of one invocation, in execution order. Built up by the
/// orchestrator as jobs finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub state: BatchState,
    pub total: usize,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub results: Vec<RunResult>,
}

impl BatchReport {
    pub fn new(batch_id: impl Into<String>, total: usize) -> Self {
        Self {
            batch_id: batch_id.into(),
            state: BatchState::Idle,
            total,
            started_at: None,
            finished_at: None,
            results: Vec::with_capacity(total),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.count(JobStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(JobStatus::Failed)
    }

    /// Jobs that never started, e.g. after an interrupt.
    pub fn pending(&self) -> usize {
        self.total.saturating_sub(self.results.len())
    }

    pub fn success_rate(&self) -> Option<f64> {
        if self.results.is_empty() {
            return None;
        }
        Some(self.succeeded() as f64 * 100.0 / self.results.len() as f64)
    }

    /// 0 when every selected job succeeded, 2 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.state == BatchState::Completed && self.failed() == 0 && self.pending() == 0 {
            0
        } else {
            2
        }
    }

    fn count(&self, status: JobStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// What the orchestrator announces while it works.
#[derive(Debug, Clone, Copy)]
pub enum BatchEvent<'a> {
    BatchStarted {
        batch_id: &'a str,
        total: usize,
    },
    JobStarted {
        position: usize,
        total: usize,
        job: &'a EngineConfig,
    },
    JobFinished {
        position: usize,
        total: usize,
        result: &'a RunResult,
    },
    BatchFinished {
        report: &'a BatchReport,
    },
}

/// Observes a batch. Reporters cannot influence the run; their own failures
/// are logged and swallowed.
pub trait Reporter {
    fn on_event(&mut self, event: &BatchEvent<'_>);
}

impl Reporter for Vec<Box<dyn Reporter>> {
    fn on_event(&mut self, event: &BatchEvent<'_>) {
        for r in self.iter_mut() {
            r.on_event(event);
        }
    }
}

/// Human-readable status lines and the final summary table.
pub struct ConsoleReporter<W: Write> {
    out: W,
    print_summary: bool,
}

impl ConsoleReporter<std::io::Stdout> {
    pub fn stdout(print_summary: bool) -> Self {
        Self::new(std::io::stdout(), print_summary)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, print_summary: bool) -> Self {
        Self { out, print_summary }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            warn!("console reporter write failed: {e}");
        }
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn on_event(&mut self, event: &BatchEvent<'_>) {
        match *event {
            BatchEvent::BatchStarted { batch_id, total } => {
                self.line(&format!("batch {} ({total} jobs)", short_id(batch_id)));
            }
            BatchEvent::JobStarted {
                position,
                total,
                job,
            } => {
                self.line(&format!(
                    "[{position}/{total}] row {} {} {} -> {}",
                    job.row,
                    iso_date::format(&job.date_acquired()),
                    job.image_name(),
                    job.output_folder().display()
                ));
            }
            BatchEvent::JobFinished {
                position,
                total,
                result,
            } => {
                let mut text = format!(
                    "[{position}/{total}] row {} {} in {}",
                    result.row,
                    status_label(result.status),
                    format_elapsed(result.elapsed())
                );
                if let Some(f) = &result.failure {
                    text.push_str(&format!(": {}", first_line(&f.detail)));
                }
                self.line(&text);
            }
            BatchEvent::BatchFinished { report } => {
                if self.print_summary {
                    let summary = render_summary(report);
                    self.line(summary.trim_end());
                }
            }
        }
    }
}

/// Appends each finished job to a JSON-lines file the moment it is recorded,
/// so the results of an interrupted batch survive. The file holds one run:
/// it is emptied when a batch starts.
pub struct JsonlReporter {
    path: PathBuf,
    file: Option<File>,
}

impl JsonlReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// `fresh` starts the file over; a rerun of the same batch id replaces
    /// the previous run's lines instead of mixing with them.
    fn open(&mut self, fresh: bool) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let mut options = OpenOptions::new();
        options.create(true);
        if fresh {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        self.file = Some(options.open(&self.path)?);
        Ok(())
    }

    fn append(&mut self, result: &RunResult) -> anyhow::Result<()> {
        if self.file.is_none() {
            self.open(false)?;
        }
        if let Some(f) = self.file.as_mut() {
            let mut line = serde_json::to_vec(result)?;
            line.push(b'\n');
            f.write_all(&line)?;
            f.flush()?;
        }
        Ok(())
    }
}

impl Reporter for JsonlReporter {
    fn on_event(&mut self, event: &BatchEvent<'_>) {
        match event {
            BatchEvent::BatchStarted { .. } => {
                if let Err(e) = self.open(true) {
                    warn!("cannot open results file {}: {e:#}", self.path.display());
                } else {
                    info!("recording results to {}", self.path.display());
                }
            }
            BatchEvent::JobFinished { result, .. } => {
                if let Err(e) = self.append(result) {
                    warn!(
                        "cannot append row {} to {}: {e:#}",
                        result.row,
                        self.path.display()
                    );
                }
            }
            _ => {}
        }
    }
}

/// Final table: one line per job plus aggregate counts.
pub fn render_summary(report: &BatchReport) -> String {
    let rule = "=".repeat(70);
    let mut s = String::new();
    s.push_str(&format!("{rule}\n"));
    s.push_str(match report.state {
        BatchState::Interrupted => "BATCH INTERRUPTED\n",
        _ => "BATCH COMPLETED\n",
    });
    s.push_str(&format!("{rule}\n"));
    s.push_str(&format!("Total runs processed: {}\n", report.results.len()));
    s.push_str(&format!("Successful runs: {}\n", report.succeeded()));
    s.push_str(&format!("Failed runs: {}\n", report.failed()));
    if report.pending() > 0 {
        s.push_str(&format!("Not started: {}\n", report.pending()));
    }
    if let Some(rate) = report.success_rate() {
        s.push_str(&format!("Success rate: {rate:.1}%\n"));
    }

    if !report.results.is_empty() {
        let image_w = report
            .results
            .iter()
            .map(|r| r.image.chars().count())
            .max()
            .unwrap_or(0)
            .max("image".len());
        s.push('\n');
        s.push_str(&format!(
            "{:>5}  {:<10}  {:<image_w$}  {:<9}  {}\n",
            "row", "date", "image", "status", "elapsed"
        ));
        for r in &report.results {
            s.push_str(&format!(
                "{:>5}  {:<10}  {:<image_w$}  {:<9}  {}\n",
                r.row,
                iso_date::format(&r.date),
                r.image,
                status_label(r.status),
                format_elapsed(r.elapsed())
            ));
            if let Some(f) = &r.failure {
                s.push_str(&format!("{:>5}  error: {}\n", "", first_line(&f.detail)));
            }
        }
    }
    s.push_str(&format!("{rule}\n"));
    s
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Succeeded => "succeeded",
        JobStatus::Failed => "FAILED",
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
