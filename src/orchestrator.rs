use crate::{
    engine::Engine,
    job::EngineConfig,
    report::{BatchEvent, BatchReport, BatchState, Failure, JobStatus, Reporter, RunResult},
    util::now_rfc3339,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Runs the selected jobs one after another. A failing job is recorded and
/// the loop moves on; nothing a job does can affect the jobs after it.
pub struct Orchestrator<E: Engine> {
    engine: E,
    interrupt: Arc<AtomicBool>,
}

impl<E: Engine> Orchestrator<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the flag stops the batch before the next job starts. Results
    /// recorded so far stay in the report.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn run(
        &self,
        batch_id: &str,
        jobs: &[EngineConfig],
        reporter: &mut dyn Reporter,
    ) -> BatchReport {
        let total = jobs.len();
        let mut report = BatchReport::new(batch_id, total);

        report.state = BatchState::Running;
        report.started_at = Some(now_rfc3339());
        reporter.on_event(&BatchEvent::BatchStarted { batch_id, total });
        info!("batch {batch_id} started: {total} jobs");

        for (i, job) in jobs.iter().enumerate() {
            if self.interrupt.load(Ordering::SeqCst) {
                warn!(
                    "batch interrupted before row {}; {} jobs not started",
                    job.row,
                    total - i
                );
                report.state = BatchState::Interrupted;
                break;
            }

            let position = i + 1;
            reporter.on_event(&BatchEvent::JobStarted {
                position,
                total,
                job,
            });

            let result = self.run_job(job);

            report.results.push(result);
            if let Some(result) = report.results.last() {
                reporter.on_event(&BatchEvent::JobFinished {
                    position,
                    total,
                    result,
                });
            }
        }

        if report.state == BatchState::Running {
            report.state = BatchState::Completed;
        }
        report.finished_at = Some(now_rfc3339());
        info!(
            "batch {batch_id} {:?}: {} succeeded, {} failed",
            report.state,
            report.succeeded(),
            report.failed()
        );
        reporter.on_event(&BatchEvent::BatchFinished { report: &report });
        report
    }

    fn run_job(&self, job: &EngineConfig) -> RunResult {
        let started_at = now_rfc3339();
        let clock = Instant::now();
        info!(
            row = job.row,
            image = job.image_name(),
            "job running, output={}",
            job.output_folder().display()
        );

        let outcome = self.engine.run(job);

        let elapsed_ms = clock.elapsed().as_millis() as u64;
        let (status, failure, outputs) = match outcome {
            Ok(out) => {
                info!(row = job.row, outputs = out.outputs.len(), "job succeeded");
                (JobStatus::Succeeded, None, out.outputs)
            }
            Err(e) => {
                error!(row = job.row, "job failed: {e}");
                let failure = Failure {
                    kind: e.kind(),
                    detail: error_chain(&e),
                };
                (JobStatus::Failed, Some(failure), Vec::new())
            }
        };

        RunResult {
            row: job.row,
            date: job.date_acquired(),
            image: job.image_name().to_string(),
            output_folder: job.output_folder().to_path_buf(),
            status,
            failure,
            outputs,
            started_at,
            finished_at: now_rfc3339(),
            elapsed_ms,
        }
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        let text = s.to_string();
        if !msg.contains(&text) {
            msg.push_str(": ");
            msg.push_str(&text);
        }
        source = s.source();
    }
    msg
}
