use super::{types::*, Engine};
use crate::config;
use crate::descriptor::Measured;
use crate::error::EngineError;
use crate::job::{ActiveRadiation, EngineConfig};
use anyhow::{anyhow, Result};
use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const STDERR_TAIL_LINES: usize = 20;
const POLL_MIN: Duration = Duration::from_millis(10);
const POLL_MAX: Duration = Duration::from_millis(250);

/// Runs the model as a child process per job: the resolved configuration goes
/// in on stdin as JSON, a JSON reply comes back on stdout.
pub struct SubprocessEngine {
    cfg: config::Engine,
    program: PathBuf,
    abort: Arc<AtomicBool>,
}

impl SubprocessEngine {
    pub fn new(cfg: &config::Engine) -> Result<Self> {
        let raw = cfg.program.trim();
        if raw.is_empty() {
            return Err(anyhow!("engine.program is empty"));
        }
        Ok(Self {
            cfg: cfg.clone(),
            program: expand_tilde(raw),
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Setting the flag kills the running job, if any, and fails it as
    /// `Aborted`.
    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = flag;
        self
    }

    fn timeout(&self) -> Option<Duration> {
        (self.cfg.timeout_seconds > 0).then(|| Duration::from_secs(self.cfg.timeout_seconds))
    }

    fn check_inputs(&self, job: &EngineConfig) -> Result<(), EngineError> {
        let general = &job.general;
        require_dir(&general.input_folder)?;
        require_file(&general.dem_path)?;
        for map in referenced_maps(job) {
            require_file(map)?;
        }
        Ok(())
    }

    fn prepare_output(&self, dir: &Path) -> Result<(), EngineError> {
        if self.cfg.clean_output_dir && dir.exists() {
            debug!("clearing output folder {}", dir.display());
            std::fs::remove_dir_all(dir).map_err(|source| EngineError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        std::fs::create_dir_all(dir).map_err(|source| EngineError::Io {
            path: dir.to_path_buf(),
            source,
        })
    }

    fn spawn(&self, job: &EngineConfig) -> Result<Child, EngineError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.cfg.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &self.cfg.env {
            cmd.env(k, v);
        }
        cmd.env("SEBAL_BATCH_ROW", job.row.to_string());
        // own process group: a timeout or abort can take down the model's
        // helpers too, and a terminal Ctrl-C reaches only the orchestrator
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn().map_err(|source| EngineError::Spawn {
            program: self.program.display().to_string(),
            source,
        })
    }

    /// Polls the child until it exits, the deadline passes or an abort is
    /// requested. The poll interval backs off up to `POLL_MAX`.
    fn wait(&self, mut child: Child) -> Result<Output, EngineError> {
        let pipes = Pipes::drain(&mut child);
        let deadline = self.timeout().map(|limit| Instant::now() + limit);
        let mut interval = POLL_MIN;

        loop {
            let polled = child
                .try_wait()
                .map_err(|e| EngineError::Failed(format!("polling engine process: {e}")))?;
            if let Some(status) = polled {
                let (stdout, stderr) = pipes.collect()?;
                return Ok(Output {
                    status,
                    stdout,
                    stderr,
                });
            }

            let stop = if self.abort.load(Ordering::SeqCst) {
                Some(EngineError::Aborted)
            } else if deadline.is_some_and(|d| Instant::now() >= d) {
                Some(EngineError::Timeout {
                    seconds: self.cfg.timeout_seconds,
                })
            } else {
                None
            };
            if let Some(err) = stop {
                warn!(pid = child.id(), "stopping engine: {err}");
                kill_tree(&mut child);
                // a descendant that left the group may still hold the pipes;
                // the readers are detached rather than waited on
                drop(pipes);
                return Err(err);
            }

            std::thread::sleep(interval);
            interval = (interval * 2).min(POLL_MAX);
        }
    }
}

impl Engine for SubprocessEngine {
    fn run(&self, job: &EngineConfig) -> Result<EngineOutput, EngineError> {
        if self.cfg.check_paths {
            self.check_inputs(job)?;
        }
        self.prepare_output(job.output_folder())?;

        debug!(
            "engine run {} row={} timeout={:?}",
            self.program.display(),
            job.row,
            self.timeout()
        );
        let mut child = self.spawn(job)?;

        {
            let bytes = serde_json::to_vec(&EngineRequest::run(job))
                .map_err(|e| EngineError::Protocol(format!("encoding request: {e}")))?;
            if let Some(mut stdin) = child.stdin.take() {
                // A program that ignores stdin may already have exited; its
                // exit status decides the outcome.
                if let Err(e) = stdin.write_all(&bytes).and_then(|_| stdin.flush()) {
                    debug!("engine stdin closed early: {e}");
                }
            }
        }

        let output = self.wait(child)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(EngineError::Failed(format!(
                "exited with {}{}",
                output.status,
                stderr_tail(&stderr)
            )));
        }
        if self.cfg.keep_stderr && !stderr.trim().is_empty() {
            debug!("engine stderr row={}: {}", job.row, stderr.trim());
        }

        let reply: EngineReply = serde_json::from_slice(&output.stdout)
            .map_err(|e| EngineError::Protocol(format!("parsing engine JSON output: {e}")))?;
        if !reply.ok {
            let msg = reply
                .error
                .unwrap_or_else(|| "engine returned ok=false".to_string());
            return Err(EngineError::Failed(msg));
        }
        for w in &reply.warnings {
            warn!(row = job.row, "engine warning: {w}");
        }
        Ok(EngineOutput {
            outputs: reply.outputs,
            warnings: reply.warnings,
        })
    }
}

fn referenced_maps(job: &EngineConfig) -> impl Iterator<Item = &Path> {
    let m = &job.meteo;
    let radiation = [&job.radiation.daily, &job.radiation.instantaneous]
        .into_iter()
        .map(|r| match r {
            ActiveRadiation::Direct(v) | ActiveRadiation::Transmissivity(v) => v,
        });
    [&m.temp_inst, &m.temp_24, &m.rh_inst, &m.rh_24, &m.wind_inst, &m.wind_24]
        .into_iter()
        .chain(radiation)
        .filter_map(|v| match v {
            Measured::Map(p) => Some(p.as_path()),
            Measured::Constant(_) => None,
        })
}

fn require_dir(path: &Path) -> Result<(), EngineError> {
    let meta = std::fs::metadata(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(EngineError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        });
    }
    Ok(())
}

fn require_file(path: &Path) -> Result<(), EngineError> {
    std::fs::metadata(path)
        .map(|_| ())
        .map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    format!("\n{}", lines[start..].join("\n"))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Reader threads for the child's stdout and stderr. Both pipes are drained
/// while the child runs so a chatty model cannot stall on a full buffer.
struct Pipes {
    stdout: JoinHandle<std::io::Result<Vec<u8>>>,
    stderr: JoinHandle<std::io::Result<Vec<u8>>>,
}

impl Pipes {
    fn drain(child: &mut Child) -> Self {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        Self {
            stdout: std::thread::spawn(move || read_all(stdout)),
            stderr: std::thread::spawn(move || read_all(stderr)),
        }
    }

    fn collect(self) -> Result<(Vec<u8>, Vec<u8>), EngineError> {
        Ok((join(self.stdout)?, join(self.stderr)?))
    }
}

/// Kills the child and everything it started. The child leads its own
/// process group (see `spawn`), so one signal reaches the whole tree.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    let group = child.id() as libc::pid_t;
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    if unsafe { libc::kill(-group, libc::SIGKILL) } != 0 {
        let _ = child.kill();
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn join(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>, EngineError> {
    handle
        .join()
        .map_err(|_| EngineError::Failed("pipe reader thread panicked".into()))?
        .map_err(|e| EngineError::Failed(format!("reading engine output: {e}")))
}

fn read_all<R: Read>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut r) = reader {
        r.read_to_end(&mut buf)?;
    }
    Ok(buf)
}
