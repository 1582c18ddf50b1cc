//! Ctrl-C handling for a running batch.
//!
//! The first interrupt lets the current job finish and skips the rest. The
//! second kills the running engine. A third exits immediately.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    /// Checked by the orchestrator between jobs.
    pub stop: Arc<AtomicBool>,
    /// Checked by the engine while a job runs.
    pub abort: Arc<AtomicBool>,
}

impl Interrupts {
    /// Records one more interrupt and returns how many have been seen.
    pub fn escalate(&self) -> u8 {
        if !self.stop.swap(true, Ordering::SeqCst) {
            warn!("interrupt received: finishing the current job, press Ctrl-C again to abort it");
            return 1;
        }
        if !self.abort.swap(true, Ordering::SeqCst) {
            warn!("second interrupt: aborting the running job");
            return 2;
        }
        3
    }
}

/// Listens for Ctrl-C on a background thread for the rest of the process.
pub fn install() -> Result<Interrupts> {
    let flags = Interrupts::default();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;

    let watcher = flags.clone();
    std::thread::Builder::new()
        .name("sebal-batch-signals".into())
        .spawn(move || {
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if watcher.escalate() >= 3 {
                        eprintln!("sebal-batch: interrupted");
                        std::process::exit(2);
                    }
                }
            })
        })
        .context("spawning signal thread")?;

    Ok(flags)
}
