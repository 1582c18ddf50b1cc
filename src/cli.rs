use crate::{
    config::Config,
    descriptor::{self, JobDescriptor},
    engine::SubprocessEngine,
    error::BatchError,
    interrupt,
    job::{self, EngineConfig},
    orchestrator::Orchestrator,
    range::{DateWindow, RowRange},
    report::{BatchReport, ConsoleReporter, JsonlReporter, Reporter},
    util::{ensure_dir, hash_file, iso_date, sha256_hex},
};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use time::Date;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "sebal-batch")]
#[command(about = "Run the SEBAL evapotranspiration model for every row of a CSV job file")]
pub struct Args {
    /// CSV job-description file, one row per acquisition.
    pub descriptor_file: PathBuf,

    /// First row to run (1-based). Defaults to the first row.
    pub start_row: Option<usize>,

    /// Last row to run (inclusive). Defaults to the last row.
    pub end_row: Option<usize>,

    /// Path to config TOML. If omitted, uses ./sebal-batch.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Skip selected rows acquired before this date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date_arg)]
    pub from_date: Option<Date>,

    /// Skip selected rows acquired after this date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date_arg)]
    pub to_date: Option<Date>,

    /// Validate the job file and print the resolved jobs without running them.
    #[arg(long)]
    pub check: bool,

    /// Write the final batch report as JSON to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// How a successful dispatch ended.
#[derive(Debug)]
pub enum Outcome {
    Checked { jobs: usize },
    Ran(BatchReport),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Checked { .. } => 0,
            Outcome::Ran(report) => report.exit_code(),
        }
    }
}

pub fn dispatch(args: Args) -> Result<Outcome> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    let descriptors = descriptor::load_path(&args.descriptor_file, &cfg.validation)?;
    let window = DateWindow {
        from: args.from_date,
        to: args.to_date,
    };
    let (range, jobs) = select_jobs(&descriptors, args.start_row, args.end_row, window)?;
    if jobs.is_empty() {
        return Err(anyhow!(
            "no rows in {}..={} fall inside the requested date window",
            range.start,
            range.end
        ));
    }
    info!(
        "selected rows {}..={}: {} of {} rows run",
        range.start,
        range.end,
        jobs.len(),
        range.row_count()
    );

    let batch_id = batch_id(&args.descriptor_file, &cfg, range, window)?;

    if args.check {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "batch_id": batch_id,
                "descriptor_file": args.descriptor_file,
                "range": range,
                "jobs": jobs,
            }))?
        );
        return Ok(Outcome::Checked { jobs: jobs.len() });
    }

    let interrupts = interrupt::install()?;
    let engine = SubprocessEngine::new(&cfg.engine)?.with_abort(interrupts.abort.clone());
    let orchestrator = Orchestrator::new(engine).with_interrupt(interrupts.stop);

    let mut reporters: Vec<Box<dyn Reporter>> =
        vec![Box::new(ConsoleReporter::stdout(cfg.global.print_summary))];
    if cfg.global.write_results_jsonl {
        let path = Path::new(&cfg.global.results_dir).join(format!("{batch_id}.jsonl"));
        reporters.push(Box::new(JsonlReporter::new(path)));
    }

    let report = orchestrator.run(&batch_id, &jobs, &mut reporters);

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }

    Ok(Outcome::Ran(report))
}

/// Row range first, then the optional date window, then one engine
/// configuration per surviving row. Order is the file's order throughout.
pub fn select_jobs(
    descriptors: &[JobDescriptor],
    start_row: Option<usize>,
    end_row: Option<usize>,
    window: DateWindow,
) -> Result<(RowRange, Vec<EngineConfig>), BatchError> {
    let range = RowRange::resolve(descriptors.len(), start_row, end_row)?;
    let selected = range.select(descriptors);

    let kept = window.filter(selected);
    if !window.is_unbounded() {
        info!(
            "date window kept {} of {} selected rows",
            kept.len(),
            selected.len()
        );
    }

    let jobs = kept
        .into_iter()
        .map(job::build)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((range, jobs))
}

/// Same file, config and selection give the same id.
fn batch_id(
    descriptor_file: &Path,
    cfg: &Config,
    range: RowRange,
    window: DateWindow,
) -> Result<String> {
    let file_hash = hash_file(descriptor_file)
        .with_context(|| format!("hashing job file: {}", descriptor_file.display()))?;
    let bound = |d: Option<Date>| d.map(|d| iso_date::format(&d)).unwrap_or_default();
    Ok(sha256_hex(
        format!(
            "{file_hash}:{}:{}-{}:{}:{}",
            cfg.normalized_for_hash(),
            range.start,
            range.end,
            bound(window.from),
            bound(window.to)
        )
        .as_bytes(),
    ))
}

fn write_report(path: &Path, report: &BatchReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("writing report: {}", path.display()))?;
    info!("report written to {}", path.display());
    Ok(())
}

fn parse_date_arg(raw: &str) -> Result<Date, String> {
    descriptor::loader::parse_date(raw).ok_or_else(|| format!("expected YYYY-MM-DD, got `{raw}`"))
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("sebal-batch.toml");
    default.exists().then_some(default)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the progress lines; logs go to stderr
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
    {
        warn!("logging already initialized: {e}");
    }

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.global.results_dir).join("sebal-batch.log"))
}
