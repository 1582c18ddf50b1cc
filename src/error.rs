use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// File-level failures. Any of these invalidates the whole batch before the
/// first job runs.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("cannot read descriptor file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed descriptor file: {0}")]
    Csv(#[from] csv::Error),

    #[error("descriptor file is missing required columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("invalid values in row {row}: {}", format_issues(.issues))]
    Validation { row: usize, issues: Vec<FieldIssue> },

    #[error("row range {start}..={end} is outside 1..={total}")]
    Range {
        start: usize,
        end: usize,
        total: usize,
    },
}

impl BatchError {
    pub fn missing_columns(&self) -> &[String] {
        match self {
            BatchError::Schema { missing } => missing,
            _ => &[],
        }
    }
}

/// One rejected cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub column: &'static str,
    pub message: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.column, self.message)
    }
}

fn format_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Job-level failures reported by an engine. These never escape the
/// orchestrator loop; they end up in the job's `RunResult`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("path not accessible: {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine failed: {0}")]
    Failed(String),

    #[error("unreadable engine reply: {0}")]
    Protocol(String),

    #[error("engine exceeded timeout of {seconds}s")]
    Timeout { seconds: u64 },

    #[error("engine killed by user interrupt")]
    Aborted,
}

impl EngineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::Io { .. } => FailureKind::Io,
            EngineError::Spawn { .. } => FailureKind::Spawn,
            EngineError::Failed(_) => FailureKind::Engine,
            EngineError::Protocol(_) => FailureKind::Protocol,
            EngineError::Timeout { .. } => FailureKind::Timeout,
            EngineError::Aborted => FailureKind::Aborted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Io,
    Spawn,
    Engine,
    Protocol,
    Timeout,
    Aborted,
}
