use crate::job::EngineConfig;
use serde::{Deserialize, Serialize};

/// Written to the engine's stdin.
#[derive(Debug, Clone, Serialize)]
pub struct EngineRequest<'a> {
    pub cmd: &'static str,
    pub job: &'a EngineConfig,
}

impl<'a> EngineRequest<'a> {
    pub fn run(job: &'a EngineConfig) -> Self {
        Self { cmd: "run", job }
    }
}

/// Read from the engine's stdout once it exits.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineReply {
    pub ok: bool,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// What a successful job produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    /// Raster paths, relative to the job's output folder.
    pub outputs: Vec<String>,
    pub warnings: Vec<String>,
}
