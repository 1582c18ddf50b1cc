use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub validation: Validation,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub print_summary: bool,
    /// Append every finished job to `<results_dir>/<batch_id>.jsonl` as soon
    /// as it is recorded.
    pub write_results_jsonl: bool,
    pub results_dir: String,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
            write_results_jsonl: true,
            results_dir: "sebal-batch-results".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    /// Executable that runs one model job per invocation.
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Per-job wall clock limit; 0 disables it.
    pub timeout_seconds: u64,
    /// Verify input folder and DEM before spawning the engine.
    pub check_paths: bool,
    /// Remove an existing output folder before the job runs.
    pub clean_output_dir: bool,
    pub keep_stderr: bool,
}
impl Default for Engine {
    fn default() -> Self {
        Self {
            program: "python3".into(),
            args: vec!["SEBAL/sebal_job.py".into()],
            env: Default::default(),
            timeout_seconds: 0,
            check_paths: true,
            clean_output_dir: false,
            keep_stderr: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Validation {
    /// Constant temperatures outside this window are logged, not rejected.
    pub min_temperature_c: f64,
    pub max_temperature_c: f64,
}
impl Default for Validation {
    fn default() -> Self {
        Self {
            min_temperature_c: -50.0,
            max_temperature_c: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let raw = r#"
[engine]
program = "sebal"
timeout_seconds = 30
"#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert_eq!(cfg.engine.program, "sebal");
        assert_eq!(cfg.engine.timeout_seconds, 30);
        assert!(cfg.engine.env.is_empty());
        assert!(cfg.engine.check_paths);
        assert_eq!(cfg.engine.args, ["SEBAL/sebal_job.py"]);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.global.write_results_jsonl);
    }
}
