//! Batch orchestration of SEBAL evapotranspiration runs over a time series
//! of satellite acquisitions described in a CSV job file.

pub mod cli;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod interrupt;
pub mod job;
pub mod orchestrator;
pub mod range;
pub mod report;
pub mod util;

pub use error::{BatchError, EngineError};
