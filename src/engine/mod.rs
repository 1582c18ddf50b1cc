pub mod subprocess;
pub mod types;

use crate::error::EngineError;
use crate::job::EngineConfig;

pub use subprocess::SubprocessEngine;
pub use types::{EngineOutput, EngineReply, EngineRequest};

/// The evapotranspiration model, run once per job. Implementations block
/// until the job has finished writing its outputs or has failed.
pub trait Engine {
    fn run(&self, job: &EngineConfig) -> Result<EngineOutput, EngineError>;
}

impl<E: Engine + ?Sized> Engine for &E {
    fn run(&self, job: &EngineConfig) -> Result<EngineOutput, EngineError> {
        (**self).run(job)
    }
}
