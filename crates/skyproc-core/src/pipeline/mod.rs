pub mod ccdproc;
pub mod config;
pub mod dispatch;
pub mod orchestrator;
pub mod replace;
pub mod sciproc;
pub mod types;
pub mod vignetting;

pub use ccdproc::{ccd_correct, CcdCorrector, MasterFrames};
pub use config::{CalibrationPaths, CcdProcConfig, PipelineConfig, ReplacePolicy, RunConfig, SciProcConfig};
pub use dispatch::{dispatch, effective_workers, run_ccd_batch, run_sci_batch, CancelToken};
pub use orchestrator::{run_pipeline, PipelineReport, StageTally};
pub use sciproc::{science_process, SciTask, ScienceProcessor};
pub use types::{
    ExposureFailure, ExposureId, ExposureResult, NoOpReporter, Outcome, Provenance, RunReporter,
    Stage, StageOutput, TracingReporter,
};
