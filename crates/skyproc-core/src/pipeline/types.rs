use std::fmt;
use std::path::PathBuf;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::consts::PIPELINE_VERSION;
use crate::frame::ImageKind;
use crate::io::fits::Header;

/// Pipeline stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    CcdCorrection,
    ScienceProcessing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CcdCorrection => write!(f, "CCD correction"),
            Self::ScienceProcessing => write!(f, "Science processing"),
        }
    }
}

/// How an exposure left a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Persisted,
    SkippedExisting,
}

/// One exposure on one detector; keys every per-exposure result.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExposureId {
    pub path: PathBuf,
    pub det: usize,
}

impl ExposureId {
    pub fn new(path: impl Into<PathBuf>, det: usize) -> Self {
        Self {
            path: path.into(),
            det,
        }
    }
}

impl fmt::Display for ExposureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [det {:02}]", self.path.display(), self.det)
    }
}

/// A per-exposure failure, carried back to the caller instead of aborting
/// the batch.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{exposure}: {cause}")]
pub struct ExposureFailure {
    pub exposure: ExposureId,
    pub cause: String,
}

pub type ExposureResult<T> = std::result::Result<T, ExposureFailure>;

/// Products of one exposure through one stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StageOutput<P> {
    pub exposure: ExposureId,
    pub products: P,
    pub outcome: Outcome,
}

/// Thread-safe reporting for one pipeline run.
///
/// Implementors can use this to drive progress bars or logging. All methods
/// have default no-op implementations.
pub trait RunReporter: Send + Sync {
    fn begin_batch(&self, _stage: Stage, _total: usize) {}

    fn exposure_started(&self, _exposure: &ExposureId) {}

    fn exposure_finished(&self, _exposure: &ExposureId, _outcome: Outcome) {}

    fn exposure_failed(&self, _exposure: &ExposureId, _cause: &str) {}

    fn finish_batch(&self, _stage: Stage) {}
}

/// Reporter that ignores every event.
pub struct NoOpReporter;
impl RunReporter for NoOpReporter {}

/// Reporter that emits structured `tracing` events tagged with a run id.
pub struct TracingReporter {
    run_id: String,
}

impl TracingReporter {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }
}

impl RunReporter for TracingReporter {
    fn begin_batch(&self, stage: Stage, total: usize) {
        info!(run = %self.run_id, %stage, total, "Batch started");
    }

    fn exposure_finished(&self, exposure: &ExposureId, outcome: Outcome) {
        info!(run = %self.run_id, %exposure, ?outcome, "Exposure done");
    }

    fn exposure_failed(&self, exposure: &ExposureId, cause: &str) {
        warn!(run = %self.run_id, %exposure, cause, "Exposure failed");
    }

    fn finish_batch(&self, stage: Stage) {
        info!(run = %self.run_id, %stage, "Batch finished");
    }
}

/// Header provenance shared by every artifact of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
    pub version: String,
    /// UTC creation time, `YYYY-MM-DDThh:mm:ss`.
    pub date: String,
}

impl Provenance {
    pub fn now() -> Self {
        Self {
            version: PIPELINE_VERSION.to_string(),
            date: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }

    /// Header for one artifact: `base` plus image type, version and date.
    pub fn stamp(&self, base: &Header, kind: ImageKind) -> Header {
        let mut header = base.clone();
        header.set("IMGTYP", kind.to_string(), Some("image type"));
        header.set("SKYVERS", self.version.as_str(), Some("skyproc version"));
        header.set("DATE", self.date.as_str(), Some("UTC date this file was written"));
        header
    }
}

impl Default for Provenance {
    fn default() -> Self {
        Self::now()
    }
}
