use std::fs;
use std::path::Path;
use std::time::SystemTime;

use ndarray::Array2;

use crate::error::Result;
use crate::io::fits::{self, Header};

/// What is on disk for one stage's outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactState {
    /// No output exists.
    Missing,
    /// Every output exists and none is older than the stage inputs.
    Present,
    /// Some outputs exist, or one is older than an input; recompute.
    Stale,
}

/// Load/save seam for calibrated products.
pub trait ImageStore: Send + Sync {
    fn read_image(&self, path: &Path) -> Result<(Header, Array2<f32>)>;
    fn read_mask(&self, path: &Path) -> Result<(Header, Array2<i32>)>;
    fn write_image(&self, path: &Path, data: &Array2<f32>, header: &Header) -> Result<()>;
    fn write_mask(&self, path: &Path, data: &Array2<i32>, header: &Header) -> Result<()>;

    fn state(&self, inputs: &[&Path], outputs: &[&Path]) -> ArtifactState {
        artifact_state(inputs, outputs)
    }
}

/// FITS files with a single primary HDU.
#[derive(Clone, Copy, Debug, Default)]
pub struct FitsStore;

impl ImageStore for FitsStore {
    fn read_image(&self, path: &Path) -> Result<(Header, Array2<f32>)> {
        fits::read_image(path)
    }

    fn read_mask(&self, path: &Path) -> Result<(Header, Array2<i32>)> {
        fits::read_mask(path)
    }

    fn write_image(&self, path: &Path, data: &Array2<f32>, header: &Header) -> Result<()> {
        fits::write_primary(path, data, header)
    }

    fn write_mask(&self, path: &Path, data: &Array2<i32>, header: &Header) -> Result<()> {
        fits::write_primary(path, data, header)
    }
}

/// Classify `outputs` against the newest modification time of `inputs`.
///
/// Equal timestamps count as up to date. Inputs whose timestamp cannot be
/// read are ignored, so with none readable existing outputs are `Present`.
pub fn artifact_state(inputs: &[&Path], outputs: &[&Path]) -> ArtifactState {
    let times: Vec<Option<SystemTime>> = outputs.iter().map(|p| modified(p)).collect();
    let existing = times.iter().filter(|t| t.is_some()).count();

    if existing == 0 {
        return ArtifactState::Missing;
    }
    if existing < outputs.len() {
        return ArtifactState::Stale;
    }

    match inputs.iter().filter_map(|p| modified(p)).max() {
        Some(newest) if times.iter().flatten().any(|&t| t < newest) => ArtifactState::Stale,
        _ => ArtifactState::Present,
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    let meta = fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    meta.modified().ok()
}
