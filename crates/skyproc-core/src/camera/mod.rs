pub mod generic;

use std::path::Path;

use ndarray::Array2;

use crate::error::Result;
use crate::frame::{DetectorPar, RawFrame};

pub use generic::{CameraConfig, DetectorConfig, GenericCamera, Section};

/// Instrument description: detector electronics plus raw-frame access.
pub trait Camera: Send + Sync {
    fn name(&self) -> &str;

    fn detector(&self, det: usize) -> Result<DetectorPar>;

    /// Read one detector of a raw exposure, untrimmed.
    fn read_raw(&self, path: &Path, det: usize) -> Result<RawFrame>;

    /// Static bad pixels in raw (untrimmed) geometry.
    fn bad_pixel_mask(&self, det: usize, shape: (usize, usize)) -> Result<Array2<bool>>;
}
