pub mod components;
pub mod lacosmic;
pub mod satellite;
pub mod starmask;

use std::sync::Arc;

use ndarray::Array2;

use crate::background::{BackgroundEstimator, MeshBackground};
use crate::error::Result;

pub use components::{label_components, remove_small_components, Connectivity};
pub use lacosmic::{CosmicRayParams, LaCosmic};
pub use satellite::{SatelliteParams, TrailDetector};
pub use starmask::{StarMaskParams, ThresholdStarMasker};

/// Flags bright sources so they can be excluded from sky statistics.
pub trait StarMasker: Send + Sync {
    fn detect(
        &self,
        image: &Array2<f32>,
        mask: &Array2<bool>,
        params: &StarMaskParams,
    ) -> Result<Array2<bool>>;
}

/// Flags cosmic-ray hits in a background-subtracted image.
pub trait CosmicRayDetector: Send + Sync {
    /// `noise` is the per-pixel 1-sigma noise of `image`.
    fn detect(
        &self,
        image: &Array2<f32>,
        noise: &Array2<f32>,
        mask: &Array2<bool>,
        params: &CosmicRayParams,
    ) -> Result<Array2<bool>>;
}

/// Flags linear satellite or aircraft trails.
pub trait SatelliteDetector: Send + Sync {
    fn detect(
        &self,
        image: &Array2<f32>,
        mask: &Array2<bool>,
        params: &SatelliteParams,
    ) -> Result<Array2<bool>>;
}

/// The algorithmic services used by both pipeline stages.
///
/// Shared read-only between workers.
#[derive(Clone)]
pub struct Detectors {
    pub background: Arc<dyn BackgroundEstimator>,
    pub stars: Arc<dyn StarMasker>,
    pub cosmic_rays: Arc<dyn CosmicRayDetector>,
    pub satellites: Arc<dyn SatelliteDetector>,
}

impl Default for Detectors {
    fn default() -> Self {
        Self {
            background: Arc::new(MeshBackground),
            stars: Arc::new(ThresholdStarMasker),
            cosmic_rays: Arc::new(LaCosmic),
            satellites: Arc::new(TrailDetector),
        }
    }
}

impl std::fmt::Debug for Detectors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detectors").finish_non_exhaustive()
    }
}
