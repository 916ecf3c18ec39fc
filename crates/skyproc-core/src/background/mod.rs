pub mod mesh;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stats::SigmaClipParams;

pub use mesh::MeshBackground;

/// Per-box location estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMethod {
    #[default]
    Median,
    Mean,
    /// `2.5 * median - 1.5 * mean`, or the median for skewed boxes.
    SExtractor,
}

/// Per-box noise estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RmsMethod {
    #[default]
    Std,
    /// Median absolute deviation scaled to a Gaussian sigma.
    Mad,
}

/// Mesh background configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackgroundParams {
    /// Box edge length in pixels (default: 200).
    #[serde(default = "default_box_size")]
    pub box_size: usize,
    /// Median filter width applied to the box mesh (default: 3).
    #[serde(default = "default_filter_size")]
    pub filter_size: usize,
    /// Sigma clipping inside each box (default: 5 sigma, 5 iterations).
    #[serde(default = "default_clip")]
    pub clip: SigmaClipParams,
    #[serde(default)]
    pub method: BackgroundMethod,
    #[serde(default)]
    pub rms_method: RmsMethod,
}

fn default_box_size() -> usize {
    200
}

fn default_filter_size() -> usize {
    3
}

fn default_clip() -> SigmaClipParams {
    SigmaClipParams {
        sigma: 5.0,
        maxiters: crate::consts::DEFAULT_CLIP_MAXITERS,
    }
}

impl Default for BackgroundParams {
    fn default() -> Self {
        Self {
            box_size: default_box_size(),
            filter_size: default_filter_size(),
            clip: default_clip(),
            method: BackgroundMethod::default(),
            rms_method: RmsMethod::default(),
        }
    }
}

/// Smooth sky estimate and its noise, both at full image resolution.
#[derive(Clone, Debug)]
pub struct BackgroundModel {
    pub background: Array2<f32>,
    pub rms: Array2<f32>,
}

/// Estimates a 2D background while ignoring pixels set in `mask`.
pub trait BackgroundEstimator: Send + Sync {
    fn estimate(
        &self,
        image: &Array2<f32>,
        mask: &Array2<bool>,
        params: &BackgroundParams,
    ) -> Result<BackgroundModel>;
}
