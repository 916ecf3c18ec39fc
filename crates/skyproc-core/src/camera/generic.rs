use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::camera::Camera;
use crate::error::{ensure_shape, Result, SkyprocError};
use crate::frame::{DetectorPar, RawFrame};
use crate::io::fits;

/// Half-open pixel rectangle, 0-based: columns `x0..x1`, rows `y0..y1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub x0: usize,
    pub x1: usize,
    pub y0: usize,
    pub y1: usize,
}

/// One detector of a [`CameraConfig`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub det: usize,
    pub saturation: f32,
    #[serde(default = "default_nonlinear")]
    pub nonlinear: f32,
    /// Gain per amplifier in e-/ADU.
    #[serde(default = "default_gain")]
    pub gain: Vec<f32>,
    /// Data section per amplifier, in amplifier order. Empty means the whole
    /// frame is read by a single amplifier.
    #[serde(default)]
    pub datasec: Vec<Section>,
    #[serde(default = "default_exptime_key")]
    pub exptime_key: String,
    /// Static bad pixels as (row, col).
    #[serde(default)]
    pub bad_pixels: Vec<(usize, usize)>,
    /// FITS image whose nonzero pixels are bad, in raw geometry.
    #[serde(default)]
    pub bad_pixel_file: Option<PathBuf>,
}

fn default_nonlinear() -> f32 {
    1.0
}

fn default_gain() -> Vec<f32> {
    vec![1.0]
}

fn default_exptime_key() -> String {
    "EXPTIME".to_string()
}

/// Camera description loaded from TOML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    pub detectors: Vec<DetectorConfig>,
}

/// A camera fully described by a [`CameraConfig`], reading single-HDU FITS
/// raw frames.
#[derive(Clone, Debug)]
pub struct GenericCamera {
    config: CameraConfig,
}

impl GenericCamera {
    pub fn new(config: CameraConfig) -> Result<Self> {
        for det in &config.detectors {
            if det.gain.is_empty() {
                return Err(SkyprocError::Configuration(format!(
                    "detector {} has no amplifier gains",
                    det.det
                )));
            }
            if !det.datasec.is_empty() && det.datasec.len() != det.gain.len() {
                return Err(SkyprocError::Configuration(format!(
                    "detector {}: {} data sections for {} amplifiers",
                    det.det,
                    det.datasec.len(),
                    det.gain.len()
                )));
            }
            if det.datasec.len() > u8::MAX as usize {
                return Err(SkyprocError::Configuration(format!(
                    "detector {}: too many amplifiers",
                    det.det
                )));
            }
        }
        Ok(Self { config })
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: CameraConfig = toml::from_str(&text)?;
        Self::new(config)
    }

    fn detector_config(&self, det: usize) -> Result<&DetectorConfig> {
        self.config
            .detectors
            .iter()
            .find(|d| d.det == det)
            .ok_or_else(|| {
                SkyprocError::Configuration(format!(
                    "camera {} has no detector {det}",
                    self.config.name
                ))
            })
    }
}

impl Camera for GenericCamera {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn detector(&self, det: usize) -> Result<DetectorPar> {
        let cfg = self.detector_config(det)?;
        Ok(DetectorPar {
            det,
            saturation: cfg.saturation,
            nonlinear: cfg.nonlinear,
            gain: cfg.gain.clone(),
        })
    }

    fn read_raw(&self, path: &Path, det: usize) -> Result<RawFrame> {
        let cfg = self.detector_config(det)?;
        let (header, data) = fits::read_image(path)?;
        let (h, w) = data.dim();

        let mut datasec = Array2::<u8>::zeros((h, w));
        if cfg.datasec.is_empty() {
            datasec.fill(1);
        } else {
            for (amp, sec) in cfg.datasec.iter().enumerate() {
                if sec.x0 >= sec.x1 || sec.y0 >= sec.y1 || sec.x1 > w || sec.y1 > h {
                    return Err(SkyprocError::Shape(format!(
                        "data section {sec:?} of amplifier {} outside {h}x{w} frame",
                        amp + 1
                    )));
                }
                datasec
                    .slice_mut(ndarray::s![sec.y0..sec.y1, sec.x0..sec.x1])
                    .fill(amp as u8 + 1);
            }
        }

        let exptime = header.get_f64(&cfg.exptime_key).map(|t| t as f32);
        if exptime.is_none() {
            warn!(path = %path.display(), key = %cfg.exptime_key, "No exposure time in header");
        }
        debug!(path = %path.display(), det, ?exptime, "Raw frame loaded");

        Ok(RawFrame {
            data,
            datasec,
            header,
            exptime,
        })
    }

    fn bad_pixel_mask(&self, det: usize, shape: (usize, usize)) -> Result<Array2<bool>> {
        let cfg = self.detector_config(det)?;
        let mut bpm = match &cfg.bad_pixel_file {
            Some(file) => {
                let (_, flags) = fits::read_mask(file)?;
                ensure_shape("bad pixel file", shape, flags.dim())?;
                flags.mapv(|v| v != 0)
            }
            None => Array2::from_elem(shape, false),
        };
        for &(row, col) in &cfg.bad_pixels {
            if let Some(px) = bpm.get_mut([row, col]) {
                *px = true;
            }
        }
        Ok(bpm)
    }
}
