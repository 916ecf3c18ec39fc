use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::background::BackgroundParams;
use crate::consts::{DEFAULT_CLIP_MAXITERS, DEFAULT_GROW_RADIUS, DEFAULT_MINIMUM_VIG};
use crate::detection::{CosmicRayParams, SatelliteParams, StarMaskParams};
use crate::error::{Result, SkyprocError};
use crate::stats::SigmaClipParams;

/// What to write into flagged, non-saturated pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacePolicy {
    /// Leave flagged pixels as they are.
    #[default]
    None,
    Zero,
    /// Local sigma-clipped median of unflagged neighbours.
    Median,
    /// Local sigma-clipped mean of unflagged neighbours.
    Mean,
    /// Minimum over all unflagged pixels.
    Min,
    /// Maximum over all unflagged pixels.
    Max,
}

/// CCD correction settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CcdProcConfig {
    /// Detect vignetted pixels (default: false).
    #[serde(default)]
    pub mask_vig: bool,
    /// Fractional throughput loss that counts as vignetted (default: 0.5).
    #[serde(default = "default_minimum_vig")]
    pub minimum_vig: f32,
    /// Scale each amplifier by its gain (default: false).
    #[serde(default)]
    pub apply_gain: bool,
    /// Mask growth radius in pixels (default: 1.5).
    #[serde(default = "default_grow")]
    pub grow: f32,
    #[serde(default)]
    pub replace: ReplacePolicy,
}

fn default_minimum_vig() -> f32 {
    DEFAULT_MINIMUM_VIG
}

fn default_grow() -> f32 {
    DEFAULT_GROW_RADIUS
}

fn default_true() -> bool {
    true
}

impl Default for CcdProcConfig {
    fn default() -> Self {
        Self {
            mask_vig: false,
            minimum_vig: default_minimum_vig(),
            apply_gain: false,
            grow: default_grow(),
            replace: ReplacePolicy::None,
        }
    }
}

impl CcdProcConfig {
    pub fn validate(&self) -> Result<()> {
        validate_grow(self.grow)?;
        if !(0.0..1.0).contains(&self.minimum_vig) {
            return Err(SkyprocError::Configuration(format!(
                "minimum_vig must be in [0, 1), got {}",
                self.minimum_vig
            )));
        }
        Ok(())
    }
}

/// Science processing settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SciProcConfig {
    /// Extinction coefficient in mag per airmass (default: 0.0).
    #[serde(default)]
    pub coeff_airmass: f32,
    /// Header keyword holding the airmass when no table is supplied.
    #[serde(default = "default_airmass_key")]
    pub airmass_key: Option<String>,
    #[serde(default)]
    pub background: BackgroundParams,
    #[serde(default = "default_true")]
    pub mask_bright_star: bool,
    #[serde(default)]
    pub star_mask: StarMaskParams,
    #[serde(default = "default_true")]
    pub mask_cosmic_rays: bool,
    #[serde(default)]
    pub cosmic: CosmicRayParams,
    #[serde(default = "default_true")]
    pub mask_satellites: bool,
    #[serde(default)]
    pub satellite: SatelliteParams,
    #[serde(default)]
    pub mask_negative_star: bool,
    #[serde(default)]
    pub replace: ReplacePolicy,
    /// Clipping used by median/mean replacement (default: 5 sigma, 5 iterations).
    #[serde(default = "default_replace_clip")]
    pub replace_clip: SigmaClipParams,
    /// Mask growth radius in pixels (default: 1.5).
    #[serde(default = "default_grow")]
    pub grow: f32,
}

fn default_airmass_key() -> Option<String> {
    Some("AIRMASS".to_string())
}

fn default_replace_clip() -> SigmaClipParams {
    SigmaClipParams {
        sigma: 5.0,
        maxiters: DEFAULT_CLIP_MAXITERS,
    }
}

impl Default for SciProcConfig {
    fn default() -> Self {
        Self {
            coeff_airmass: 0.0,
            airmass_key: default_airmass_key(),
            background: BackgroundParams::default(),
            mask_bright_star: true,
            star_mask: StarMaskParams::default(),
            mask_cosmic_rays: true,
            cosmic: CosmicRayParams::default(),
            mask_satellites: true,
            satellite: SatelliteParams::default(),
            mask_negative_star: false,
            replace: ReplacePolicy::None,
            replace_clip: default_replace_clip(),
            grow: default_grow(),
        }
    }
}

impl SciProcConfig {
    pub fn validate(&self) -> Result<()> {
        validate_grow(self.grow)?;
        let bg = &self.background;
        if bg.box_size == 0 || bg.filter_size == 0 {
            return Err(SkyprocError::Configuration(
                "background box_size and filter_size must be at least 1".into(),
            ));
        }
        validate_clip("background", &bg.clip)?;
        validate_clip("star_mask", &self.star_mask.clip)?;
        validate_clip("replace_clip", &self.replace_clip)?;
        positive("star_mask.nsigma", self.star_mask.nsigma)?;
        positive("cosmic.contrast", self.cosmic.contrast)?;
        positive("cosmic.cr_threshold", self.cosmic.cr_threshold)?;
        positive("cosmic.neighbor_threshold", self.cosmic.neighbor_threshold)?;
        if self.cosmic.maxiter == 0 {
            return Err(SkyprocError::Configuration(
                "cosmic.maxiter must be at least 1".into(),
            ));
        }

        let sat = &self.satellite;
        positive("satellite.high_thresh", sat.high_thresh)?;
        if !(sat.low_thresh >= 0.0 && sat.low_thresh <= sat.high_thresh) {
            return Err(SkyprocError::Configuration(format!(
                "satellite.low_thresh must be in [0, high_thresh], got {}",
                sat.low_thresh
            )));
        }
        let (lo, hi) = sat.percentile;
        if !(0.0 <= lo && lo < hi && hi <= 100.0) {
            return Err(SkyprocError::Configuration(format!(
                "satellite.percentile must be ordered within [0, 100], got ({lo}, {hi})"
            )));
        }
        if !self.coeff_airmass.is_finite() {
            return Err(SkyprocError::Configuration(
                "coeff_airmass must be finite".into(),
            ));
        }
        Ok(())
    }
}

fn validate_grow(grow: f32) -> Result<()> {
    if grow.is_finite() && grow >= 0.0 {
        Ok(())
    } else {
        Err(SkyprocError::Configuration(format!(
            "grow must be a finite, non-negative radius, got {grow}"
        )))
    }
}

fn validate_clip(what: &str, clip: &SigmaClipParams) -> Result<()> {
    positive(&format!("{what}.sigma"), clip.sigma)
}

fn positive(what: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SkyprocError::Configuration(format!(
            "{what} must be positive, got {value}"
        )))
    }
}

/// Master calibration frames for one calibration group.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPaths {
    pub bias: Option<PathBuf>,
    pub dark: Option<PathBuf>,
    pub pixel_flat: Option<PathBuf>,
    pub illum_flat: Option<PathBuf>,
    pub supersky: Option<PathBuf>,
    /// FITS image whose nonzero pixels are externally flagged defects.
    pub defect_mask: Option<PathBuf>,
}

/// Batch-level settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Camera description (TOML).
    #[serde(default)]
    pub camera: Option<PathBuf>,
    #[serde(default = "default_detectors")]
    pub detectors: Vec<usize>,
    /// Requested worker count (default: 4).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Output directory for corrected frames; next to the raw frame if unset.
    #[serde(default)]
    pub science_dir: Option<PathBuf>,
}

fn default_detectors() -> Vec<usize> {
    vec![1]
}

fn default_workers() -> usize {
    4
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            camera: None,
            detectors: default_detectors(),
            workers: default_workers(),
            science_dir: None,
        }
    }
}

/// Full pipeline configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// One airmass per exposure, in input order.
    #[serde(default)]
    pub airmass: Option<Vec<f32>>,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub calibrations: CalibrationPaths,
    #[serde(default)]
    pub ccdproc: CcdProcConfig,
    #[serde(default)]
    pub sciproc: SciProcConfig,
}

impl PipelineConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.detectors.is_empty() {
            return Err(SkyprocError::Configuration(
                "at least one detector is required".into(),
            ));
        }
        if self
            .airmass
            .iter()
            .flatten()
            .any(|a| !a.is_finite() || *a < 1.0)
        {
            return Err(SkyprocError::Configuration(
                "airmass values must be finite and at least 1".into(),
            ));
        }
        self.ccdproc.validate()?;
        self.sciproc.validate()
    }
}
