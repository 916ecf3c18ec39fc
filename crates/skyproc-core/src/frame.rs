use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::io::fits::Header;
use crate::mask::DefectBitmask;

/// A raw detector readout, untrimmed.
#[derive(Clone, Debug)]
pub struct RawFrame {
    /// Detector counts, shape = (height, width).
    pub data: Array2<f32>,
    /// Amplifier number (1-based) for every pixel; 0 marks overscan or prescan.
    pub datasec: Array2<u8>,
    /// Primary header of the raw file.
    pub header: Header,
    /// Exposure time in seconds, if the header carried one.
    pub exptime: Option<f32>,
}

impl RawFrame {
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}

/// Per-detector electronics parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectorPar {
    /// 1-based detector number.
    pub det: usize,
    /// Saturation level in ADU.
    pub saturation: f32,
    /// Fraction of `saturation` where the response stops being linear.
    pub nonlinear: f32,
    /// Gain in e-/ADU, one entry per amplifier.
    pub gain: Vec<f32>,
}

impl DetectorPar {
    pub fn num_amplifiers(&self) -> usize {
        self.gain.len()
    }

    /// Counts above this level are flagged as saturated.
    pub fn saturation_level(&self) -> f32 {
        self.saturation * self.nonlinear
    }
}

/// Product type recorded in the `IMGTYP` header card.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    ScienceImage,
    WeightImage,
    FlagImage,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::ScienceImage => write!(f, "ScienceImage"),
            ImageKind::WeightImage => write!(f, "WeightImage"),
            ImageKind::FlagImage => write!(f, "FlagImage"),
        }
    }
}

/// Output of CCD correction: trimmed, calibrated counts plus the defect mask.
#[derive(Clone, Debug)]
pub struct CorrectedFrame {
    pub image: Array2<f32>,
    pub mask: DefectBitmask,
    pub header: Header,
}

/// Output of science processing.
#[derive(Clone, Debug)]
pub struct ScienceFrame {
    /// Background-subtracted image.
    pub image: Array2<f32>,
    /// Inverse-variance weight, zero wherever `mask` is nonzero.
    pub weight: Array2<f32>,
    pub mask: DefectBitmask,
    pub header: Header,
}
