use std::path::{Path, PathBuf};

use ndarray::Array2;
use skyproc_core::camera::{CameraConfig, DetectorConfig};
use skyproc_core::frame::{DetectorPar, RawFrame};
use skyproc_core::io::fits::{self, Header};

/// Small deterministic generator so synthetic frames are reproducible.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1))
    }

    /// Uniform in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// `level` plus uniform noise in `[-amplitude, amplitude)`.
pub fn noisy_field(h: usize, w: usize, level: f32, amplitude: f32, seed: u64) -> Array2<f32> {
    let mut rng = Lcg::new(seed);
    Array2::from_shape_fn((h, w), |_| level + amplitude * (2.0 * rng.next_f32() - 1.0))
}

/// Raw frame read entirely by one amplifier, 10 s exposure.
pub fn raw_frame(data: Array2<f32>) -> RawFrame {
    let mut header = Header::new();
    header.set("EXPTIME", 10.0f64, Some("exposure time"));
    RawFrame {
        datasec: Array2::from_elem(data.dim(), 1u8),
        data,
        header,
        exptime: Some(10.0),
    }
}

pub fn detector(saturation: f32) -> DetectorPar {
    DetectorPar {
        det: 1,
        saturation,
        nonlinear: 1.0,
        gain: vec![1.0],
    }
}

pub fn camera_config(saturation: f32) -> CameraConfig {
    CameraConfig {
        name: "testcam".to_string(),
        detectors: vec![DetectorConfig {
            det: 1,
            saturation,
            nonlinear: 1.0,
            gain: vec![1.0],
            datasec: Vec::new(),
            exptime_key: "EXPTIME".to_string(),
            bad_pixels: Vec::new(),
            bad_pixel_file: None,
        }],
    }
}

/// Write a raw FITS frame with an EXPTIME card and return its path.
pub fn write_raw(dir: &Path, name: &str, data: &Array2<f32>) -> PathBuf {
    let path = dir.join(name);
    let mut header = Header::new();
    header.set("EXPTIME", 10.0f64, Some("exposure time"));
    header.set("OBJECT", "field", None);
    fits::write_primary(&path, data, &header).unwrap();
    path
}

pub fn count(mask: &Array2<bool>) -> usize {
    mask.iter().filter(|&&m| m).count()
}
