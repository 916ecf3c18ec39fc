#[allow(dead_code)]
mod common;

use approx::assert_abs_diff_eq;
use ndarray::{s, Array2};
use skyproc_core::detection::{Detectors, SatelliteParams};
use skyproc_core::io::Header;
use skyproc_core::mask::{DefectBitmask, DefectFlag};
use skyproc_core::pipeline::config::{ReplacePolicy, SciProcConfig};
use skyproc_core::pipeline::sciproc::{extinction_factor, science_process, weight_map};

fn incoming(shape: (usize, usize), flags: &[((usize, usize), DefectFlag)]) -> DefectBitmask {
    let mut mask = DefectBitmask::new(shape);
    for &(p, flag) in flags {
        let mut m = Array2::from_elem(shape, false);
        m[p] = true;
        mask.insert(flag, &m).unwrap();
    }
    mask
}

fn defective_field() -> (Array2<f32>, DefectBitmask) {
    let mut image = common::noisy_field(40, 40, 200.0, 3.0, 11);
    image[[10, 10]] = 70000.0;
    image[[30, 5]] = 0.0;
    let mask = incoming(
        (40, 40),
        &[
            ((10, 10), DefectFlag::Saturated),
            ((30, 5), DefectFlag::Zero),
        ],
    );
    (image, mask)
}

#[test]
fn test_extinction_factor() {
    assert_abs_diff_eq!(extinction_factor(0.3, 1.0), 1.0);
    assert_abs_diff_eq!(extinction_factor(0.2, 1.5), 10f32.powf(0.04), epsilon = 1e-6);
    assert!(extinction_factor(0.2, 2.0) > 1.0);
}

#[test]
fn test_weight_map_zero_where_flagged() {
    let rms = Array2::from_shape_vec((2, 2), vec![2.0, 0.0, 2.0, f32::NAN]).unwrap();
    let mut flagged = Array2::from_elem((2, 2), false);
    flagged[[1, 0]] = true;

    let weight = weight_map(&rms, &flagged);
    assert_abs_diff_eq!(weight[[0, 0]], 0.25);
    // Unusable variance falls back to the median usable variance.
    assert_abs_diff_eq!(weight[[0, 1]], 0.25);
    assert_eq!(weight[[1, 0]], 0.0);
    assert_abs_diff_eq!(weight[[1, 1]], 0.25);
}

#[test]
fn test_weight_map_without_usable_rms() {
    let rms = Array2::zeros((3, 3));
    let flagged = Array2::from_elem((3, 3), false);
    let weight = weight_map(&rms, &flagged);
    assert!(weight.iter().all(|&w| w == 1.0));
}

#[test]
fn test_weight_zero_iff_flagged() {
    let (image, mask) = defective_field();
    let frame = science_process(
        image,
        mask,
        Header::new(),
        None,
        None,
        &SciProcConfig::default(),
        &Detectors::default(),
    )
    .unwrap();

    for (&w, &b) in frame.weight.iter().zip(frame.mask.bits().iter()) {
        assert_eq!(w == 0.0, b != 0, "weight {w} with flags {b}");
    }
}

#[test]
fn test_incoming_flags_survive() {
    let (image, mask) = defective_field();
    let before = mask.bits().clone();
    let frame = science_process(
        image,
        mask,
        Header::new(),
        None,
        None,
        &SciProcConfig::default(),
        &Detectors::default(),
    )
    .unwrap();

    for (old, new) in before.iter().zip(frame.mask.bits().iter()) {
        assert_eq!(old & new, *old);
    }
}

#[test]
fn test_saturated_pixels_keep_value() {
    let run = |replace| {
        let (image, mask) = defective_field();
        let config = SciProcConfig {
            replace,
            ..SciProcConfig::default()
        };
        science_process(image, mask, Header::new(), None, None, &config, &Detectors::default())
            .unwrap()
    };

    let untouched = run(ReplacePolicy::None);
    let replaced = run(ReplacePolicy::Median);

    assert_eq!(replaced.image[[10, 10]], untouched.image[[10, 10]]);
    assert!(replaced.image[[10, 10]] > 60000.0);
    // The zero pixel is flagged and not saturated, so it is replaced.
    assert!(replaced.image[[30, 5]].abs() < 20.0);
}

#[test]
fn test_background_zero_at_zero_pixels() {
    let (image, mask) = defective_field();
    let config = SciProcConfig {
        mask_cosmic_rays: false,
        mask_satellites: false,
        ..SciProcConfig::default()
    };
    let frame =
        science_process(image, mask, Header::new(), None, None, &config, &Detectors::default())
            .unwrap();

    assert_eq!(frame.image[[30, 5]], 0.0);
    assert!(frame.image[[20, 20]].abs() < 10.0);
}

#[test]
fn test_negative_star_flagged() {
    let mut image = Array2::from_elem((30, 30), 100.0f32);
    image.slice_mut(s![10..13, 10..13]).fill(20.0);
    let config = SciProcConfig {
        mask_negative_star: true,
        ..SciProcConfig::default()
    };

    let frame = science_process(
        image,
        DefectBitmask::new((30, 30)),
        Header::new(),
        None,
        None,
        &config,
        &Detectors::default(),
    )
    .unwrap();

    assert_eq!(frame.mask.count(DefectFlag::NegativeStar), 25);
    assert_eq!(frame.mask.bits()[[11, 11]], DefectFlag::NegativeStar.bit());
    assert_eq!(frame.mask.count(DefectFlag::CosmicRay), 0);
    assert_eq!(frame.mask.count(DefectFlag::SatelliteTrail), 0);
    assert_eq!(frame.weight[[11, 11]], 0.0);
    assert_eq!(frame.weight[[0, 0]], 1.0);
}

#[test]
fn test_supersky_shape_checked() {
    let image = Array2::from_elem((8, 8), 10.0f32);
    let flat = Array2::from_elem((8, 9), 1.0f32);
    let result = science_process(
        image,
        DefectBitmask::new((8, 8)),
        Header::new(),
        None,
        Some(&flat),
        &SciProcConfig::default(),
        &Detectors::default(),
    );
    assert!(result.is_err());
}

fn only(config: SciProcConfig) -> SciProcConfig {
    SciProcConfig {
        mask_bright_star: false,
        mask_cosmic_rays: false,
        mask_satellites: false,
        ..config
    }
}

#[test]
fn test_cosmic_ray_flagged() {
    let mut image = common::noisy_field(64, 64, 500.0, 5.0, 21);
    image[[32, 40]] = 5000.0;

    let frame = science_process(
        image,
        DefectBitmask::new((64, 64)),
        Header::new(),
        Some(1.5),
        None,
        &SciProcConfig::default(),
        &Detectors::default(),
    )
    .unwrap();

    let bits = frame.mask.bits();
    assert_ne!(bits[[32, 40]] & DefectFlag::CosmicRay.bit(), 0);
    assert_eq!(bits[[32, 40]] & DefectFlag::SatelliteTrail.bit(), 0);
    assert_eq!(frame.weight[[32, 40]], 0.0);
}

#[test]
fn test_satellite_trail_flagged() {
    let mut image = Array2::zeros((100, 100));
    image.slice_mut(s![49..52, ..]).fill(1.0f32);
    let config = SciProcConfig {
        mask_satellites: true,
        satellite: SatelliteParams {
            sigma: 1.0,
            buf: 2,
            small_edge: 20,
            line_len: 60,
            line_gap: 5,
            ..Default::default()
        },
        ..only(SciProcConfig::default())
    };

    let frame = science_process(
        image,
        DefectBitmask::new((100, 100)),
        Header::new(),
        None,
        None,
        &config,
        &Detectors::default(),
    )
    .unwrap();

    let trail = DefectFlag::SatelliteTrail.bit();
    for col in [5, 50, 94] {
        assert_ne!(frame.mask.bits()[[50, col]] & trail, 0, "column {col} not flagged");
        assert_eq!(frame.weight[[50, col]], 0.0);
    }
    assert_eq!(frame.mask.bits()[[10, 50]], 0);
    assert_eq!(frame.mask.bits()[[90, 10]], 0);
}

#[test]
fn test_supersky_and_extinction_scale_flux() {
    let run = |airmass: Option<f32>, supersky: Option<&Array2<f32>>| {
        let mut image = Array2::from_elem((64, 64), 100.0f32);
        image.slice_mut(s![20..23, 20..23]).fill(1100.0);
        let config = SciProcConfig {
            coeff_airmass: 0.2,
            ..only(SciProcConfig::default())
        };
        science_process(
            image,
            DefectBitmask::new((64, 64)),
            Header::new(),
            airmass,
            supersky,
            &config,
            &Detectors::default(),
        )
        .unwrap()
    };

    let plain = run(None, None);
    assert_abs_diff_eq!(plain.image[[21, 21]], 1000.0, epsilon = 0.1);
    assert_abs_diff_eq!(plain.image[[5, 5]], 0.0, epsilon = 0.1);

    let flat = Array2::from_elem((64, 64), 2.0f32);
    let flattened = run(None, Some(&flat));
    assert_abs_diff_eq!(flattened.image[[21, 21]], 500.0, epsilon = 0.1);

    let factor = extinction_factor(0.2, 1.5);
    let corrected = run(Some(1.5), Some(&flat));
    assert_abs_diff_eq!(corrected.image[[21, 21]], 500.0 * factor, epsilon = 0.1);
    assert_abs_diff_eq!(corrected.image[[5, 5]], 0.0, epsilon = 0.1);
}
