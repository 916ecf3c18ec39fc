#[allow(dead_code)]
mod common;

use approx::assert_abs_diff_eq;
use ndarray::{s, Array2};
use skyproc_core::detection::Detectors;
use skyproc_core::error::SkyprocError;
use skyproc_core::io::HeaderValue;
use skyproc_core::mask::DefectFlag;
use skyproc_core::pipeline::ccdproc::{ccd_correct, reciprocal, trim_frame, MasterFrames};
use skyproc_core::pipeline::config::{CcdProcConfig, ReplacePolicy};
use skyproc_core::pipeline::replace::replace_flagged;
use skyproc_core::stats::SigmaClipParams;

fn no_defects(shape: (usize, usize)) -> Array2<bool> {
    Array2::from_elem(shape, false)
}

#[test]
fn test_reciprocal_is_zero_safe() {
    assert_abs_diff_eq!(reciprocal(4.0), 0.25);
    assert_eq!(reciprocal(0.0), 0.0);
    assert_eq!(reciprocal(-2.0), 0.0);
    assert_eq!(reciprocal(f32::NAN), 0.0);
    assert_eq!(reciprocal(f32::INFINITY), 0.0);
}

#[test]
fn test_saturated_and_zero_pixels_only() {
    let mut data = common::noisy_field(10, 10, 100.0, 5.0, 1);
    data[[2, 3]] = 70000.0;
    data[[7, 8]] = 0.0;
    let raw = common::raw_frame(data.clone());

    let corrected = ccd_correct(
        &raw,
        &common::detector(60000.0),
        &no_defects((10, 10)),
        &MasterFrames::default(),
        &CcdProcConfig::default(),
        &Detectors::default(),
    )
    .unwrap();

    let bits = corrected.mask.bits();
    for ((row, col), &b) in bits.indexed_iter() {
        match (row, col) {
            (2, 3) => assert_eq!(b, DefectFlag::Saturated.bit()),
            (7, 8) => assert_eq!(b, DefectFlag::Zero.bit()),
            _ => assert_eq!(b, 0, "unexpected flag at ({row}, {col})"),
        }
    }
    assert_eq!(corrected.image, data);
    assert_eq!(
        corrected.header.get("CCDPROC"),
        Some(&HeaderValue::Bool(true))
    );
}

#[test]
fn test_replace_median_on_hot_pixels() {
    let mut image = common::noisy_field(20, 20, 500.0, 2.0, 2);
    let hot = [(3, 4), (10, 10), (16, 2)];
    let mut flagged = no_defects((20, 20));
    for &p in &hot {
        image[p] = 9999.0;
        flagged[p] = true;
    }

    let written = replace_flagged(
        &mut image,
        &flagged,
        &no_defects((20, 20)),
        ReplacePolicy::Median,
        &SigmaClipParams::default(),
    )
    .unwrap();

    assert_eq!(written, 3);
    for &p in &hot {
        assert!((image[p] - 500.0).abs() <= 6.0, "{:?} -> {}", p, image[p]);
    }
}

#[test]
fn test_replace_policies() {
    let mut base = Array2::from_shape_fn((6, 6), |(r, c)| (r * 6 + c) as f32);
    base[[0, 0]] = -1000.0;
    let mut flagged = no_defects((6, 6));
    flagged[[0, 0]] = true;
    flagged[[5, 5]] = true;
    let mut protected = no_defects((6, 6));
    protected[[5, 5]] = true;
    let clip = SigmaClipParams::default();

    let mut image = base.clone();
    replace_flagged(&mut image, &flagged, &protected, ReplacePolicy::Zero, &clip).unwrap();
    assert_eq!(image[[0, 0]], 0.0);
    assert_eq!(image[[5, 5]], 35.0);

    let mut image = base.clone();
    replace_flagged(&mut image, &flagged, &protected, ReplacePolicy::Min, &clip).unwrap();
    assert_eq!(image[[0, 0]], 1.0);

    let mut image = base.clone();
    replace_flagged(&mut image, &flagged, &protected, ReplacePolicy::Max, &clip).unwrap();
    // 35 is flagged, so the largest unflagged value is 34.
    assert_eq!(image[[0, 0]], 34.0);

    let mut image = base.clone();
    let written =
        replace_flagged(&mut image, &flagged, &protected, ReplacePolicy::None, &clip).unwrap();
    assert_eq!(written, 0);
    assert_eq!(image, base);
}

#[test]
fn test_replace_zero_with_every_pixel_flagged() {
    let flagged = Array2::from_elem((4, 4), true);
    let protected = no_defects((4, 4));
    let clip = SigmaClipParams::default();

    let mut image = Array2::from_elem((4, 4), 123.0f32);
    let written =
        replace_flagged(&mut image, &flagged, &protected, ReplacePolicy::Zero, &clip).unwrap();
    assert_eq!(written, 16);
    assert!(image.iter().all(|&v| v == 0.0));

    // Statistics need unflagged pixels, so these leave the frame alone.
    for policy in [ReplacePolicy::Median, ReplacePolicy::Min] {
        let mut image = Array2::from_elem((4, 4), 123.0f32);
        let written = replace_flagged(&mut image, &flagged, &protected, policy, &clip).unwrap();
        assert_eq!(written, 0);
        assert!(image.iter().all(|&v| v == 123.0));
    }
}

#[test]
fn test_external_defects_replaced_in_ccd_stage() {
    let mut data = common::noisy_field(20, 20, 500.0, 2.0, 3);
    let mut external = no_defects((20, 20));
    for p in [(1, 1), (9, 12), (18, 5)] {
        data[p] = 9999.0;
        external[p] = true;
    }
    let raw = common::raw_frame(data);
    let masters = MasterFrames {
        defect_mask: Some(external.clone()),
        ..MasterFrames::default()
    };
    let config = CcdProcConfig {
        replace: ReplacePolicy::Median,
        ..CcdProcConfig::default()
    };

    let corrected = ccd_correct(
        &raw,
        &common::detector(60000.0),
        &no_defects((20, 20)),
        &masters,
        &config,
        &Detectors::default(),
    )
    .unwrap();

    assert_eq!(corrected.mask.contains(DefectFlag::ExternalDefect), external);
    for p in [(1, 1), (9, 12), (18, 5)] {
        assert!((corrected.image[p] - 500.0).abs() <= 6.0);
    }
}

#[test]
fn test_saturated_pixels_not_replaced_in_ccd_stage() {
    let mut data = common::noisy_field(12, 12, 300.0, 3.0, 4);
    data[[6, 6]] = 65000.0;
    let config = CcdProcConfig {
        replace: ReplacePolicy::Median,
        ..CcdProcConfig::default()
    };

    let corrected = ccd_correct(
        &common::raw_frame(data),
        &common::detector(60000.0),
        &no_defects((12, 12)),
        &MasterFrames::default(),
        &config,
        &Detectors::default(),
    )
    .unwrap();

    assert_eq!(corrected.image[[6, 6]], 65000.0);
    assert_eq!(corrected.mask.bits()[[6, 6]], DefectFlag::Saturated.bit());
}

#[test]
fn test_vignetted_corner_block() {
    let data = common::noisy_field(20, 20, 100.0, 5.0, 5);
    let mut illum = Array2::from_elem((20, 20), 1.0f32);
    illum.slice_mut(s![0..3, 0..3]).fill(0.5);
    let masters = MasterFrames {
        illum_flat: Some(illum),
        ..MasterFrames::default()
    };
    let config = CcdProcConfig {
        mask_vig: true,
        minimum_vig: 0.3,
        grow: 0.0,
        ..CcdProcConfig::default()
    };

    let corrected = ccd_correct(
        &common::raw_frame(data),
        &common::detector(60000.0),
        &no_defects((20, 20)),
        &masters,
        &config,
        &Detectors::default(),
    )
    .unwrap();

    for ((row, col), &b) in corrected.mask.bits().indexed_iter() {
        if row < 3 && col < 3 {
            assert_eq!(b, DefectFlag::Vignetted.bit(), "({row}, {col})");
        } else {
            assert_eq!(b, 0, "({row}, {col})");
        }
    }
}

#[test]
fn test_bias_dark_flat_order() {
    let data = Array2::from_elem((4, 4), 1000.0f32);
    let masters = MasterFrames {
        bias: Some(Array2::from_elem((4, 4), 100.0)),
        dark: Some(Array2::from_elem((4, 4), 2.0)),
        pixel_flat: Some(Array2::from_elem((4, 4), 2.0)),
        illum_flat: Some(Array2::from_elem((4, 4), 0.5)),
        defect_mask: None,
    };

    let corrected = ccd_correct(
        &common::raw_frame(data),
        &common::detector(60000.0),
        &no_defects((4, 4)),
        &masters,
        &CcdProcConfig::default(),
        &Detectors::default(),
    )
    .unwrap();

    // ((1000 - 100) - 2 * 10) / 2 / 0.5
    for &v in corrected.image.iter() {
        assert_abs_diff_eq!(v, 880.0, epsilon = 1e-3);
    }
}

#[test]
fn test_zero_flat_gives_flagged_zero_not_error() {
    let data = Array2::from_elem((4, 4), 1000.0f32);
    let mut flat = Array2::from_elem((4, 4), 1.0f32);
    flat[[1, 2]] = 0.0;
    let masters = MasterFrames {
        pixel_flat: Some(flat),
        ..MasterFrames::default()
    };

    let corrected = ccd_correct(
        &common::raw_frame(data),
        &common::detector(60000.0),
        &no_defects((4, 4)),
        &masters,
        &CcdProcConfig::default(),
        &Detectors::default(),
    )
    .unwrap();

    assert_eq!(corrected.image[[1, 2]], 0.0);
    assert_eq!(corrected.image[[0, 0]], 1000.0);
}

#[test]
fn test_nan_pixels_zeroed_and_flagged() {
    let mut data = Array2::from_elem((5, 5), 50.0f32);
    data[[2, 2]] = f32::NAN;
    let corrected = ccd_correct(
        &common::raw_frame(data),
        &common::detector(60000.0),
        &no_defects((5, 5)),
        &MasterFrames::default(),
        &CcdProcConfig::default(),
        &Detectors::default(),
    )
    .unwrap();

    assert_eq!(corrected.image[[2, 2]], 0.0);
    assert_eq!(corrected.mask.bits()[[2, 2]], DefectFlag::NonFinite.bit());
}

#[test]
fn test_gain_applied_per_amplifier() {
    let data = Array2::from_elem((4, 4), 10.0f32);
    let mut raw = common::raw_frame(data);
    raw.datasec.slice_mut(s![.., 2..]).fill(2);
    let mut det = common::detector(60000.0);
    det.gain = vec![1.5, 3.0];
    let config = CcdProcConfig {
        apply_gain: true,
        ..CcdProcConfig::default()
    };

    let corrected = ccd_correct(
        &raw,
        &det,
        &no_defects((4, 4)),
        &MasterFrames::default(),
        &config,
        &Detectors::default(),
    )
    .unwrap();

    assert_abs_diff_eq!(corrected.image[[0, 0]], 15.0);
    assert_abs_diff_eq!(corrected.image[[3, 3]], 30.0);
    assert_eq!(corrected.header.get_f64("GAIN"), Some(1.0));
}

#[test]
fn test_overscan_border_trimmed() {
    let data = Array2::from_shape_fn((6, 8), |(r, c)| (r * 8 + c) as f32 + 1.0);
    let mut raw = common::raw_frame(data);
    raw.datasec.fill(0);
    raw.datasec.slice_mut(s![1..5, 2..7]).fill(1);
    let mut bpm = no_defects((6, 8));
    bpm[[1, 2]] = true;

    let corrected = ccd_correct(
        &raw,
        &common::detector(60000.0),
        &bpm,
        &MasterFrames::default(),
        &CcdProcConfig::default(),
        &Detectors::default(),
    )
    .unwrap();

    assert_eq!(corrected.image.dim(), (4, 5));
    assert_eq!(corrected.image[[0, 0]], 11.0);
    assert_eq!(corrected.mask.bits()[[0, 0]], DefectFlag::StaticBadPixel.bit());
}

#[test]
fn test_non_rectangular_data_section_is_shape_error() {
    let data = Array2::from_elem((6, 6), 1.0f32);
    let mut exclude = Array2::from_elem((6, 6), false);
    exclude.slice_mut(s![0..3, 0..3]).fill(true);

    let err = trim_frame(&data, &exclude).unwrap_err();
    assert!(matches!(err, SkyprocError::Shape(_)));

    let mut raw = common::raw_frame(data);
    raw.datasec.slice_mut(s![0..3, 0..3]).fill(0);
    let err = ccd_correct(
        &raw,
        &common::detector(60000.0),
        &no_defects((6, 6)),
        &MasterFrames::default(),
        &CcdProcConfig::default(),
        &Detectors::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SkyprocError::Shape(_)));
}

#[test]
fn test_master_shape_mismatch() {
    let masters = MasterFrames {
        bias: Some(Array2::zeros((5, 4))),
        ..MasterFrames::default()
    };
    let err = ccd_correct(
        &common::raw_frame(Array2::from_elem((4, 4), 1.0)),
        &common::detector(60000.0),
        &no_defects((4, 4)),
        &masters,
        &CcdProcConfig::default(),
        &Detectors::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SkyprocError::DimensionMismatch { .. }));
}

#[test]
fn test_dark_without_exposure_time_is_configuration_error() {
    let mut raw = common::raw_frame(Array2::from_elem((4, 4), 1.0));
    raw.exptime = None;
    let masters = MasterFrames {
        dark: Some(Array2::zeros((4, 4))),
        ..MasterFrames::default()
    };
    let err = ccd_correct(
        &raw,
        &common::detector(60000.0),
        &no_defects((4, 4)),
        &masters,
        &CcdProcConfig::default(),
        &Detectors::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SkyprocError::Configuration(_)));
}

#[test]
fn test_missing_masters_listed() {
    let masters = MasterFrames {
        bias: Some(Array2::zeros((2, 2))),
        ..MasterFrames::default()
    };
    assert_eq!(
        masters.missing(),
        vec!["dark", "pixel flat", "illumination flat"]
    );
}
