#[allow(dead_code)]
mod common;

use ndarray::Array2;
use skyproc_core::error::SkyprocError;
use skyproc_core::mask::{grow_mask, DefectBitmask, DefectFlag};

fn seeds(shape: (usize, usize), points: &[(usize, usize)]) -> Array2<bool> {
    let mut mask = Array2::from_elem(shape, false);
    for &p in points {
        mask[p] = true;
    }
    mask
}

#[test]
fn test_grow_is_superset() {
    let mut rng = common::Lcg::new(7);
    let mask = Array2::from_shape_fn((32, 40), |_| rng.next_f32() < 0.05);
    for radius in [0.0, 0.5, 1.0, 1.5, 2.5, 4.0] {
        let grown = grow_mask(&mask, radius);
        for (m, g) in mask.iter().zip(grown.iter()) {
            assert!(!m || *g, "radius {radius} lost a seed pixel");
        }
    }
}

#[test]
fn test_grow_zero_is_identity() {
    let mask = seeds((10, 10), &[(0, 0), (4, 5), (9, 9)]);
    assert_eq!(grow_mask(&mask, 0.0), mask);
}

#[test]
fn test_grow_empty_mask() {
    let mask = Array2::from_elem((8, 8), false);
    let grown = grow_mask(&mask, 3.0);
    assert_eq!(common::count(&grown), 0);
}

#[test]
fn test_grow_disk_shapes() {
    let mask = seeds((11, 11), &[(5, 5)]);

    // r = 1: plus sign.
    let grown = grow_mask(&mask, 1.0);
    assert_eq!(common::count(&grown), 5);
    assert!(grown[[4, 5]] && grown[[6, 5]] && grown[[5, 4]] && grown[[5, 6]]);
    assert!(!grown[[4, 4]]);

    // r = 1.5: full 3x3 block.
    let grown = grow_mask(&mask, 1.5);
    assert_eq!(common::count(&grown), 9);
    assert!(grown[[4, 4]] && grown[[6, 6]]);
    assert!(!grown[[3, 5]]);

    // r = 2: 3x3 block plus the four axis tips.
    let grown = grow_mask(&mask, 2.0);
    assert_eq!(common::count(&grown), 13);
    assert!(grown[[3, 5]] && grown[[7, 5]]);
}

#[test]
fn test_grow_clips_at_border() {
    let mask = seeds((5, 5), &[(0, 0)]);
    let grown = grow_mask(&mask, 1.5);
    assert_eq!(common::count(&grown), 4);
}

#[test]
fn test_grow_negative_radius_is_identity() {
    let mask = seeds((6, 6), &[(2, 3)]);
    assert_eq!(grow_mask(&mask, -2.0), mask);
}

#[test]
fn test_bitmask_bit_positions() {
    let expected = [1, 2, 4, 8, 16, 32, 64, 128, 256];
    for (flag, bit) in DefectFlag::ALL.iter().zip(expected) {
        assert_eq!(flag.bit(), bit);
    }
}

#[test]
fn test_bitmask_insert_is_monotonic() {
    let mut mask = DefectBitmask::new((4, 4));
    let a = seeds((4, 4), &[(0, 0), (1, 1)]);
    let b = seeds((4, 4), &[(1, 1), (3, 2)]);

    mask.insert(DefectFlag::Saturated, &a).unwrap();
    let before = mask.bits().clone();
    mask.insert(DefectFlag::CosmicRay, &b).unwrap();
    // Inserting an all-false mask leaves everything in place.
    mask.insert(DefectFlag::Saturated, &Array2::from_elem((4, 4), false))
        .unwrap();

    for (old, new) in before.iter().zip(mask.bits().iter()) {
        assert_eq!(old & new, *old, "a bit was cleared");
    }
    assert_eq!(mask.bits()[[1, 1]], 4 | 64);
    assert_eq!(mask.bits()[[3, 2]], 64);
    assert_eq!(mask.count(DefectFlag::Saturated), 2);
    assert_eq!(mask.count(DefectFlag::CosmicRay), 2);
    assert_eq!(common::count(&mask.any()), 3);
    assert_eq!(
        mask.contains_any(&[DefectFlag::Saturated, DefectFlag::Zero]),
        a
    );
}

#[test]
fn test_bitmask_merge() {
    let mut left = DefectBitmask::new((3, 3));
    left.insert(DefectFlag::Zero, &seeds((3, 3), &[(0, 0)])).unwrap();
    let mut right = DefectBitmask::new((3, 3));
    right
        .insert(DefectFlag::Vignetted, &seeds((3, 3), &[(0, 0), (2, 2)]))
        .unwrap();

    left.merge(&right).unwrap();
    assert_eq!(left.bits()[[0, 0]], 8 | 32);
    assert_eq!(left.bits()[[2, 2]], 32);
}

#[test]
fn test_bitmask_shape_mismatch() {
    let mut mask = DefectBitmask::new((4, 4));
    let err = mask
        .insert(DefectFlag::Zero, &Array2::from_elem((4, 5), true))
        .unwrap_err();
    assert!(matches!(err, SkyprocError::DimensionMismatch { .. }));
}
