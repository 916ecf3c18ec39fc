use ndarray::{Array2, Zip};

use crate::error::{ensure_shape, Result};

/// Defect categories and their bit positions in the flag image.
///
/// Bit positions are a stable contract with downstream consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DefectFlag {
    StaticBadPixel = 0,
    ExternalDefect = 1,
    Saturated = 2,
    Zero = 3,
    NonFinite = 4,
    Vignetted = 5,
    CosmicRay = 6,
    SatelliteTrail = 7,
    NegativeStar = 8,
}

impl DefectFlag {
    pub const ALL: [DefectFlag; 9] = [
        DefectFlag::StaticBadPixel,
        DefectFlag::ExternalDefect,
        DefectFlag::Saturated,
        DefectFlag::Zero,
        DefectFlag::NonFinite,
        DefectFlag::Vignetted,
        DefectFlag::CosmicRay,
        DefectFlag::SatelliteTrail,
        DefectFlag::NegativeStar,
    ];

    pub fn bit(self) -> i32 {
        1 << self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            DefectFlag::StaticBadPixel => "bad pixel",
            DefectFlag::ExternalDefect => "external",
            DefectFlag::Saturated => "saturated",
            DefectFlag::Zero => "zero",
            DefectFlag::NonFinite => "nan/inf",
            DefectFlag::Vignetted => "vignetted",
            DefectFlag::CosmicRay => "cosmic ray",
            DefectFlag::SatelliteTrail => "satellite",
            DefectFlag::NegativeStar => "negative star",
        }
    }
}

/// Per-pixel defect register.
///
/// Bits can only be added, never cleared.
#[derive(Clone, Debug, PartialEq)]
pub struct DefectBitmask {
    bits: Array2<i32>,
}

impl DefectBitmask {
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            bits: Array2::zeros(shape),
        }
    }

    /// Wrap a flag image read back from disk.
    pub fn from_bits(bits: Array2<i32>) -> Self {
        Self { bits }
    }

    pub fn bits(&self) -> &Array2<i32> {
        &self.bits
    }

    pub fn into_bits(self) -> Array2<i32> {
        self.bits
    }

    pub fn dim(&self) -> (usize, usize) {
        self.bits.dim()
    }

    /// OR `flag` into every pixel where `mask` is true.
    pub fn insert(&mut self, flag: DefectFlag, mask: &Array2<bool>) -> Result<()> {
        ensure_shape(flag.name(), self.bits.dim(), mask.dim())?;
        let bit = flag.bit();
        Zip::from(&mut self.bits).and(mask).for_each(|b, &m| {
            if m {
                *b |= bit;
            }
        });
        Ok(())
    }

    /// OR another register into this one.
    pub fn merge(&mut self, other: &DefectBitmask) -> Result<()> {
        ensure_shape("defect mask", self.bits.dim(), other.dim())?;
        Zip::from(&mut self.bits)
            .and(&other.bits)
            .for_each(|b, &o| *b |= o);
        Ok(())
    }

    pub fn contains(&self, flag: DefectFlag) -> Array2<bool> {
        let bit = flag.bit();
        self.bits.mapv(|b| b & bit != 0)
    }

    /// Pixels carrying any of `flags`.
    pub fn contains_any(&self, flags: &[DefectFlag]) -> Array2<bool> {
        let bits = flags.iter().fold(0, |acc, f| acc | f.bit());
        self.bits.mapv(|b| b & bits != 0)
    }

    /// Pixels with at least one defect bit set.
    pub fn any(&self) -> Array2<bool> {
        self.bits.mapv(|b| b != 0)
    }

    pub fn count(&self, flag: DefectFlag) -> usize {
        let bit = flag.bit();
        self.bits.iter().filter(|&&b| b & bit != 0).count()
    }
}
