use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkyprocError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file {path}: {reason}")]
    InvalidFits { path: PathBuf, reason: String },

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("{what} has shape {found:?}, expected {expected:?}")]
    DimensionMismatch {
        what: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("cancelled")]
    Cancelled,

    #[error("Worker panicked: {0}")]
    WorkerPanic(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, SkyprocError>;

impl SkyprocError {
    pub(crate) fn invalid_fits(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFits {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Fail with [`SkyprocError::DimensionMismatch`] unless `found == expected`.
pub fn ensure_shape(what: &str, expected: (usize, usize), found: (usize, usize)) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(SkyprocError::DimensionMismatch {
            what: what.to_string(),
            expected,
            found,
        })
    }
}
