/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Pipeline version written into every product header.
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// FITS logical record size in bytes.
pub const FITS_BLOCK_SIZE: usize = 2880;

/// FITS header card size in bytes.
pub const FITS_CARD_SIZE: usize = 80;

/// Suffix of in-flight artifacts; renamed away once fully written.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Default mask growth radius in pixels.
pub const DEFAULT_GROW_RADIUS: f32 = 1.5;

/// Default fractional throughput loss below which a pixel counts as vignetted.
pub const DEFAULT_MINIMUM_VIG: f32 = 0.5;

/// Sigma used when replacing flagged pixels during CCD correction.
pub const CCD_REPLACE_SIGMA: f32 = 3.0;

/// Iteration cap for every sigma-clipped statistic in the pipeline.
pub const DEFAULT_CLIP_MAXITERS: usize = 5;

/// Background mesh box size used by vignetting detection.
pub const VIGNETTING_BOX_SIZE: usize = 50;

/// Background mesh filter size used by vignetting detection.
pub const VIGNETTING_FILTER_SIZE: usize = 3;

/// Sigma-clip threshold used by vignetting detection.
pub const VIGNETTING_SIGCLIP: f32 = 5.0;

/// Detection threshold (in sigma) for star masking before vignetting detection.
pub const VIGNETTING_STAR_NSIGMA: f32 = 5.0;

/// Half-width of the local window used by median/mean replacement.
pub const REPLACE_WINDOW_RADIUS: usize = 5;

/// Minimum number of unflagged neighbours for a local replacement value;
/// below this the global clipped statistic is used.
pub const REPLACE_MIN_SAMPLES: usize = 5;

/// Minimum fraction of usable pixels for a background mesh box to count.
pub const BACKGROUND_MIN_BOX_FRACTION: f32 = 0.1;

/// Skewness bound above which the SExtractor estimator falls back to the median.
pub const SEXTRACTOR_SKEW_LIMIT: f32 = 0.3;

/// MAD to standard deviation for a normal distribution.
pub const MAD_TO_STD: f32 = 1.4826;

/// Floor for the L.A.Cosmic fine-structure image.
pub const LACOSMIC_FINE_FLOOR: f32 = 0.01;

/// Maximum number of Hough peaks examined by the satellite detector.
pub const TRAIL_MAX_PEAKS: usize = 32;

/// Angular resolution of the Hough accumulator, in bins over [0, pi).
pub const HOUGH_THETA_BINS: usize = 180;

/// Lower and upper percentile used by preview stretching.
pub const PREVIEW_PERCENTILES: (f32, f32) = (0.5, 99.5);
