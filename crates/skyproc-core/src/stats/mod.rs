pub mod median;
pub mod sigma_clip;

pub use median::{median_of, percentile_of};
pub use sigma_clip::{
    masked_clipped_stats, mean_std, sigma_clip_values, sigma_clipped_stats, ClippedStats,
    SigmaClipParams,
};
