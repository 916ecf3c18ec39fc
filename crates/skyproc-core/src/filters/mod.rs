pub mod gaussian_blur;
pub mod gradient;
pub mod median_filter;
pub mod stretch;

pub use gaussian_blur::gaussian_blur_array;
pub use gradient::sobel;
pub use median_filter::median_filter;
pub use stretch::{percentile_stretch, StretchLimits};
