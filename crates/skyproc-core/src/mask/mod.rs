pub mod bitmask;
pub mod grow;
pub mod morphology;

pub use bitmask::{DefectBitmask, DefectFlag};
pub use grow::grow_mask;
