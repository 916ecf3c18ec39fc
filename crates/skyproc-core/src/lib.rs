pub mod background;
pub mod camera;
pub mod consts;
pub mod detection;
pub mod error;
pub mod filters;
pub mod frame;
pub mod io;
pub mod mask;
pub mod parallel;
pub mod pipeline;
pub mod stats;
