pub mod fits;
pub mod naming;
pub mod preview;
pub mod store;

pub use fits::{Header, HeaderValue};
pub use naming::{
    ccd_mask_for, ccd_products, detector_from_name, sci_products, CcdProducts, SciProducts,
};
pub use store::{ArtifactState, FitsStore, ImageStore};
