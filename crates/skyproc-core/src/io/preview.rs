use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};
use ndarray::Array2;

use crate::consts::PREVIEW_PERCENTILES;
use crate::error::Result;
use crate::filters::percentile_stretch;

/// Save an 8-bit grayscale PNG quick-look of `data`, stretched between the
/// preview percentiles.
pub fn save_preview(data: &Array2<f32>, path: &Path) -> Result<()> {
    let (stretched, _) = percentile_stretch(data, None, PREVIEW_PERCENTILES.0, PREVIEW_PERCENTILES.1);
    save_png(&stretched, path)
}

/// Save a flag image as black (clean) and white (flagged).
pub fn save_mask_preview(flags: &Array2<i32>, path: &Path) -> Result<()> {
    save_png(&flags.mapv(|f| if f != 0 { 1.0 } else { 0.0 }), path)
}

fn save_png(data: &Array2<f32>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();

    let mut img = GrayImage::new(w as u32, h as u32);
    for ((row, col), &v) in data.indexed_iter() {
        let val = (v.clamp(0.0, 1.0) * 255.0) as u8;
        img.put_pixel(col as u32, row as u32, Luma([val]));
    }

    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
