use ndarray::{Array2, Zip};
use tracing::{debug, warn};

use crate::background::{BackgroundMethod, BackgroundParams, RmsMethod};
use crate::consts::{
    DEFAULT_CLIP_MAXITERS, VIGNETTING_BOX_SIZE, VIGNETTING_FILTER_SIZE, VIGNETTING_SIGCLIP,
    VIGNETTING_STAR_NSIGMA,
};
use crate::detection::{Detectors, StarMaskParams};
use crate::error::Result;
use crate::mask::grow_mask;
use crate::stats::{median_of, SigmaClipParams};

/// Choose the flat that carries real illumination structure: the
/// illumination flat if it differs from unity anywhere, else the pixel flat,
/// else none.
pub fn select_vignetting_flat<'a>(
    illum_flat: Option<&'a Array2<f32>>,
    pixel_flat: Option<&'a Array2<f32>>,
) -> Option<&'a Array2<f32>> {
    let varies = |f: &&Array2<f32>| f.iter().any(|&v| v != 1.0);
    illum_flat
        .filter(varies)
        .or_else(|| pixel_flat.filter(varies))
}

/// Pixels whose throughput falls below `1 - minimum_vig`.
///
/// Union of three estimators: the flat itself, the pixel values and the
/// smooth sky model, the latter two compared with the median sky over
/// unexcluded pixels. The union is grown by `grow`.
pub fn detect_vignetting(
    image: &Array2<f32>,
    flat: Option<&Array2<f32>>,
    exclude: &Array2<bool>,
    minimum_vig: f32,
    grow: f32,
    detectors: &Detectors,
) -> Result<Array2<bool>> {
    let level = 1.0 - minimum_vig;

    let mut vignetted = match flat {
        Some(flat) => flat.mapv(|v| v < level),
        None => Array2::from_elem(image.dim(), false),
    };

    let excluded = Zip::from(exclude)
        .and(&vignetted)
        .map_collect(|&e, &v| e || v);

    let star_params = StarMaskParams {
        nsigma: VIGNETTING_STAR_NSIGMA,
        clip: SigmaClipParams {
            sigma: 3.0,
            maxiters: DEFAULT_CLIP_MAXITERS,
        },
        ..StarMaskParams::default()
    };
    let stars = detectors.stars.detect(image, &excluded, &star_params)?;

    let bkg_params = BackgroundParams {
        box_size: VIGNETTING_BOX_SIZE,
        filter_size: VIGNETTING_FILTER_SIZE,
        clip: SigmaClipParams {
            sigma: VIGNETTING_SIGCLIP,
            maxiters: DEFAULT_CLIP_MAXITERS,
        },
        method: BackgroundMethod::SExtractor,
        rms_method: RmsMethod::Std,
    };
    let bkg_mask = Zip::from(&excluded)
        .and(&stars)
        .map_collect(|&e, &s| e || s);
    let model = detectors
        .background
        .estimate(image, &bkg_mask, &bkg_params)?;

    let mut sky: Vec<f32> = model
        .background
        .iter()
        .zip(excluded.iter())
        .filter(|(_, &e)| !e)
        .map(|(&b, _)| b)
        .collect();

    match median_of(&mut sky) {
        Some(sky_level) => {
            let cut = level * sky_level;
            debug!(sky_level, cut, "Vignetting sky threshold");
            Zip::from(&mut vignetted)
                .and(image)
                .and(&model.background)
                .for_each(|v, &px, &b| *v = *v || px < cut || b < cut);
        }
        None => warn!("No unmasked pixels left, sky-based vignetting detection skipped"),
    }

    Ok(grow_mask(&vignetted, grow))
}
