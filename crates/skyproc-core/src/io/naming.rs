use std::path::{Path, PathBuf};

/// Artifacts written by the CCD stage for one exposure and detector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CcdProducts {
    /// `<root>_det{DD}_proc.fits`
    pub image: PathBuf,
    /// `<root>_det{DD}_ccdmask.fits`
    pub mask: PathBuf,
}

/// Artifacts written by the science stage for one corrected image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SciProducts {
    pub image: PathBuf,
    pub weight: PathBuf,
    pub flag: PathBuf,
}

impl SciProducts {
    pub fn all(&self) -> [&Path; 3] {
        [&self.image, &self.weight, &self.flag]
    }
}

impl CcdProducts {
    pub fn all(&self) -> [&Path; 2] {
        [&self.image, &self.mask]
    }
}

/// Output names for a raw frame.
///
/// Compression suffixes (`.gz`, `.fz`) and the FITS extension are stripped
/// from the file name. Outputs land in `science_dir` when given, otherwise
/// next to the raw file.
pub fn ccd_products(raw: &Path, det: usize, science_dir: Option<&Path>) -> CcdProducts {
    let root = root_name(raw);
    let dir = match science_dir {
        Some(dir) => dir.to_path_buf(),
        None => raw.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    CcdProducts {
        image: dir.join(format!("{root}_det{det:02}_proc.fits")),
        mask: dir.join(format!("{root}_det{det:02}_ccdmask.fits")),
    }
}

/// Science-stage names derived from a corrected image path.
pub fn sci_products(proc_image: &Path) -> SciProducts {
    let name = file_name(proc_image);
    let stem = name
        .strip_suffix("_proc.fits")
        .map(str::to_string)
        .unwrap_or_else(|| strip_extension(&name).to_string());
    let dir = proc_image.parent().map(Path::to_path_buf).unwrap_or_default();
    SciProducts {
        image: dir.join(format!("{stem}_sci.fits")),
        weight: dir.join(format!("{stem}_sci.weight.fits")),
        flag: dir.join(format!("{stem}_flag.fits")),
    }
}

/// The CCD-stage mask written alongside a corrected image.
pub fn ccd_mask_for(proc_image: &Path) -> PathBuf {
    let name = file_name(proc_image);
    let mask = match name.strip_suffix("_proc.fits") {
        Some(stem) => format!("{stem}_ccdmask.fits"),
        None => format!("{}_ccdmask.fits", strip_extension(&name)),
    };
    proc_image.with_file_name(mask)
}

/// Detector number embedded in an output name (`..._det07_...`).
pub fn detector_from_name(path: &Path) -> Option<usize> {
    let name = file_name(path);
    let (_, rest) = name.rsplit_once("_det")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn root_name(raw: &Path) -> String {
    let name = file_name(raw);
    let mut stem = name.as_str();
    for suffix in [".gz", ".fz"] {
        if let Some(s) = stem.strip_suffix(suffix) {
            stem = s;
        }
    }
    strip_extension(stem).to_string()
}

fn strip_extension(name: &str) -> &str {
    for ext in [".fits", ".fit", ".fts"] {
        if let Some(s) = name.strip_suffix(ext) {
            return s;
        }
    }
    name
}
