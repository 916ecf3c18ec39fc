use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use skyproc_core::io::fits;
use skyproc_core::io::preview::{save_mask_preview, save_preview};

#[derive(Args)]
pub struct PreviewArgs {
    /// FITS image or flag file
    pub file: PathBuf,

    /// Render nonzero pixels white, zero black
    #[arg(long)]
    pub mask: bool,

    /// Output PNG (default: input with .png extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &PreviewArgs) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.file.with_extension("png"));

    if args.mask {
        let (_, flags) = fits::read_mask(&args.file)
            .with_context(|| format!("Failed to read {}", args.file.display()))?;
        save_mask_preview(&flags, &output)?;
    } else {
        let (_, data) = fits::read_image(&args.file)
            .with_context(|| format!("Failed to read {}", args.file.display()))?;
        save_preview(&data, &output)?;
    }

    println!("Preview saved to {}", output.display());
    Ok(())
}
