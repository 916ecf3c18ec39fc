use std::path::PathBuf;

use console::Style;
use skyproc_core::pipeline::orchestrator::StageTally;
use skyproc_core::pipeline::{
    CcdProcConfig, ExposureResult, PipelineConfig, SciProcConfig, Stage, StageOutput,
};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    error: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            error: Style::new().red().bold(),
        }
    }
}

pub fn print_run_summary(config: &PipelineConfig, camera: &str, exposures: usize) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Skyproc"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(7)));
    println!();

    println!("  {:<14}{}", s.label.apply_to("Camera"), s.method.apply_to(camera));
    println!("  {:<14}{}", s.label.apply_to("Exposures"), s.value.apply_to(exposures));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Detectors"),
        s.value.apply_to(format!("{:?}", config.run.detectors))
    );
    println!("  {:<14}{}", s.label.apply_to("Workers"), s.value.apply_to(config.run.workers));
    match &config.run.science_dir {
        Some(dir) => println!("  {:<14}{}", s.label.apply_to("Output"), s.path.apply_to(dir.display())),
        None => println!("  {:<14}{}", s.label.apply_to("Output"), s.disabled.apply_to("next to raw frames")),
    }
    println!();

    println!("  {}", s.header.apply_to("Calibrations"));
    let cal = &config.calibrations;
    for (label, path) in [
        ("Bias", &cal.bias),
        ("Dark", &cal.dark),
        ("Pixel flat", &cal.pixel_flat),
        ("Illum flat", &cal.illum_flat),
        ("Supersky", &cal.supersky),
        ("Defects", &cal.defect_mask),
    ] {
        print_optional_path(&s, label, path);
    }
    println!();

    print_ccdproc(&s, &config.ccdproc);
    print_sciproc(&s, &config.sciproc);
}

pub fn print_ccdproc_summary(config: &CcdProcConfig) {
    print_ccdproc(&Styles::new(), config);
}

pub fn print_sciproc_summary(config: &SciProcConfig) {
    print_sciproc(&Styles::new(), config);
}

fn print_optional_path(s: &Styles, label: &str, path: &Option<PathBuf>) {
    match path {
        Some(p) => println!("    {:<14}{}", s.label.apply_to(label), s.path.apply_to(p.display())),
        None => println!("    {:<14}{}", s.label.apply_to(label), s.disabled.apply_to("none")),
    }
}

fn on_off(s: &Styles, label: &str, enabled: bool) {
    if enabled {
        println!("    {:<14}{}", s.label.apply_to(label), s.method.apply_to("on"));
    } else {
        println!("    {:<14}{}", s.label.apply_to(label), s.disabled.apply_to("off"));
    }
}

fn print_ccdproc(s: &Styles, config: &CcdProcConfig) {
    println!("  {}", s.header.apply_to("CCD correction"));
    on_off(s, "Vignetting", config.mask_vig);
    if config.mask_vig {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Min vig"),
            s.value.apply_to(config.minimum_vig)
        );
    }
    on_off(s, "Gain", config.apply_gain);
    println!("    {:<14}{}", s.label.apply_to("Grow"), s.value.apply_to(config.grow));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Replace"),
        s.method.apply_to(format!("{:?}", config.replace).to_lowercase())
    );
    println!();
}

fn print_sciproc(s: &Styles, config: &SciProcConfig) {
    println!("  {}", s.header.apply_to("Science processing"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Background"),
        s.method.apply_to(format!(
            "{:?}, box {}, filter {}",
            config.background.method, config.background.box_size, config.background.filter_size
        ))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Extinction"),
        s.value.apply_to(config.coeff_airmass)
    );
    on_off(s, "Bright stars", config.mask_bright_star);
    on_off(s, "Cosmic rays", config.mask_cosmic_rays);
    on_off(s, "Satellites", config.mask_satellites);
    on_off(s, "Neg. stars", config.mask_negative_star);
    println!("    {:<14}{}", s.label.apply_to("Grow"), s.value.apply_to(config.grow));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Replace"),
        s.method.apply_to(format!("{:?}", config.replace).to_lowercase())
    );
    println!();
}

/// Print per-stage counts and every failure. Returns the failure count.
pub fn print_stage_results<P>(stage: Stage, results: &[ExposureResult<StageOutput<P>>]) -> usize {
    let s = Styles::new();
    let tally = StageTally::of(results);

    println!(
        "  {:<20}{} written, {} skipped, {}",
        s.header.apply_to(stage),
        s.value.apply_to(tally.persisted),
        s.value.apply_to(tally.skipped),
        if tally.failed == 0 {
            s.method.apply_to("0 failed".to_string())
        } else {
            s.error.apply_to(format!("{} failed", tally.failed))
        }
    );
    for failure in results.iter().filter_map(|r| r.as_ref().err()) {
        println!("    {} {}", s.error.apply_to("x"), failure);
    }
    tally.failed
}
