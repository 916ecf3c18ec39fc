mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skyproc", about = "CCD calibration and science image processing")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bias/dark/flat-correct raw frames and build defect masks
    Ccdproc(commands::ccdproc::CcdprocArgs),
    /// Background-subtract corrected frames and flag artefacts
    Sciproc(commands::sciproc::SciprocArgs),
    /// Run both stages over raw frames
    Run(commands::run::RunArgs),
    /// Print or save the default configuration
    Config(commands::config::ConfigArgs),
    /// Render a FITS product as a PNG quick-look
    Preview(commands::preview::PreviewArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Ccdproc(args) => commands::ccdproc::run(args),
        Commands::Sciproc(args) => commands::sciproc::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Preview(args) => commands::preview::run(args),
    }
}
