use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lineage::commands;
use lineage::config::Config;
use lineage::{logging, stop};

#[derive(Parser)]
#[command(
    author,
    version = env!("CARGO_PKG_VERSION"),
    about = "Detects reused open-source C/C++ components and their versions",
    long_about = None
)]
struct Cli {
    /// Configuration file (YAML). Default: ./lineage.yaml when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk every clone under repos/ and index each tag's functions
    Collect,

    /// Fold collector output into signatures, weights and the component DB
    Preprocess,

    /// Fingerprint a target tree and report reused components
    Detect {
        /// Root of the source tree to scan
        target: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.logging);
    stop::install_handler();

    match cli.command {
        Commands::Collect => commands::collect::execute(&config)?,
        Commands::Preprocess => commands::preprocess::execute(&config)?,
        Commands::Detect { target } => commands::detect::execute(&config, &target)?,
    }

    Ok(())
}
