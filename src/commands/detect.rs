use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::detect;

pub fn execute(config: &Config, target: &Path) -> Result<()> {
    let started = Instant::now();
    detect::run(config, target)?;
    println!(
        "{} finished in {:.1}s",
        "detect:".bold(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
