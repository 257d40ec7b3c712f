use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::collector;
use crate::config::Config;

pub fn execute(config: &Config) -> Result<()> {
    let started = Instant::now();
    collector::run(config)?;
    println!(
        "{} finished in {:.1}s",
        "collector:".bold(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
