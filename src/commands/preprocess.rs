use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::config::Config;
use crate::preprocess;

pub fn execute(config: &Config) -> Result<()> {
    let started = Instant::now();
    preprocess::run(config)?;
    println!(
        "{} finished in {:.1}s",
        "preprocess:".bold(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
