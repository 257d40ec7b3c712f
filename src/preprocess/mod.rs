//! Preprocessor: folds collector output into the derived artefacts the
//! detector consumes.
//!
//! Three stages, strictly in order: per-repo signatures and birth dates
//! (`signatures`), weights and meta tables (`meta`), and component
//! reduction (`reduce`). Everything here is derived state; deleting the
//! output directories and re-running reproduces it from collector output.

pub mod meta;
pub mod reduce;
pub mod signatures;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::paths::DataLayout;

/// One tag of a repo: `idx` is the dense integer identifier assigned in
/// lexicographic tag order, stringly-typed in the on-disk JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionEntry {
    pub ver: String,
    pub idx: String,
}

/// One function of a repo's signature: the tag indices that contain it,
/// strictly increasing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigEntry {
    pub hash: String,
    pub vers: Vec<u32>,
}

/// Birth-date sentinel for tags whose date is unknown; sorts before any
/// real date.
pub const NODATE: &str = "NODATE";

/// `true` when `a` is at or before `b` under the birth-date ordering.
pub fn date_le(a: &str, b: &str) -> bool {
    if a == NODATE {
        true
    } else if b == NODATE {
        false
    } else {
        a <= b
    }
}

/// The earlier of two dates under the birth-date ordering.
pub fn earlier_date<'a>(a: &'a str, b: &'a str) -> &'a str {
    if date_le(a, b) {
        a
    } else {
        b
    }
}

/// Execute stages C, D, E sequentially.
pub fn run(config: &Config) -> Result<()> {
    let layout = DataLayout::new(config);
    layout.ensure_preprocessor_dirs()?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.cpu_workers())
        .build()
        .context("building preprocessor worker pool")?;

    let folded = signatures::run(&layout, &pool)?;
    println!("{} {} repositories folded", "preprocess:".bold(), folded);

    meta::run(&layout, &pool)?;
    println!("{} meta tables written", "preprocess:".bold());

    let reduced = reduce::run(&layout, config, &pool)?;
    println!("{} {} component entries written", "preprocess:".bold(), reduced);

    Ok(())
}
