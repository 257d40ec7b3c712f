//! Detector: fingerprint a target tree (stage F) and match it against the
//! component database (stage G).
//!
//! Component evaluations are independent; a failure in one is logged and
//! its record omitted while the rest proceed. The result file's line order
//! is not part of the contract.

pub mod matcher;
pub mod target;

use anyhow::{Context, Result};
use colored::Colorize;
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::extract::temp::TempSpace;
use crate::extract::Extractor;
use crate::paths::DataLayout;
use crate::stop;
use matcher::Detection;
use target::TargetMap;

/// Scan one target tree. Returns the path of the written result file.
pub fn run(config: &Config, target_path: &Path) -> Result<PathBuf> {
    if !target_path.is_dir() {
        anyhow::bail!("target {} is not a directory", target_path.display());
    }
    let target_name = target_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("target")
        .to_string();

    let layout = DataLayout::new(config);
    layout.ensure_detector_dirs()?;
    std::fs::create_dir_all(layout.temp_dir()).context("creating temp dir")?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.cpu_workers())
        .build()
        .context("building detector worker pool")?;

    // Stage F: fingerprint the target in memory.
    let extractor = Extractor::new(config)?;
    let temp = TempSpace::create(&layout.temp_dir())?;
    let index = extractor.extract_tree(target_path, &target_name, &pool, &temp);
    let target = TargetMap::from_index(&index);
    println!(
        "{} {} functions across {} files in {}",
        "detect:".bold(),
        index.func_count,
        index.file_count,
        target_name
    );

    // Stage G: every component, in parallel.
    let ave_funcs = crate::preprocess::meta::load_ave_funcs(&layout)?;
    let mut repos: Vec<String> = std::fs::read_dir(layout.component_db_dir())
        .with_context(|| format!("listing {}", layout.component_db_dir().display()))?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            DataLayout::repo_of_sig_file(name.to_str()?).map(String::from)
        })
        .collect();
    repos.sort();

    let detections: Vec<Detection> = pool.install(|| {
        repos
            .par_iter()
            .filter_map(|repo| {
                if stop::requested() {
                    return None;
                }
                match matcher::evaluate_component(
                    &layout,
                    config,
                    repo,
                    &target_name,
                    &target,
                    &ave_funcs,
                ) {
                    Ok(detection) => detection,
                    Err(err) => {
                        tracing::error!("component {repo}: {err:#}");
                        None
                    }
                }
            })
            .collect()
    });

    let result_path = layout.result_file(&target_name);
    let mut file = std::fs::File::create(&result_path)
        .with_context(|| format!("creating {}", result_path.display()))?;
    for detection in &detections {
        writeln!(file, "{}", detection.tsv_line())?;
        println!(
            "  {} {} {} (used {}, modified {}, unused {})",
            "match".green(),
            detection.repo,
            detection.version,
            detection.used,
            detection.modified,
            detection.unused
        );
    }

    println!(
        "{} {} component(s) detected, report at {}",
        "detect:".bold(),
        detections.len(),
        result_path.display()
    );
    Ok(result_path)
}
