//! Stage D: per-function IDF-style weights and the global meta tables.
//!
//! A function present in every tag of its repo carries weight zero; one
//! present in a single tag of a long-lived repo carries the most. The meta
//! tables record per-repo totals and, for every fingerprint, the full list
//! of repos that ship it anywhere.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::SigEntry;
use crate::paths::DataLayout;

/// `uniqueFuncs` entry: every repo shipping this fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueEntry {
    pub hash: String,
    #[serde(rename = "OSS")]
    pub oss: Vec<String>,
}

struct RepoMeta {
    repo: String,
    ave_funcs: u64,
    all_funcs: u64,
    hashes: Vec<String>,
}

/// Repos with a signature file, sorted by file name.
pub fn signature_repos(layout: &DataLayout) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(layout.initial_sigs_dir())
        .with_context(|| format!("listing {}", layout.initial_sigs_dir().display()))?;
    let mut repos: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            DataLayout::repo_of_sig_file(name.to_str()?).map(String::from)
        })
        .collect();
    repos.sort();
    Ok(repos)
}

pub fn load_signature(layout: &DataLayout, repo: &str) -> Result<Vec<SigEntry>> {
    let path = layout.initial_sig_file(repo);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn build_repo(layout: &DataLayout, repo: &str) -> Result<Option<RepoMeta>> {
    // V is the number of collected tags, counted from the indices on disk.
    let tag_count = super::signatures::ordered_tags(&layout.repo_result_dir(repo))
        .map(|tags| tags.len())
        .unwrap_or(0);
    if tag_count == 0 {
        return Ok(None);
    }

    let signature = load_signature(layout, repo)?;
    let total = signature.len() as u64;

    let mut weights: BTreeMap<String, f64> = BTreeMap::new();
    let mut hashes = Vec::with_capacity(signature.len());
    for entry in &signature {
        if entry.vers.is_empty() {
            continue;
        }
        let weight = (tag_count as f64 / entry.vers.len() as f64).ln();
        weights.insert(entry.hash.clone(), weight);
        hashes.push(entry.hash.clone());
    }

    std::fs::write(
        layout.weights_file(repo),
        serde_json::to_string(&weights)?,
    )
    .with_context(|| format!("writing weights for {repo}"))?;

    Ok(Some(RepoMeta {
        repo: repo.to_string(),
        ave_funcs: total / tag_count as u64,
        all_funcs: total,
        hashes,
    }))
}

/// Build weights for every repo and write the three meta tables.
pub fn run(layout: &DataLayout, pool: &rayon::ThreadPool) -> Result<()> {
    let repos = signature_repos(layout)?;

    let metas: Vec<RepoMeta> = pool.install(|| {
        repos
            .par_iter()
            .filter_map(|repo| match build_repo(layout, repo) {
                Ok(meta) => meta,
                Err(err) => {
                    tracing::error!("meta for {repo}: {err:#}");
                    None
                }
            })
            .collect()
    });

    let mut ave_funcs: BTreeMap<String, u64> = BTreeMap::new();
    let mut all_funcs: BTreeMap<String, u64> = BTreeMap::new();
    let mut unique: BTreeMap<String, Vec<String>> = BTreeMap::new();
    // Fold in sorted repo order so the owner lists come out deterministic.
    let mut metas = metas;
    metas.sort_by(|a, b| a.repo.cmp(&b.repo));
    for meta in metas {
        ave_funcs.insert(meta.repo.clone(), meta.ave_funcs);
        all_funcs.insert(meta.repo.clone(), meta.all_funcs);
        for hash in meta.hashes {
            unique.entry(hash).or_default().push(meta.repo.clone());
        }
    }

    std::fs::write(layout.ave_funcs_file(), serde_json::to_string(&ave_funcs)?)
        .context("writing aveFuncs")?;
    std::fs::write(layout.all_funcs_file(), serde_json::to_string(&all_funcs)?)
        .context("writing allFuncs")?;

    let unique_entries: Vec<UniqueEntry> = unique
        .into_iter()
        .map(|(hash, oss)| UniqueEntry { hash, oss })
        .collect();
    std::fs::write(
        layout.unique_funcs_file(),
        serde_json::to_string(&unique_entries)?,
    )
    .context("writing uniqueFuncs")?;

    Ok(())
}

/// Load the `aveFuncs` table.
pub fn load_ave_funcs(layout: &DataLayout) -> Result<BTreeMap<String, u64>> {
    let text = std::fs::read_to_string(layout.ave_funcs_file()).context("reading aveFuncs")?;
    serde_json::from_str(&text).context("parsing aveFuncs")
}

/// Load `uniqueFuncs` as `hash -> owners`.
pub fn load_unique_funcs(layout: &DataLayout) -> Result<BTreeMap<String, Vec<String>>> {
    let text =
        std::fs::read_to_string(layout.unique_funcs_file()).context("reading uniqueFuncs")?;
    let entries: Vec<UniqueEntry> = serde_json::from_str(&text).context("parsing uniqueFuncs")?;
    Ok(entries
        .into_iter()
        .map(|entry| (entry.hash, entry.oss))
        .collect())
}
