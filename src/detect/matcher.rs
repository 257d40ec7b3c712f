//! Stage G: per-component coverage, weighted version vote, and usage
//! classification against the predicted version.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::target::TargetMap;
use crate::config::Config;
use crate::fingerprint::Fingerprint;
use crate::paths::DataLayout;
use crate::preprocess::{meta, SigEntry, VersionEntry};
use crate::tagindex::TagIndex;

/// One accepted component of the target.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub target: String,
    pub repo: String,
    pub version: String,
    pub used: u64,
    pub unused: u64,
    pub modified: u64,
    pub relocated: bool,
}

impl Detection {
    /// TSV line of the result file; `relocated` renders as the literal
    /// `True` / `False`.
    pub fn tsv_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.target,
            self.repo,
            self.version,
            self.used,
            self.unused,
            self.modified,
            if self.relocated { "True" } else { "False" }
        )
    }
}

fn load_component_fps(layout: &DataLayout, repo: &str) -> Result<HashSet<Fingerprint>> {
    let path = layout.component_sig_file(repo);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let entries: Vec<SigEntry> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(entries
        .iter()
        .filter_map(|entry| Fingerprint::parse(&entry.hash))
        .collect())
}

fn load_version_index(layout: &DataLayout, repo: &str) -> Result<Vec<VersionEntry>> {
    let path = layout.ver_idx_file(repo);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_weights(layout: &DataLayout, repo: &str) -> Result<HashMap<String, f64>> {
    let path = layout.weights_file(repo);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Weighted vote over the component's tags. Returns the winning version
/// name; ties break to the earliest tag index, the first maximum found
/// when scanning scores in tag order.
fn predict_version(
    layout: &DataLayout,
    repo: &str,
    common: &HashSet<Fingerprint>,
) -> Result<Option<String>> {
    let versions = load_version_index(layout, repo)?;
    if versions.is_empty() {
        return Ok(None);
    }
    let weights = load_weights(layout, repo)?;

    let mut scores = vec![0.0f64; versions.len()];
    for entry in meta::load_signature(layout, repo)? {
        let Some(fp) = Fingerprint::parse(&entry.hash) else {
            continue;
        };
        if !common.contains(&fp) {
            continue;
        }
        let weight = weights.get(&entry.hash).copied().unwrap_or(0.0);
        for idx in &entry.vers {
            if let Some(slot) = scores.get_mut(*idx as usize) {
                *slot += weight;
            }
        }
    }

    let mut best = 0usize;
    for (idx, score) in scores.iter().enumerate() {
        if *score > scores[best] {
            best = idx;
        }
    }
    Ok(versions.get(best).map(|entry| entry.ver.clone()))
}

/// True when one of the component relpaths still matches a target relpath
/// for the same function. The check is a substring containment, not a path
/// comparison: `/lib/foo.c` counts as in-place inside `/vendor/lib/foo.c`.
fn in_place(component_paths: &[String], target_paths: &[String]) -> bool {
    component_paths
        .iter()
        .any(|cp| target_paths.iter().any(|tp| tp.contains(cp.as_str())))
}

/// Evaluate one component against the target. `Ok(None)` means the
/// component did not clear the coverage threshold (or has no usable
/// metadata) and produces no record.
pub fn evaluate_component(
    layout: &DataLayout,
    config: &Config,
    repo: &str,
    target_name: &str,
    target: &TargetMap,
    ave_funcs: &BTreeMap<String, u64>,
) -> Result<Option<Detection>> {
    let ave = ave_funcs.get(repo).copied().unwrap_or(0);
    if ave == 0 {
        return Ok(None);
    }

    let component_fps = load_component_fps(layout, repo)?;
    let common: HashSet<Fingerprint> = component_fps
        .iter()
        .filter(|fp| target.contains(fp))
        .copied()
        .collect();
    let coverage = common.len() as f64 / ave as f64;
    if coverage < config.analysis.theta_match {
        return Ok(None);
    }

    let Some(version) = predict_version(layout, repo, &common)? else {
        return Ok(None);
    };

    // Classify every function of the predicted version.
    let predicted = TagIndex::read_from(&layout.hidx_file(repo, &version))?;
    let mut used = 0u64;
    let mut unused = 0u64;
    let mut modified = 0u64;
    let mut relocated = false;

    for (fp, component_paths) in predicted.iter() {
        if let Some(target_paths) = target.paths_of(fp) {
            used += 1;
            if !in_place(component_paths, target_paths) {
                relocated = true;
            }
            continue;
        }

        // Modified sibling: the first target function within distance.
        let sibling = fp.digest().and_then(|digest| {
            target
                .digests()
                .iter()
                .find(|(_, t_digest)| digest.diff(t_digest, false) <= config.analysis.d_mod)
        });
        match sibling {
            Some((t_fp, _)) => {
                modified += 1;
                if let Some(target_paths) = target.paths_of(t_fp) {
                    if !in_place(component_paths, target_paths) {
                        relocated = true;
                    }
                }
            }
            None => unused += 1,
        }
    }

    Ok(Some(Detection {
        target: target_name.to_string(),
        repo: repo.to_string(),
        version,
        used,
        unused,
        modified,
        relocated,
    }))
}
