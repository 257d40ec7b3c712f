//! Stage E: component reduction, "a function belongs to the earliest repo
//! that ships it".
//!
//! For every repo S, competitors that ship S's functions with an equal or
//! earlier birth date accumulate candidate counts. A competitor explaining
//! at least `theta_reduce` of its own average footprint is declared a
//! likely ancestor of S, and the shared functions leave S's component
//! entry. The ratio test keeps a single accidentally-shared utility from
//! re-attributing a whole repo.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{meta, SigEntry, NODATE};
use crate::config::Config;
use crate::paths::DataLayout;

/// Per-function birth dates of one repo.
fn load_birth_dates(layout: &DataLayout, repo: &str) -> HashMap<String, String> {
    let Ok(text) = std::fs::read_to_string(layout.func_date_file(repo)) else {
        return HashMap::new();
    };
    text.lines()
        .filter_map(|line| {
            let (hash, date) = line.split_once('\t')?;
            (!hash.is_empty()).then(|| (hash.to_string(), date.to_string()))
        })
        .collect()
}

fn reduce_repo(
    layout: &DataLayout,
    repo: &str,
    ave_funcs: &BTreeMap<String, u64>,
    unique: &BTreeMap<String, Vec<String>>,
    theta: f64,
) -> Result<bool> {
    let signature = meta::load_signature(layout, repo)?;
    if signature.is_empty() {
        return Ok(false);
    }

    let births = load_birth_dates(layout, repo);
    let mut competitor_births: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut candidates: HashMap<String, u64> = HashMap::new();
    let mut claimed: HashMap<String, Vec<String>> = HashMap::new();

    for entry in &signature {
        let Some(owners) = unique.get(&entry.hash) else {
            continue;
        };
        for owner in owners {
            if owner == repo {
                continue;
            }
            let owner_births = competitor_births
                .entry(owner.clone())
                .or_insert_with(|| load_birth_dates(layout, owner));
            let Some(owner_birth) = owner_births.get(&entry.hash) else {
                continue;
            };
            let own_birth = births.get(&entry.hash).map(String::as_str).unwrap_or(NODATE);

            // An undated function on either side leaves the competitor in
            // play; otherwise the earlier (or equal) birth wins.
            if own_birth == NODATE || owner_birth == NODATE || owner_birth.as_str() <= own_birth {
                *candidates.entry(owner.clone()).or_insert(0) += 1;
                claimed.entry(owner.clone()).or_default().push(entry.hash.clone());
            }
        }
    }

    let mut removed: HashSet<String> = HashSet::new();
    for (owner, count) in &candidates {
        let ave = ave_funcs.get(owner).copied().unwrap_or(0);
        if ave == 0 {
            continue;
        }
        let owner_births = competitor_births.get(owner);
        if owner_births.map(|b| b.is_empty()).unwrap_or(true) {
            continue;
        }
        if (*count as f64 / ave as f64) >= theta {
            tracing::debug!("{owner} is a likely ancestor of {repo} ({count}/{ave})");
            if let Some(hashes) = claimed.get(owner) {
                removed.extend(hashes.iter().cloned());
            }
        }
    }

    let target = layout.component_sig_file(repo);
    if removed.is_empty() {
        // No ancestors: the component entry is the signature, verbatim.
        std::fs::copy(layout.initial_sig_file(repo), &target)
            .with_context(|| format!("copying signature for {repo}"))?;
        return Ok(true);
    }

    let kept: Vec<SigEntry> = signature
        .into_iter()
        .filter(|entry| !removed.contains(&entry.hash))
        .collect();
    std::fs::write(&target, serde_json::to_string(&kept)?)
        .with_context(|| format!("writing component entry for {repo}"))?;
    Ok(true)
}

/// Reduce every repo with a signature. Returns the number of component
/// entries written.
pub fn run(layout: &DataLayout, config: &Config, pool: &rayon::ThreadPool) -> Result<usize> {
    let ave_funcs = meta::load_ave_funcs(layout)?;
    let unique = meta::load_unique_funcs(layout)?;
    let repos = meta::signature_repos(layout)?;
    let theta = config.analysis.theta_reduce;

    let written = pool.install(|| {
        repos
            .par_iter()
            .filter(|repo| {
                if crate::stop::requested() {
                    return false;
                }
                match reduce_repo(layout, repo, &ave_funcs, &unique, theta) {
                    Ok(written) => written,
                    Err(err) => {
                        tracing::error!("reducing {repo}: {err:#}");
                        false
                    }
                }
            })
            .count()
    });
    Ok(written)
}
