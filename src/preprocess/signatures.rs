//! Stage C: fold a repo's per-tag indices into its version index,
//! signature, and per-function birth dates.

use anyhow::{Context, Result};
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::OnceLock;

use super::{SigEntry, VersionEntry, NODATE};
use crate::fingerprint::Fingerprint;
use crate::paths::DataLayout;
use crate::tagindex::TagIndex;

fn date_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})").expect("date regex is valid"))
}

fn tag_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"tag:\s*([^,)]+)").expect("tag label regex is valid"))
}

/// Parse the raw `date (refs)` capture into `tag -> YYYY-MM-DD`. Lines
/// without a decoration or a leading date contribute nothing.
pub fn parse_tag_dates(text: &str) -> HashMap<String, String> {
    let mut dates = HashMap::new();
    for line in text.lines() {
        if !line.contains("tag:") {
            continue;
        }
        let line = line.trim();
        let Some(date) = date_line_regex().captures(line).map(|c| c[1].to_string()) else {
            continue;
        };
        for caps in tag_label_regex().captures_iter(line) {
            let tag = caps[1].trim().to_string();
            if !tag.is_empty() {
                dates.insert(tag, date.clone());
            }
        }
    }
    dates
}

/// Tags of a repo in index order: lexicographically ascending over the
/// `fuzzy_<tag>.hidx` basenames.
pub fn ordered_tags(repo_result_dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(repo_result_dir)
        .with_context(|| format!("listing {}", repo_result_dir.display()))?;
    let mut tags: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            let tag = DataLayout::tag_of_hidx_file(name)?;
            let tag = tag.trim();
            (!tag.is_empty()).then(|| tag.to_string())
        })
        .collect();
    tags.sort();
    Ok(tags)
}

/// Fold one repo. Produces `verIDX/<repo>_idx`, `funcDate/<repo>_funcdate`
/// and `initialSigs/<repo>_sig`.
pub fn build_repo(repo: &str, layout: &DataLayout) -> Result<()> {
    let result_dir = layout.repo_result_dir(repo);
    let tags = ordered_tags(&result_dir)?;
    if tags.is_empty() {
        return Ok(());
    }

    let tag_dates = match std::fs::read_to_string(layout.repo_date_file(repo)) {
        Ok(text) => parse_tag_dates(&text),
        Err(_) => HashMap::new(),
    };

    // Insertion-ordered signature so re-runs write identical files.
    let mut order: Vec<Fingerprint> = Vec::new();
    let mut vers: HashMap<Fingerprint, Vec<u32>> = HashMap::new();
    let mut birth: HashMap<Fingerprint, String> = HashMap::new();

    for (idx, tag) in tags.iter().enumerate() {
        let date = tag_dates.get(tag).map(String::as_str).unwrap_or(NODATE);
        let fps = TagIndex::read_fingerprints(&layout.hidx_file(repo, tag))?;
        for fp in fps {
            match vers.get_mut(&fp) {
                Some(list) => list.push(idx as u32),
                None => {
                    order.push(fp);
                    vers.insert(fp, vec![idx as u32]);
                }
            }
            birth
                .entry(fp)
                .and_modify(|current| {
                    if super::date_le(date, current) {
                        *current = date.to_string();
                    }
                })
                .or_insert_with(|| date.to_string());
        }
    }

    let mut func_dates = String::new();
    for fp in &order {
        let _ = writeln!(func_dates, "{fp}\t{}", birth[fp]);
    }
    std::fs::write(layout.func_date_file(repo), func_dates)
        .with_context(|| format!("writing birth dates for {repo}"))?;

    let version_index: Vec<VersionEntry> = tags
        .iter()
        .enumerate()
        .map(|(idx, tag)| VersionEntry {
            ver: tag.clone(),
            idx: idx.to_string(),
        })
        .collect();
    std::fs::write(
        layout.ver_idx_file(repo),
        serde_json::to_string(&version_index)?,
    )
    .with_context(|| format!("writing version index for {repo}"))?;

    let signature: Vec<SigEntry> = order
        .iter()
        .map(|fp| SigEntry {
            hash: fp.to_string(),
            vers: vers[fp].clone(),
        })
        .collect();
    std::fs::write(
        layout.initial_sig_file(repo),
        serde_json::to_string(&signature)?,
    )
    .with_context(|| format!("writing signature for {repo}"))?;

    Ok(())
}

/// Fold every repo with a non-empty result directory.
pub fn run(layout: &DataLayout, pool: &rayon::ThreadPool) -> Result<usize> {
    let entries = std::fs::read_dir(layout.repo_functions_dir())
        .with_context(|| format!("listing {}", layout.repo_functions_dir().display()))?;
    let mut repos: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(String::from))
        .collect();
    repos.sort();

    let folded = pool.install(|| {
        repos
            .par_iter()
            .filter(|repo| {
                if crate::stop::requested() {
                    return false;
                }
                match build_repo(repo, layout) {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::error!("folding {repo}: {err:#}");
                        false
                    }
                }
            })
            .count()
    });
    Ok(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_dates_parse_multiple_labels_per_line() {
        let text = "2024-09-15 12:40:43 -0400  (tag: snap-2024-09-16-a, tag: snap-2024-09-15-a)\n\
                    2020-01-02 08:00:00 +0000  (HEAD -> main, tag: v1.0, origin/main)\n\
                    2019-01-01 00:00:00 +0000  (origin/feature)\n";
        let dates = parse_tag_dates(text);
        assert_eq!(dates.get("snap-2024-09-16-a").unwrap(), "2024-09-15");
        assert_eq!(dates.get("snap-2024-09-15-a").unwrap(), "2024-09-15");
        assert_eq!(dates.get("v1.0").unwrap(), "2020-01-02");
        assert_eq!(dates.len(), 3);
    }

    #[test]
    fn dateless_lines_contribute_nothing() {
        let dates = parse_tag_dates("garbage (tag: v9)\n");
        assert!(dates.is_empty());
    }
}
