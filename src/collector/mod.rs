//! Tag walker: one fingerprint index per repository tag.
//!
//! Repos fan out over an I/O-sized pool (the bottleneck is `git checkout`);
//! the per-tag extraction fans out over a CPU-sized pool. Stages are
//! idempotent at two levels: an existing `fuzzy_<tag>.hidx` skips the tag,
//! and a repo marked successful in `status.json` is skipped outright.

pub mod git;
pub mod repo;
pub mod status;

use anyhow::{Context, Result};
use colored::Colorize;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::extract::temp::TempSpace;
use crate::extract::Extractor;
use crate::paths::DataLayout;
use crate::stop;
use repo::{LockAttempt, RepoDir, RepoLock};
use status::StatusBook;

/// Tag success ratio at or above which a repo counts as collected.
const SUCCESS_RATIO: f64 = 0.8;

/// How one repo ended, for the progress line.
enum Outcome {
    Done { ok: usize, total: usize },
    Failed { ok: usize, total: usize },
    AlreadyCollected,
    BeingProcessed,
    NoSources,
}

/// Walk every clone under the configured repos directory.
pub fn run(config: &Config) -> Result<()> {
    let layout = DataLayout::new(config);
    layout.ensure_collector_dirs()?;

    let extractor = Arc::new(Extractor::new(config)?);
    let book = Arc::new(StatusBook::load(layout.status_file())?);
    let repos = repo::discover(layout.repos_dir())?;
    println!("{} {} repositories", "collector:".bold(), repos.len());

    let io_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.io_workers())
        .build()
        .context("building I/O worker pool")?;
    let cpu_pool = Arc::new(
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.cpu_workers())
            .build()
            .context("building extraction worker pool")?,
    );

    io_pool.install(|| {
        repos.par_iter().for_each(|repo| {
            if stop::requested() {
                return;
            }
            let outcome = process_repo(repo, config, &layout, &extractor, &cpu_pool, &book);
            match outcome {
                Ok(outcome) => report(repo, &outcome),
                Err(err) => {
                    tracing::error!("{}: {err:#}", repo.name);
                    let _ = book.record(&repo.name, false, Some(format!("{err:#}")));
                }
            }
        });
    });

    println!(
        "{} {} repositories marked successful",
        "collector:".bold(),
        book.successes()
    );
    Ok(())
}

fn report(repo: &RepoDir, outcome: &Outcome) {
    match outcome {
        Outcome::Done { ok, total } => {
            println!("  {} {} ({ok}/{total} tags)", "done".green(), repo.name);
        }
        Outcome::Failed { ok, total } => {
            println!("  {} {} ({ok}/{total} tags)", "failed".red(), repo.name);
        }
        Outcome::AlreadyCollected => {
            println!("  {} {}", "skip".dimmed(), repo.name);
        }
        Outcome::BeingProcessed => {
            println!("  {} {} (being processed)", "skip".dimmed(), repo.name);
        }
        Outcome::NoSources => {
            println!("  {} {} (no C/C++ sources)", "skip".dimmed(), repo.name);
        }
    }
}

fn process_repo(
    repo: &RepoDir,
    config: &Config,
    layout: &DataLayout,
    extractor: &Extractor,
    cpu_pool: &rayon::ThreadPool,
    book: &StatusBook,
) -> Result<Outcome> {
    if book.is_success(&repo.name) {
        return Ok(Outcome::AlreadyCollected);
    }
    if !extractor.tree_has_sources(&repo.workdir) {
        book.record(&repo.name, false, Some("no C/C++ sources".to_string()))?;
        return Ok(Outcome::NoSources);
    }

    let _lock = match RepoLock::acquire(&repo.workdir)? {
        LockAttempt::Acquired(lock) => lock,
        LockAttempt::Busy => return Ok(Outcome::BeingProcessed),
    };

    let checkout_timeout = Duration::from_secs(config.performance.checkout_timeout_secs);
    let listing_timeout = Duration::from_secs(config.performance.tag_list_timeout_secs);

    repo::clean_worktree(&repo.workdir, checkout_timeout);

    // Tag dates first; downstream stages read them even for tags whose
    // checkout later fails.
    match git::capture_tag_dates(&repo.workdir, listing_timeout) {
        Ok(dates) => {
            std::fs::write(layout.repo_date_file(&repo.name), dates)
                .with_context(|| format!("writing tag dates for {}", repo.name))?;
        }
        Err(err) => tracing::warn!("{}: no tag dates: {err:#}", repo.name),
    }

    let tags = git::list_tags(&repo.workdir, listing_timeout)?;
    // A repo without tags is a single pseudo-version named after itself,
    // taken from the tree as checked out.
    let pseudo = tags.is_empty();
    let tags = if pseudo {
        vec![repo.name.clone()]
    } else {
        tags
    };

    std::fs::create_dir_all(layout.repo_result_dir(&repo.name))
        .with_context(|| format!("creating result dir for {}", repo.name))?;
    let temp = TempSpace::create(&layout.temp_dir())?;

    let total = tags.len();
    let mut ok = 0usize;
    for tag in &tags {
        if stop::requested() {
            break;
        }
        let safe_tag = tag.replace('/', "_");
        let hidx = layout.hidx_file(&repo.name, &safe_tag);
        if hidx.exists() {
            ok += 1;
            continue;
        }

        if !pseudo {
            if let Err(err) = git::checkout_tag(&repo.workdir, tag, checkout_timeout) {
                tracing::warn!("{}: tag {tag}: {err:#}", repo.name);
                continue;
            }
        }

        let index = extractor.extract_tree(&repo.workdir, &repo.name, cpu_pool, &temp);
        if index.is_empty() {
            tracing::warn!("{}: tag {tag}: no functions extracted", repo.name);
            continue;
        }
        index.write_to(&hidx)?;
        ok += 1;
    }

    let success = total > 0 && (ok as f64 / total as f64) >= SUCCESS_RATIO;
    let error = if success {
        None
    } else {
        Some(format!("{ok}/{total} tags produced an index"))
    };
    book.record(&repo.name, success, error)?;

    Ok(if success {
        Outcome::Done { ok, total }
    } else {
        Outcome::Failed { ok, total }
    })
}
