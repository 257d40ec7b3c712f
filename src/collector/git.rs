//! VCS interaction for the tag walker: tag enumeration, tag-date capture,
//! and checkout with the targeted repair ladder.
//!
//! Everything goes through argv-style invocations with explicit timeouts;
//! tag names reach git behind a `--` separator whenever they could be
//! mistaken for options.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use crate::process::{run_with_timeout, CmdOutput, Waited};

/// Checkout messages that indicate success despite a noisy exit.
const HARMLESS: &[&str] = &[
    "Previous HEAD position",
    "HEAD is now at",
    "Switched to",
    "already exists, no checkout",
];

fn git(workdir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(workdir);
    cmd
}

fn run_git(workdir: &Path, args: &[&str], timeout: Duration) -> Result<CmdOutput> {
    run_with_timeout(&mut git(workdir, args), timeout)?
        .finished(&format!("git {}", args.first().unwrap_or(&"")))
}

/// List the repo's tags, one per line, empty lines dropped.
pub fn list_tags(workdir: &Path, timeout: Duration) -> Result<Vec<String>> {
    let output = run_git(workdir, &["tag"], timeout)?;
    if !output.success {
        anyhow::bail!("git tag failed: {}", output.stderr.trim());
    }
    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

fn tag_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"tag:\s*([^,)]+)").expect("tag label regex is valid"))
}

/// Capture `(iso-date, decorations)` lines for every tagged commit, with
/// `/` replaced by `_` inside tag labels so the labels match the
/// file-name-safe form used everywhere downstream.
pub fn capture_tag_dates(workdir: &Path, timeout: Duration) -> Result<String> {
    let output = run_git(
        workdir,
        &[
            "log",
            "--tags",
            "--simplify-by-decoration",
            "--pretty=format:%ai %d",
        ],
        timeout,
    )?;
    if !output.success {
        anyhow::bail!("git log --tags failed: {}", output.stderr.trim());
    }
    let safe = tag_label_regex().replace_all(&output.stdout, |caps: &regex::Captures| {
        format!("tag: {}", caps[1].replace('/', "_"))
    });
    Ok(safe.into_owned())
}

/// Check out one tag, applying targeted repairs driven by the error text.
/// A repaired checkout is retried once per repair; anything else fails the
/// tag (and only the tag).
pub fn checkout_tag(workdir: &Path, tag: &str, timeout: Duration) -> Result<()> {
    // A stale index lock fails every checkout with a clear-but-useless
    // message; cheaper to delete up front.
    let _ = std::fs::remove_file(workdir.join(".git").join("index.lock"));

    let output = try_checkout(workdir, tag, timeout)?;
    if checkout_ok(&output) {
        return Ok(());
    }
    let text = combined_or_timeout(&output);

    if text.contains("git-lfs") || text.contains("filter-process") {
        neutralize_lfs(workdir, timeout);
        return retry_checkout(workdir, tag, timeout, "after disabling LFS filters");
    }

    if text.contains("cannot switch branch to a non-commit") {
        let commit = resolve_tag_commit(workdir, tag, timeout)
            .with_context(|| format!("resolving non-commit tag {tag}"))?;
        let output = try_checkout(workdir, &commit, timeout)?;
        if checkout_ok(&output) {
            return Ok(());
        }
        anyhow::bail!(
            "checkout of resolved commit failed: {}",
            combined_or_timeout(&output)
        );
    }

    if text.contains("index file smaller than expected") || text.contains("index file corrupt") {
        rebuild_index(workdir, timeout);
        return retry_checkout(workdir, tag, timeout, "after rebuilding the index");
    }

    if text.contains("unable to create temporary file") || text.contains("tempfile") {
        repair_object_store(workdir, timeout);
        return retry_checkout(workdir, tag, timeout, "after repairing the object store");
    }

    anyhow::bail!("checkout of {tag} failed: {}", text.trim());
}

fn try_checkout(workdir: &Path, tag: &str, timeout: Duration) -> Result<Waited> {
    // Tags that look like options must go through the full ref behind `--`.
    let refname;
    let args: Vec<&str> = if tag.starts_with('-') {
        refname = format!("refs/tags/{tag}");
        vec!["checkout", "-f", "--", &refname]
    } else {
        vec!["checkout", "-f", tag]
    };
    run_with_timeout(&mut git(workdir, &args), timeout)
}

fn checkout_ok(waited: &Waited) -> bool {
    match waited {
        Waited::TimedOut => false,
        Waited::Finished(output) => {
            output.success || {
                let text = output.combined();
                HARMLESS.iter().any(|h| text.contains(h))
            }
        }
    }
}

fn combined_or_timeout(waited: &Waited) -> String {
    match waited {
        Waited::TimedOut => "timed out".to_string(),
        Waited::Finished(output) => output.combined(),
    }
}

fn retry_checkout(workdir: &Path, tag: &str, timeout: Duration, what: &str) -> Result<()> {
    let output = try_checkout(workdir, tag, timeout)?;
    if checkout_ok(&output) {
        return Ok(());
    }
    anyhow::bail!(
        "checkout of {tag} still failing {what}: {}",
        combined_or_timeout(&output).trim().to_string()
    );
}

/// Point the LFS smudge/process filters at skip mode so checkouts succeed
/// without the `git-lfs` binary.
fn neutralize_lfs(workdir: &Path, timeout: Duration) {
    let _ = run_git(
        workdir,
        &["config", "filter.lfs.smudge", "git-lfs smudge --skip -- %f"],
        timeout,
    );
    let _ = run_git(
        workdir,
        &[
            "config",
            "filter.lfs.process",
            "git-lfs filter-process --skip",
        ],
        timeout,
    );
}

/// Annotated tags can point at trees or blobs; resolve to the first
/// reachable commit instead.
fn resolve_tag_commit(workdir: &Path, tag: &str, timeout: Duration) -> Result<String> {
    let refname = format!("refs/tags/{tag}");
    let output = run_git(workdir, &["rev-list", "-n", "1", &refname], timeout)?;
    let commit = output.stdout.trim().to_string();
    if !output.success || commit.is_empty() {
        anyhow::bail!("rev-list found no commit for {refname}");
    }
    Ok(commit)
}

/// Back up a truncated index and start from an empty tree.
fn rebuild_index(workdir: &Path, timeout: Duration) {
    let index = workdir.join(".git").join("index");
    let epoch = chrono::Utc::now().timestamp();
    let backup = workdir.join(".git").join(format!("index.bak.{epoch}"));
    if std::fs::rename(&index, &backup).is_err() {
        let _ = std::fs::remove_file(&index);
    }
    let _ = run_git(workdir, &["read-tree", "--empty"], timeout);
}

/// Wipe half-written loose objects, then re-init and refetch tags.
fn repair_object_store(workdir: &Path, timeout: Duration) {
    let tmp = workdir.join(".git").join("objects").join("tmp");
    if let Ok(entries) = std::fs::read_dir(&tmp) {
        for entry in entries.flatten() {
            let _ = std::fs::remove_file(entry.path());
        }
    }
    let _ = run_git(workdir, &["init"], timeout);
    let _ = run_git(workdir, &["fetch", "--tags", "--force"], timeout);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_labels_become_file_name_safe() {
        let raw = "2021-03-04 10:00:00 +0000  (tag: release/1.0, tag: v1.0)";
        let safe = tag_label_regex().replace_all(raw, |caps: &regex::Captures| {
            format!("tag: {}", caps[1].replace('/', "_"))
        });
        assert!(safe.contains("tag: release_1.0"));
        assert!(safe.contains("tag: v1.0"));
    }

    #[test]
    fn harmless_checkout_noise_is_success() {
        let output = CmdOutput {
            success: false,
            stdout: String::new(),
            stderr: "Previous HEAD position was abc123 msg".to_string(),
        };
        assert!(checkout_ok(&Waited::Finished(output)));
        assert!(!checkout_ok(&Waited::TimedOut));
    }

    #[test]
    fn timeouts_render_as_such() {
        assert_eq!(combined_or_timeout(&Waited::TimedOut), "timed out");
    }
}
