//! Repository directory handling: discovery of `<owner>%<repo>` clones,
//! the exclusive-access lock sentinel, and worktree cleaning.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::process::run_with_timeout;

/// A clone eligible for collection.
#[derive(Debug, Clone)]
pub struct RepoDir {
    /// The `<owner>%<repo>` directory name; the component identity used in
    /// every artefact.
    pub name: String,
    /// Actual git working directory (the clone may nest one level).
    pub workdir: PathBuf,
}

/// Enumerate clones under `repos_dir`. Two layouts are accepted:
/// `<owner>%<repo>/` with `.git` directly inside, and
/// `<owner>%<repo>/<repo>/` nested one level. Directories without a `%`
/// are not clones and are ignored.
pub fn discover(repos_dir: &Path) -> Result<Vec<RepoDir>> {
    let entries = std::fs::read_dir(repos_dir)
        .with_context(|| format!("listing repos in {}", repos_dir.display()))?;

    let mut repos = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.contains('%') {
            continue;
        }
        repos.push(RepoDir {
            name: name.to_string(),
            workdir: resolve_workdir(&path),
        });
    }
    repos.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(repos)
}

fn resolve_workdir(dir: &Path) -> PathBuf {
    if dir.join(".git").exists() {
        return dir.to_path_buf();
    }
    // Nested layout: a single subdirectory holds the actual clone.
    let subdirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default();
    match subdirs.as_slice() {
        [single] => single.clone(),
        _ => dir.to_path_buf(),
    }
}

/// Exclusive-access sentinel: `.git/centris.lock` created `O_EXCL`.
/// Dropped (and deleted) when the worker finishes, success or not.
pub struct RepoLock {
    path: PathBuf,
}

/// Outcome of a lock attempt.
pub enum LockAttempt {
    Acquired(RepoLock),
    /// Another worker holds the lock; skip the repo.
    Busy,
}

impl RepoLock {
    pub fn acquire(workdir: &Path) -> Result<LockAttempt> {
        let path = workdir.join(".git").join("centris.lock");
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(LockAttempt::Acquired(RepoLock { path })),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(LockAttempt::Busy),
            Err(err) => {
                Err(err).with_context(|| format!("creating lock {}", path.display()))
            }
        }
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Put the worktree into a known state before tag iteration. Individual
/// steps may fail on healthy repos (no merge in progress, nothing to
/// abort); only their combined effect matters.
pub fn clean_worktree(workdir: &Path, timeout: Duration) {
    let steps: &[&[&str]] = &[
        &["merge", "--abort"],
        &["rebase", "--abort"],
        &["reset", "--hard", "HEAD"],
        &["clean", "-fdx"],
        &["checkout", "-f"],
    ];
    for args in steps {
        let mut cmd = Command::new("git");
        cmd.args(*args).current_dir(workdir);
        let _ = run_with_timeout(&mut cmd, timeout);
    }

    // Stale lock files left by killed git processes.
    let pattern = workdir.join(".git").join("*.lock");
    if let Some(pattern) = pattern.to_str() {
        if let Ok(paths) = glob::glob(pattern) {
            for path in paths.flatten() {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_accepts_both_layouts_and_skips_noise() {
        let dir = tempfile::tempdir().unwrap();
        // Flat clone.
        std::fs::create_dir_all(dir.path().join("own%flat/.git")).unwrap();
        // Nested clone.
        std::fs::create_dir_all(dir.path().join("own%nested/nested/.git")).unwrap();
        // Not a clone directory.
        std::fs::create_dir_all(dir.path().join("scratch")).unwrap();

        let repos = discover(dir.path()).unwrap();
        let names: Vec<&str> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["own%flat", "own%nested"]);

        let flat = &repos[0];
        assert_eq!(flat.workdir, dir.path().join("own%flat"));
        let nested = &repos[1];
        assert_eq!(nested.workdir, dir.path().join("own%nested/nested"));
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();

        let first = RepoLock::acquire(dir.path()).unwrap();
        let LockAttempt::Acquired(lock) = first else {
            panic!("first acquire must win");
        };
        assert!(matches!(
            RepoLock::acquire(dir.path()).unwrap(),
            LockAttempt::Busy
        ));
        drop(lock);
        assert!(matches!(
            RepoLock::acquire(dir.path()).unwrap(),
            LockAttempt::Acquired(_)
        ));
    }

    #[test]
    fn clean_removes_stale_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir_all(&git).unwrap();
        std::fs::write(git.join("index.lock"), b"").unwrap();
        clean_worktree(dir.path(), Duration::from_secs(5));
        assert!(!git.join("index.lock").exists());
    }
}
