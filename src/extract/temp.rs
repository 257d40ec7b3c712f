//! Per-worker scratch space for transcoded sources.
//!
//! Each worker owns a subdirectory named `<pid>_<thread>_<timestamp>` so
//! concurrent workers never collide. When the disk fills, stale entries of
//! other (possibly dead) workers are pruned and the write is retried once.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Entries older than this are fair game for pruning on ENOSPC.
const STALE_AFTER: Duration = Duration::from_secs(3600);

const ENOSPC: i32 = 28;

pub struct TempSpace {
    base: PathBuf,
    dir: PathBuf,
    counter: AtomicU64,
}

impl TempSpace {
    /// Create the worker's scratch directory under `base`.
    pub fn create(base: &Path) -> Result<TempSpace> {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let thread = format!("{:?}", std::thread::current().id());
        let thread: String = thread.chars().filter(|c| c.is_ascii_digit()).collect();
        let name = format!(
            "{}_{}_{}-{}",
            std::process::id(),
            if thread.is_empty() { "0" } else { &thread },
            chrono::Utc::now().timestamp_micros(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let dir = base.join(name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating temp dir {}", dir.display()))?;
        Ok(TempSpace {
            base: base.to_path_buf(),
            dir,
            counter: AtomicU64::new(0),
        })
    }

    /// Write transcoded content to a fresh file and return its path.
    pub fn write_transcoded(&self, content: &str, extension: &str) -> Result<PathBuf> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("transcode_{n}.{extension}"));
        match std::fs::write(&path, content) {
            Ok(()) => Ok(path),
            Err(err) if err.raw_os_error() == Some(ENOSPC) => {
                tracing::warn!("temp space full, pruning stale entries");
                prune_stale(&self.base, STALE_AFTER);
                std::fs::write(&path, content)
                    .with_context(|| format!("writing {} after pruning", path.display()))?;
                Ok(path)
            }
            Err(err) => {
                Err(err).with_context(|| format!("writing temp file {}", path.display()))
            }
        }
    }
}

impl Drop for TempSpace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Delete any temp entry older than `max_age`. Failures are ignored; this
/// runs on a best-effort basis when space is tight.
fn prune_stale(base: &Path, max_age: Duration) {
    let Ok(entries) = std::fs::read_dir(base) else {
        return;
    };
    for entry in entries.flatten() {
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.elapsed().ok())
            .map(|age| age > max_age)
            .unwrap_or(false);
        if stale {
            let path = entry.path();
            if path.is_dir() {
                let _ = std::fs::remove_dir_all(&path);
            } else {
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_unique_files_and_cleans_up() {
        let base = tempfile::tempdir().unwrap();
        let dir;
        {
            let temp = TempSpace::create(base.path()).unwrap();
            let a = temp.write_transcoded("int a;", "c").unwrap();
            let b = temp.write_transcoded("int b;", "c").unwrap();
            assert_ne!(a, b);
            assert_eq!(std::fs::read_to_string(&a).unwrap(), "int a;");
            dir = temp.dir.clone();
            assert!(dir.exists());
        }
        assert!(!dir.exists());
    }

    #[test]
    fn concurrent_workers_get_distinct_dirs() {
        let base = tempfile::tempdir().unwrap();
        let a = TempSpace::create(base.path()).unwrap();
        let b = TempSpace::create(base.path()).unwrap();
        assert_ne!(a.dir, b.dir);
    }

    #[test]
    fn prune_ignores_fresh_entries() {
        let base = tempfile::tempdir().unwrap();
        let fresh = base.path().join("123_4_5");
        std::fs::create_dir(&fresh).unwrap();
        prune_stale(base.path(), STALE_AFTER);
        assert!(fresh.exists());
    }
}
