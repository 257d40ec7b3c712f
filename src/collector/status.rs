//! Per-repo outcome book (`status.json`).
//!
//! The only shared-write surface of the collector: a JSON map keyed by
//! repo name, serialised behind a mutex and flushed after every update so
//! a killed run loses at most the repo in flight. A repo already marked
//! successful is skipped entirely on the next run.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoStatus {
    pub success: bool,
    pub timestamp: String,
    pub error: Option<String>,
}

pub struct StatusBook {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, RepoStatus>>,
}

impl StatusBook {
    /// Load the book, starting empty when the file is missing. A corrupt
    /// file is an invariant breach: logged, renamed aside, rebuilt.
    pub fn load(path: PathBuf) -> Result<StatusBook> {
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(map) => map,
                Err(err) => {
                    tracing::error!("corrupt status file {}: {err}", path.display());
                    let _ = std::fs::rename(&path, path.with_extension("json.corrupt"));
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        Ok(StatusBook {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn is_success(&self, repo: &str) -> bool {
        self.entries
            .lock()
            .get(repo)
            .map(|s| s.success)
            .unwrap_or(false)
    }

    /// Record one outcome and persist the whole book atomically.
    pub fn record(&self, repo: &str, success: bool, error: Option<String>) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(
            repo.to_string(),
            RepoStatus {
                success,
                timestamp: chrono::Utc::now().to_rfc3339(),
                error,
            },
        );
        let json = serde_json::to_string_pretty(&*entries)?;
        write_atomic(&self.path, json.as_bytes())
    }

    pub fn successes(&self) -> usize {
        self.entries.lock().values().filter(|s| s.success).count()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))
}
