//! Single source of truth for the on-disk artefact layout.
//!
//! This module defines WHERE data lives. It has no I/O beyond directory
//! creation, no validation, no business logic. One file shows the entire
//! filesystem layout.
//!
//! ```text
//! repos/<owner>%<repo>/[<repo>/].git/...      # clones (external driver)
//! analyse_file/
//! ├── oss_collector/
//! │   ├── repo_date/<repo>                    # raw "date (refs)" lines
//! │   ├── repo_functions/<repo>/fuzzy_<tag>.hidx
//! │   ├── status.json                         # per-repo outcomes
//! │   └── temp/<pid>_<thread>_<ts>/           # transcoding scratch
//! ├── preprocessor/
//! │   ├── verIDX/<repo>_idx                   # JSON [{ver,idx}]
//! │   ├── funcDate/<repo>_funcdate            # "fp TAB date" lines
//! │   ├── initialSigs/<repo>_sig              # JSON [{hash,vers}]
//! │   ├── componentDB/<repo>_sig              # reduced signatures
//! │   └── metaInfos/
//! │       ├── aveFuncs  allFuncs  uniqueFuncs
//! │       └── weights/<repo>_weights
//! └── detector/result_<target>                # TSV detection report
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Resolved layout, cheap to clone and thread through stages.
#[derive(Debug, Clone)]
pub struct DataLayout {
    repos: PathBuf,
    root: PathBuf,
}

impl DataLayout {
    pub fn new(config: &Config) -> DataLayout {
        DataLayout {
            repos: config.paths.repos.clone(),
            root: config.paths.analyse_root.clone(),
        }
    }

    /// Directory of `<owner>%<repo>` clones.
    pub fn repos_dir(&self) -> &Path {
        &self.repos
    }

    // =========================================================================
    // Collector
    // =========================================================================

    pub fn collector_dir(&self) -> PathBuf {
        self.root.join("oss_collector")
    }

    /// Raw tag-date capture for one repo.
    pub fn repo_date_file(&self, repo: &str) -> PathBuf {
        self.collector_dir().join("repo_date").join(repo)
    }

    pub fn repo_functions_dir(&self) -> PathBuf {
        self.collector_dir().join("repo_functions")
    }

    /// Per-repo directory of tag indices.
    pub fn repo_result_dir(&self, repo: &str) -> PathBuf {
        self.repo_functions_dir().join(repo)
    }

    /// One tag index. `tag` must already be file-name safe (`/` -> `_`).
    pub fn hidx_file(&self, repo: &str, tag: &str) -> PathBuf {
        self.repo_result_dir(repo).join(format!("fuzzy_{tag}.hidx"))
    }

    pub fn status_file(&self) -> PathBuf {
        self.collector_dir().join("status.json")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.collector_dir().join("temp")
    }

    // =========================================================================
    // Preprocessor
    // =========================================================================

    pub fn preprocessor_dir(&self) -> PathBuf {
        self.root.join("preprocessor")
    }

    pub fn ver_idx_dir(&self) -> PathBuf {
        self.preprocessor_dir().join("verIDX")
    }

    pub fn ver_idx_file(&self, repo: &str) -> PathBuf {
        self.ver_idx_dir().join(format!("{repo}_idx"))
    }

    pub fn func_date_dir(&self) -> PathBuf {
        self.preprocessor_dir().join("funcDate")
    }

    pub fn func_date_file(&self, repo: &str) -> PathBuf {
        self.func_date_dir().join(format!("{repo}_funcdate"))
    }

    pub fn initial_sigs_dir(&self) -> PathBuf {
        self.preprocessor_dir().join("initialSigs")
    }

    pub fn initial_sig_file(&self, repo: &str) -> PathBuf {
        self.initial_sigs_dir().join(format!("{repo}_sig"))
    }

    pub fn component_db_dir(&self) -> PathBuf {
        self.preprocessor_dir().join("componentDB")
    }

    pub fn component_sig_file(&self, repo: &str) -> PathBuf {
        self.component_db_dir().join(format!("{repo}_sig"))
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.preprocessor_dir().join("metaInfos")
    }

    pub fn ave_funcs_file(&self) -> PathBuf {
        self.meta_dir().join("aveFuncs")
    }

    pub fn all_funcs_file(&self) -> PathBuf {
        self.meta_dir().join("allFuncs")
    }

    pub fn unique_funcs_file(&self) -> PathBuf {
        self.meta_dir().join("uniqueFuncs")
    }

    pub fn weights_dir(&self) -> PathBuf {
        self.meta_dir().join("weights")
    }

    pub fn weights_file(&self, repo: &str) -> PathBuf {
        self.weights_dir().join(format!("{repo}_weights"))
    }

    // =========================================================================
    // Detector
    // =========================================================================

    pub fn detector_dir(&self) -> PathBuf {
        self.root.join("detector")
    }

    pub fn result_file(&self, target: &str) -> PathBuf {
        self.detector_dir().join(format!("result_{target}"))
    }

    // =========================================================================
    // Directory creation, one call per stage entry point
    // =========================================================================

    pub fn ensure_collector_dirs(&self) -> Result<()> {
        for dir in [
            self.collector_dir().join("repo_date"),
            self.repo_functions_dir(),
            self.temp_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn ensure_preprocessor_dirs(&self) -> Result<()> {
        for dir in [
            self.ver_idx_dir(),
            self.func_date_dir(),
            self.initial_sigs_dir(),
            self.component_db_dir(),
            self.meta_dir(),
            self.weights_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn ensure_detector_dirs(&self) -> Result<()> {
        let dir = self.detector_dir();
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))
    }

    /// Strip the `<repo>_sig` suffix convention.
    pub fn repo_of_sig_file(file_name: &str) -> Option<&str> {
        file_name.strip_suffix("_sig")
    }

    /// Strip `fuzzy_<tag>.hidx` down to `<tag>`.
    pub fn tag_of_hidx_file(file_name: &str) -> Option<&str> {
        file_name.strip_prefix("fuzzy_")?.strip_suffix(".hidx")
    }
}
