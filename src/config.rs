//! Runtime configuration.
//!
//! Loaded from a YAML file with four sections (`paths`, `performance`,
//! `analysis`, `logging`); every key has a default, so a missing file or a
//! partial file is fine. Environment variables of the form
//! `RECENTRIS_<SECTION>_<KEY>` override whatever the file said.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// File consulted when no `--config` flag is given.
pub const DEFAULT_CONFIG_FILE: &str = "lineage.yaml";

const ENV_PREFIX: &str = "RECENTRIS_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub performance: PerformanceConfig,
    pub analysis: AnalysisConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory of `<owner>%<repo>` clones produced by the clone driver.
    pub repos: PathBuf,
    /// Root for every artefact the pipeline persists.
    pub analyse_root: PathBuf,
    /// External tagger binary; resolved through PATH when not absolute.
    pub ctags: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            repos: PathBuf::from("repos"),
            analyse_root: PathBuf::from("analyse_file"),
            ctags: PathBuf::from("ctags"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Extraction workers; defaults to cores minus a reserve.
    pub cpu_workers: Option<usize>,
    /// Tag-walking workers; defaults to 2x cores, capped at 120.
    pub io_workers: Option<usize>,
    /// Per-file tagger timeout, seconds.
    pub file_timeout_secs: u64,
    /// Per-tag checkout timeout, seconds.
    pub checkout_timeout_secs: u64,
    /// Tag-listing / tag-date timeout, seconds.
    pub tag_list_timeout_secs: u64,
    /// Extractor cache entries kept per collector worker set.
    pub cache_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            cpu_workers: None,
            io_workers: None,
            file_timeout_secs: 30,
            checkout_timeout_secs: 120,
            tag_list_timeout_secs: 300,
            cache_size: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Accepted source extensions, case-folded, leading dot included.
    pub extensions: Vec<String>,
    /// Coverage ratio above which a donor repo claims shared functions.
    pub theta_reduce: f64,
    /// Coverage ratio above which a component is reported for a target.
    pub theta_match: f64,
    /// Fingerprint distance up to which two functions are modified siblings.
    pub d_mod: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            extensions: [".c", ".cc", ".cpp", ".cxx", ".h", ".hpp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            theta_reduce: 0.1,
            theta_match: 0.1,
            d_mod: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `lineage=debug`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration. An explicitly named file must exist; the default
    /// file is optional. Environment overrides are applied last.
    pub fn load(file: Option<&Path>) -> Result<Config> {
        let mut config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_yaml::from_str(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    let text = std::fs::read_to_string(default)
                        .with_context(|| format!("reading {DEFAULT_CONFIG_FILE}"))?;
                    serde_yaml::from_str(&text)
                        .with_context(|| format!("parsing {DEFAULT_CONFIG_FILE}"))?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env_overrides(env::vars());
        Ok(config)
    }

    /// Apply `RECENTRIS_<SECTION>_<KEY>` overrides. Unknown keys are
    /// ignored; unparseable values keep the configured one and warn.
    pub fn apply_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match rest {
                "PATHS_REPOS" => self.paths.repos = PathBuf::from(&value),
                "PATHS_ANALYSE_ROOT" => self.paths.analyse_root = PathBuf::from(&value),
                "PATHS_CTAGS" => self.paths.ctags = PathBuf::from(&value),
                "PERFORMANCE_CPU_WORKERS" => {
                    set_parsed(&mut self.performance.cpu_workers, &key, &value)
                }
                "PERFORMANCE_IO_WORKERS" => {
                    set_parsed(&mut self.performance.io_workers, &key, &value)
                }
                "PERFORMANCE_FILE_TIMEOUT_SECS" => {
                    parse_into(&mut self.performance.file_timeout_secs, &key, &value)
                }
                "PERFORMANCE_CHECKOUT_TIMEOUT_SECS" => {
                    parse_into(&mut self.performance.checkout_timeout_secs, &key, &value)
                }
                "PERFORMANCE_TAG_LIST_TIMEOUT_SECS" => {
                    parse_into(&mut self.performance.tag_list_timeout_secs, &key, &value)
                }
                "PERFORMANCE_CACHE_SIZE" => {
                    parse_into(&mut self.performance.cache_size, &key, &value)
                }
                "ANALYSIS_EXTENSIONS" => {
                    self.analysis.extensions = value
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                "ANALYSIS_THETA_REDUCE" => parse_into(&mut self.analysis.theta_reduce, &key, &value),
                "ANALYSIS_THETA_MATCH" => parse_into(&mut self.analysis.theta_match, &key, &value),
                "ANALYSIS_D_MOD" => parse_into(&mut self.analysis.d_mod, &key, &value),
                "LOGGING_LEVEL" => self.logging.level = value,
                _ => {}
            }
        }
    }

    /// Worker count for CPU-bound extraction: cores minus a reserve of
    /// `max(4, cores/5)`, never below one.
    pub fn cpu_workers(&self) -> usize {
        self.performance.cpu_workers.unwrap_or_else(|| {
            let cores = available_cores();
            cores.saturating_sub(4.max(cores / 5)).max(1)
        })
    }

    /// Worker count for the I/O-bound tag walker: `min(2*cores, 120)`.
    pub fn io_workers(&self) -> usize {
        self.performance
            .io_workers
            .unwrap_or_else(|| (available_cores() * 2).clamp(1, 120))
    }

    /// Case-folded extension check against the configured set.
    pub fn is_accepted_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let dotted = format!(".{}", ext.to_lowercase());
        self.analysis.extensions.iter().any(|e| e.to_lowercase() == dotted)
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn parse_into<T: std::str::FromStr>(slot: &mut T, key: &str, value: &str) {
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!("ignoring unparseable override {key}={value}"),
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut Option<T>, key: &str, value: &str) {
    match value.parse() {
        Ok(parsed) => *slot = Some(parsed),
        Err(_) => tracing::warn!("ignoring unparseable override {key}={value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.analysis.theta_match, 0.1);
        assert_eq!(config.analysis.theta_reduce, 0.1);
        assert_eq!(config.analysis.d_mod, 30);
        assert_eq!(config.performance.file_timeout_secs, 30);
        assert!(config.cpu_workers() >= 1);
        assert!(config.io_workers() >= 1 && config.io_workers() <= 120);
    }

    #[test]
    fn extension_gate_is_case_folded() {
        let config = Config::default();
        assert!(config.is_accepted_extension(Path::new("a/b/x.c")));
        assert!(config.is_accepted_extension(Path::new("x.CPP")));
        assert!(config.is_accepted_extension(Path::new("x.Hpp")));
        assert!(!config.is_accepted_extension(Path::new("x.rs")));
        assert!(!config.is_accepted_extension(Path::new("Makefile")));
    }

    #[test]
    fn env_overrides_win() {
        let mut config = Config::default();
        config.apply_env_overrides(vec![
            ("RECENTRIS_ANALYSIS_D_MOD".to_string(), "12".to_string()),
            ("RECENTRIS_PATHS_REPOS".to_string(), "/srv/mirror".to_string()),
            ("RECENTRIS_ANALYSIS_EXTENSIONS".to_string(), ".c,.h".to_string()),
            ("RECENTRIS_LOGGING_LEVEL".to_string(), "debug".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ]);
        assert_eq!(config.analysis.d_mod, 12);
        assert_eq!(config.paths.repos, PathBuf::from("/srv/mirror"));
        assert_eq!(config.analysis.extensions, vec![".c", ".h"]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str("analysis:\n  d_mod: 9\n").unwrap();
        assert_eq!(config.analysis.d_mod, 9);
        assert_eq!(config.performance.checkout_timeout_secs, 120);
    }
}
