//! Function extraction and fingerprinting.
//!
//! Per-file pipeline: extension gate, decode ladder, external tagger,
//! function-body splice, comment removal, normalisation, fingerprint.
//! Per-file errors are recoverable by construction: the file is skipped and
//! counters stay untouched, nothing escapes to the caller.

pub mod cache;
pub mod ctags;
pub mod decode;
pub mod normalize;
pub mod temp;

use anyhow::Result;
use rayon::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::Config;
use crate::fingerprint::Fingerprint;
use crate::stop;
use crate::tagindex::TagIndex;
use cache::ExtractCache;
use ctags::FunctionSpan;
use temp::TempSpace;

/// Extraction result for a single file.
#[derive(Debug, Clone, Default)]
pub struct FileExtract {
    /// `(fingerprint, relpath)` in source order; identical bodies in one
    /// file produce one pair each.
    pub pairs: Vec<(Fingerprint, String)>,
    /// True once the tagger ran successfully over the file.
    pub processed: bool,
    pub funcs: u64,
    pub lines: u64,
}

impl FileExtract {
    fn skipped() -> FileExtract {
        FileExtract::default()
    }
}

fn body_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Greedy: the outermost brace-enclosed block of the splice.
    RE.get_or_init(|| Regex::new(r"\{([\s\S]*)\}").expect("body regex is valid"))
}

pub struct Extractor {
    ctags: PathBuf,
    file_timeout: Duration,
    cache: ExtractCache,
    config: Config,
}

impl Extractor {
    pub fn new(config: &Config) -> Result<Extractor> {
        Ok(Extractor {
            ctags: ctags::locate(&config.paths.ctags)?,
            file_timeout: Duration::from_secs(config.performance.file_timeout_secs),
            cache: ExtractCache::new(config.performance.cache_size),
            config: config.clone(),
        })
    }

    /// All accepted source files below `root`, sorted for deterministic
    /// processing.
    pub fn discover_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.config.is_accepted_extension(path))
            .collect();
        files.sort();
        files
    }

    /// Whether any accepted source file exists below `root` at all.
    pub fn tree_has_sources(&self, root: &Path) -> bool {
        walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .any(|entry| {
                entry.file_type().is_file() && self.config.is_accepted_extension(entry.path())
            })
    }

    /// Fingerprint one file. Never fails: problems are logged and yield an
    /// empty result with untouched counters.
    pub fn extract_file(&self, file: &Path, root: &Path, temp: &TempSpace) -> FileExtract {
        let relpath = relpath_of(file, root);

        let bytes = match std::fs::read(file) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return FileExtract::skipped(),
            Err(err) => {
                tracing::warn!("unreadable file {}: {err}", file.display());
                return FileExtract::skipped();
            }
        };

        let key = ExtractCache::key(&bytes, &relpath);
        if let Some(hit) = self.cache.get(&key) {
            return (*hit).clone();
        }

        let source = decode::decode(&bytes);

        // The tagger reads the file itself; when the on-disk bytes are not
        // UTF-8 it must see the transcoded text we will splice lines from.
        let tag_input = if source.utf8_on_disk {
            file.to_path_buf()
        } else {
            let extension = file
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("c")
                .to_string();
            match temp.write_transcoded(&source.text, &extension) {
                Ok(path) => path,
                Err(err) => {
                    tracing::warn!("transcoding {} failed: {err:#}", file.display());
                    return FileExtract::skipped();
                }
            }
        };

        let spans = match ctags::list_functions(&self.ctags, &tag_input, self.file_timeout) {
            Ok(Some(spans)) => spans,
            Ok(None) => {
                tracing::warn!("tagger timed out on {}", file.display());
                return FileExtract::skipped();
            }
            Err(err) => {
                tracing::warn!("{err:#}");
                return FileExtract::skipped();
            }
        };

        let result = fingerprint_spans(&source.text, &spans, &relpath);
        let result = Arc::new(result);
        self.cache.put(key, Arc::clone(&result));
        (*result).clone()
    }

    /// Fingerprint a whole tree on the given pool. The returned index
    /// carries `repo_label` in its header.
    pub fn extract_tree(
        &self,
        root: &Path,
        repo_label: &str,
        pool: &rayon::ThreadPool,
        temp: &TempSpace,
    ) -> TagIndex {
        let files = self.discover_files(root);
        let results: Vec<FileExtract> = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    if stop::requested() {
                        FileExtract::skipped()
                    } else {
                        self.extract_file(file, root, temp)
                    }
                })
                .collect()
        });

        let mut index = TagIndex::new(repo_label);
        for extract in results {
            if extract.processed {
                index.file_count += 1;
            }
            index.func_count += extract.funcs;
            index.line_count += extract.lines;
            for (fp, relpath) in extract.pairs {
                index.push(fp, relpath);
            }
        }
        index
    }
}

/// Splice each tagged extent out of `text`, canonicalise and fingerprint
/// it. Pure; the tagger is the only effectful part of the per-file
/// pipeline.
fn fingerprint_spans(text: &str, spans: &[FunctionSpan], relpath: &str) -> FileExtract {
    let lines: Vec<&str> = text.lines().collect();
    let mut pairs = Vec::new();
    let mut funcs = 0u64;

    for span in spans {
        if span.start < 1 || span.end > lines.len() {
            continue;
        }
        let spliced = lines[span.start - 1..span.end].join("\n");
        // No brace block: forward declaration or macro-generated body.
        let Some(caps) = body_regex().captures(&spliced) else {
            continue;
        };
        let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let canonical = normalize::normalize(&normalize::strip_comments(body));
        let Some(fp) = Fingerprint::of_normalized(&canonical) else {
            continue;
        };
        pairs.push((fp, relpath.to_string()));
        funcs += 1;
    }

    FileExtract {
        pairs,
        processed: true,
        funcs,
        lines: lines.len() as u64,
    }
}

/// Path relative to the repo root, keeping a leading `/`.
fn relpath_of(file: &Path, root: &Path) -> String {
    match file.strip_prefix(root) {
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => file.display().to_string(),
    }
}
