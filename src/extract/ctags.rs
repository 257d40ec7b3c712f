//! Driver for the external tagger.
//!
//! The contract is the stdout grammar, not the binary: tab-separated
//! records with at least eight fields, field 3 the symbol kind, field 4
//! carrying `line:N` and field 7 `end:N`. Only `function` records are
//! consumed. Universal-ctags invoked as
//! `ctags -f - --kinds-C=* --fields=neKSt <file>` is the reference
//! producer.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use crate::process::{run_with_timeout, Waited};

/// One function extent, 1-based inclusive line numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpan {
    pub start: usize,
    pub end: usize,
}

/// Resolve the tagger binary: an absolute path is taken as-is, anything
/// else goes through PATH lookup.
pub fn locate(configured: &Path) -> Result<PathBuf> {
    if configured.is_absolute() {
        if configured.is_file() {
            return Ok(configured.to_path_buf());
        }
        anyhow::bail!("tagger not found at {}", configured.display());
    }
    which::which(configured)
        .with_context(|| format!("tagger {:?} not found on PATH", configured))
}

/// Run the tagger over one file. `Ok(None)` signals a timeout; the caller
/// skips the file.
pub fn list_functions(
    ctags: &Path,
    file: &Path,
    timeout: Duration,
) -> Result<Option<Vec<FunctionSpan>>> {
    let mut cmd = Command::new(ctags);
    cmd.arg("-f")
        .arg("-")
        .arg("--kinds-C=*")
        .arg("--fields=neKSt")
        .arg(file);

    match run_with_timeout(&mut cmd, timeout)? {
        Waited::TimedOut => Ok(None),
        Waited::Finished(output) => {
            if !output.success {
                anyhow::bail!("tagger failed on {}: {}", file.display(), output.stderr.trim());
            }
            Ok(Some(parse_functions(&output.stdout)))
        }
    }
}

fn squeeze_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\t\s ]{2,}").expect("squeeze regex is valid"))
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("number regex is valid"))
}

/// Parse the tagger's output into function extents. Records of other
/// kinds, and records without both a `line:` and an `end:` annotation,
/// are dropped. The extension fields between the two vary per record
/// (signature, typeref), so the annotations are located by prefix.
pub fn parse_functions(output: &str) -> Vec<FunctionSpan> {
    let mut spans = Vec::new();
    for line in output.lines() {
        if line.is_empty() {
            continue;
        }
        // Collapse runs of blanks the tagger pads fields with, then split
        // on the remaining single tabs.
        let squeezed = squeeze_regex().replace_all(line, "");
        let fields: Vec<&str> = squeezed.split('\t').collect();
        if fields.len() < 5 || fields.get(3) != Some(&"function") {
            continue;
        }
        let Some(start) = annotated_number(&fields, "line:") else {
            continue;
        };
        let Some(end) = annotated_number(&fields, "end:") else {
            continue;
        };
        if start == 0 || end < start {
            continue;
        }
        spans.push(FunctionSpan { start, end });
    }
    spans
}

fn annotated_number(fields: &[&str], prefix: &str) -> Option<usize> {
    fields
        .iter()
        .find(|field| field.starts_with(prefix))
        .and_then(|field| first_number(field))
}

fn first_number(field: &str) -> Option<usize> {
    number_regex()
        .find(field)?
        .as_str()
        .parse()
        .ok()
}
