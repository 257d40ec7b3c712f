//! Shared helpers for the integration suites that drive external tools.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

/// The extractor suites need universal-ctags (`end:` fields, `--kinds-C`);
/// absence or an exuberant build skips the suite.
pub fn universal_ctags_available() -> bool {
    let Ok(output) = Command::new("ctags").arg("--version").output() else {
        eprintln!("skipping: ctags not installed");
        return false;
    };
    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    if text.contains("Universal Ctags") {
        true
    } else {
        eprintln!("skipping: ctags is not universal-ctags");
        false
    }
}

pub fn git_available() -> bool {
    match Command::new("git").arg("--version").output() {
        Ok(output) if output.status.success() => true,
        _ => {
            eprintln!("skipping: git not installed");
            false
        }
    }
}

/// Run git in `dir`, panicking on failure: fixture setup must not fail
/// silently.
pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "fixture")
        .env("GIT_AUTHOR_EMAIL", "fixture@example.invalid")
        .env("GIT_COMMITTER_NAME", "fixture")
        .env("GIT_COMMITTER_EMAIL", "fixture@example.invalid")
        .output()
        .expect("running git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// A C file with one well-known function plus filler so every body clears
/// the fingerprint oracle's entropy floor.
pub fn c_source(marker: u32) -> String {
    format!(
        r#"#include <stdio.h>

int checksum_{marker}(const int *values, int count) {{
    int total = {marker};
    int limit = count * 3 + {marker};
    for (int i = 0; i < count; i++) {{
        total += values[i] * (i + 7);
        if (total > limit) {{
            total -= limit / 2;
        }}
    }}
    printf("checksum=%d limit=%d count=%d\n", total, limit, count);
    return total ^ (limit << 2);
}}
"#
    )
}
