//! Function-body canonicalisation before fingerprinting.
//!
//! Two passes. Comment removal classifies every region of the body as
//! `comment`, `multilinecomment` or `noncomment` in a single regex sweep
//! and keeps only the last kind; string and character literals are matched
//! inside the `noncomment` arm so a `//` inside a string survives. The
//! order of the arms is load-bearing. Normalisation then strips structural
//! whitespace and braces and lowercases, so that formatting-only edits
//! produce identical fingerprints.

use regex::Regex;
use std::sync::OnceLock;

/// Bump when canonicalisation changes; salts the extractor cache.
pub const NORMALIZER_VERSION: &str = "1";

fn comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?ms)",
            r"(?P<comment>//.*?$|[{}]+)",
            r"|(?P<multilinecomment>/\*.*?\*/)",
            r#"|(?P<noncomment>'(\\.|[^\\'])*'|"(\\.|[^\\"])*"|.[^/'"]*)"#,
        ))
        .expect("comment regex is valid")
    })
}

/// Drop `//` and `/* */` comments (and isolated brace runs), keeping
/// string and character literals verbatim.
pub fn strip_comments(body: &str) -> String {
    let mut kept = String::with_capacity(body.len());
    for caps in comment_regex().captures_iter(body) {
        if let Some(m) = caps.name("noncomment") {
            kept.push_str(m.as_str());
        }
    }
    kept
}

/// Canonical token stream: no `\n`, `\r`, `\t`, braces or spaces,
/// lowercased.
pub fn normalize(body: &str) -> String {
    body.chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\t' | '{' | '}' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_comments_are_removed() {
        let body = "int x = 1; // set x\nint y = 2;\n";
        let stripped = strip_comments(body);
        assert!(!stripped.contains("set x"));
        assert!(stripped.contains("int x = 1;"));
        assert!(stripped.contains("int y = 2;"));
    }

    #[test]
    fn block_comments_are_removed_across_lines() {
        let body = "a();\n/* multi\n   line */\nb();\n";
        let stripped = strip_comments(body);
        assert!(!stripped.contains("multi"));
        assert!(stripped.contains("a();"));
        assert!(stripped.contains("b();"));
    }

    #[test]
    fn comment_markers_inside_strings_survive() {
        let body = "s = \"http://example.com\"; t = \"/* keep */\";";
        let stripped = strip_comments(body);
        assert!(stripped.contains("http://example.com"));
        assert!(stripped.contains("/* keep */"));
    }

    #[test]
    fn normalisation_is_format_insensitive() {
        let a = normalize("if (X > 0) {\n\treturn X;\n}");
        let b = normalize("if(x>0){return x;}");
        assert_eq!(a, b);
        assert_eq!(a, "if(x>0)returnx;");
    }

    #[test]
    fn normalisation_keeps_other_whitespace_meaningful_chars() {
        assert_eq!(normalize("A\rB\tC D"), "abcd");
    }
}
