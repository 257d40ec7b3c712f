//! Tag index (`fuzzy_<tag>.hidx`) model and file format.
//!
//! One index per repository tag. Line 1 is the header
//! `repo \t file_count \t func_count \t line_count`; every further line is
//! `fp \t relpath [\t relpath ...]`. Insertion order of fingerprints is
//! preserved on write; duplicate relpaths per fingerprint are permitted
//! (one per containing file).

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::fingerprint::Fingerprint;

/// In-memory fingerprint map of one tree: ordered `fp -> [relpath...]`
/// plus the header counters.
#[derive(Debug, Default, Clone)]
pub struct TagIndex {
    pub repo: String,
    pub file_count: u64,
    pub func_count: u64,
    pub line_count: u64,
    order: Vec<Fingerprint>,
    paths: HashMap<Fingerprint, Vec<String>>,
}

impl TagIndex {
    pub fn new(repo: &str) -> TagIndex {
        TagIndex {
            repo: repo.to_string(),
            ..TagIndex::default()
        }
    }

    /// Record one function occurrence. First sighting of a fingerprint
    /// fixes its position in the file.
    pub fn push(&mut self, fp: Fingerprint, relpath: String) {
        match self.paths.get_mut(&fp) {
            Some(list) => list.push(relpath),
            None => {
                self.order.push(fp);
                self.paths.insert(fp, vec![relpath]);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Distinct fingerprints.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.paths.contains_key(fp)
    }

    pub fn paths_of(&self, fp: &Fingerprint) -> Option<&[String]> {
        self.paths.get(fp).map(|v| v.as_slice())
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &[String])> {
        self.order.iter().map(move |fp| (fp, self.paths[fp].as_slice()))
    }

    /// Total path occurrences; the header `func_count` must equal this.
    pub fn occurrences(&self) -> u64 {
        self.paths.values().map(|v| v.len() as u64).sum()
    }

    /// Write the index. The parent directory must exist.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)
            .with_context(|| format!("creating tag index {}", path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            self.repo, self.file_count, self.func_count, self.line_count
        )?;
        for (fp, relpaths) in self.iter() {
            out.write_all(fp.as_str().as_bytes())?;
            for relpath in relpaths {
                out.write_all(b"\t")?;
                out.write_all(relpath.as_bytes())?;
            }
            out.write_all(b"\n")?;
        }
        out.flush()
            .with_context(|| format!("writing tag index {}", path.display()))
    }

    /// Read an index back. Malformed body lines are skipped (data defects
    /// are dropped, not propagated); a malformed header is an error since
    /// nothing after it can be trusted.
    pub fn read_from(path: &Path) -> Result<TagIndex> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading tag index {}", path.display()))?;
        let mut lines = text.lines();

        let header = lines
            .next()
            .with_context(|| format!("empty tag index {}", path.display()))?;
        let mut fields = header.split('\t');
        let repo = fields
            .next()
            .with_context(|| format!("headerless tag index {}", path.display()))?;
        let counters: Vec<u64> = fields.map(|f| f.parse().unwrap_or(0)).collect();
        if counters.len() != 3 {
            anyhow::bail!("malformed header in {}", path.display());
        }

        let mut index = TagIndex::new(repo);
        index.file_count = counters[0];
        index.func_count = counters[1];
        index.line_count = counters[2];

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let Some(fp) = fields.next().and_then(Fingerprint::parse) else {
                tracing::warn!("skipping malformed line in {}", path.display());
                continue;
            };
            for relpath in fields {
                index.push(fp, relpath.to_string());
            }
        }
        Ok(index)
    }

    /// Read only the fingerprint column, cheaper when paths are not needed.
    pub fn read_fingerprints(path: &Path) -> Result<Vec<Fingerprint>> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading tag index {}", path.display()))?;
        Ok(text
            .lines()
            .skip(1)
            .filter_map(|line| Fingerprint::parse(line.split('\t').next()?))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(seed: u8) -> Fingerprint {
        let mut hex = String::with_capacity(70);
        for i in 0..70 {
            let digit = (seed as usize + i * 7) % 16;
            hex.push(char::from_digit(digit as u32, 16).unwrap());
        }
        Fingerprint::parse(&hex).unwrap()
    }

    #[test]
    fn push_preserves_insertion_order_and_duplicates() {
        let mut index = TagIndex::new("o%r");
        index.push(fp(1), "/a.c".into());
        index.push(fp(2), "/b.c".into());
        index.push(fp(1), "/copy/a.c".into());

        let collected: Vec<_> = index.iter().collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].1, &["/a.c".to_string(), "/copy/a.c".to_string()]);
        assert_eq!(index.occurrences(), 3);
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuzzy_v1.hidx");

        let mut index = TagIndex::new("o%r");
        index.file_count = 2;
        index.func_count = 3;
        index.line_count = 99;
        index.push(fp(3), "/src/x.c".into());
        index.push(fp(4), "/src/y.c".into());
        index.push(fp(3), "/src/z.c".into());
        index.write_to(&path).unwrap();

        let back = TagIndex::read_from(&path).unwrap();
        assert_eq!(back.repo, "o%r");
        assert_eq!(back.file_count, 2);
        assert_eq!(back.func_count, 3);
        assert_eq!(back.line_count, 99);
        assert_eq!(back.paths_of(&fp(3)).unwrap().len(), 2);
        assert_eq!(back.paths_of(&fp(4)).unwrap(), &["/src/y.c".to_string()]);
        let order: Vec<_> = back.iter().map(|(f, _)| *f).collect();
        assert_eq!(order, vec![fp(3), fp(4)]);
    }

    #[test]
    fn reader_skips_malformed_body_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuzzy_bad.hidx");
        let good = fp(5);
        let text = format!("o%r\t1\t1\t10\nnot-a-fingerprint\t/a.c\n{good}\t/b.c\n\n");
        fs::write(&path, text).unwrap();

        let index = TagIndex::read_from(&path).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.contains(&good));
    }

    #[test]
    fn reader_rejects_malformed_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuzzy_bad.hidx");
        fs::write(&path, "only-repo-name\n").unwrap();
        assert!(TagIndex::read_from(&path).is_err());
    }

    #[test]
    fn fingerprint_column_reader_matches_full_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuzzy_v2.hidx");
        let mut index = TagIndex::new("o%r");
        index.push(fp(6), "/a.c".into());
        index.push(fp(7), "/b.c".into());
        index.write_to(&path).unwrap();

        let fps = TagIndex::read_fingerprints(&path).unwrap();
        assert_eq!(fps, vec![fp(6), fp(7)]);
    }
}
