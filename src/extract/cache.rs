//! Content-addressed cache for per-file extraction results.
//!
//! Adjacent tags of a repository share most of their files, so the
//! collector would otherwise re-run the tagger on identical content once
//! per tag. Keys cover the file bytes, the stored relative path (the
//! extraction result embeds it) and the normaliser/oracle versions, so a
//! stale cache can never survive an algorithm change.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::normalize::NORMALIZER_VERSION;
use super::FileExtract;

pub struct ExtractCache {
    inner: Mutex<Inner>,
    limit: usize,
}

struct Inner {
    map: HashMap<[u8; 32], Arc<FileExtract>>,
    fifo: VecDeque<[u8; 32]>,
}

impl ExtractCache {
    pub fn new(limit: usize) -> ExtractCache {
        ExtractCache {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                fifo: VecDeque::new(),
            }),
            limit,
        }
    }

    /// Cache key for a file's bytes at a given stored path.
    pub fn key(bytes: &[u8], relpath: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(NORMALIZER_VERSION.as_bytes());
        hasher.update([0u8]);
        hasher.update(lineage_tlsh::ORACLE_VERSION.as_bytes());
        hasher.update([0u8]);
        hasher.update(relpath.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        hasher.finalize().into()
    }

    pub fn get(&self, key: &[u8; 32]) -> Option<Arc<FileExtract>> {
        self.inner.lock().map.get(key).cloned()
    }

    pub fn put(&self, key: [u8; 32], value: Arc<FileExtract>) {
        if self.limit == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.map.contains_key(&key) {
            return;
        }
        while inner.map.len() >= self.limit {
            match inner.fifo.pop_front() {
                Some(oldest) => {
                    inner.map.remove(&oldest);
                }
                None => break,
            }
        }
        inner.fifo.push_back(key);
        inner.map.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(funcs: u64) -> Arc<FileExtract> {
        Arc::new(FileExtract {
            pairs: Vec::new(),
            processed: true,
            funcs,
            lines: 1,
        })
    }

    #[test]
    fn key_depends_on_content_and_path() {
        let a = ExtractCache::key(b"abc", "/x.c");
        assert_eq!(a, ExtractCache::key(b"abc", "/x.c"));
        assert_ne!(a, ExtractCache::key(b"abd", "/x.c"));
        assert_ne!(a, ExtractCache::key(b"abc", "/y.c"));
    }

    #[test]
    fn hit_and_miss() {
        let cache = ExtractCache::new(8);
        let key = ExtractCache::key(b"abc", "/x.c");
        assert!(cache.get(&key).is_none());
        cache.put(key, entry(2));
        assert_eq!(cache.get(&key).unwrap().funcs, 2);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let cache = ExtractCache::new(2);
        let k1 = ExtractCache::key(b"1", "/a.c");
        let k2 = ExtractCache::key(b"2", "/a.c");
        let k3 = ExtractCache::key(b"3", "/a.c");
        cache.put(k1, entry(1));
        cache.put(k2, entry(2));
        cache.put(k3, entry(3));
        assert!(cache.get(&k1).is_none());
        assert!(cache.get(&k2).is_some());
        assert!(cache.get(&k3).is_some());
    }

    #[test]
    fn zero_limit_disables_caching() {
        let cache = ExtractCache::new(0);
        let key = ExtractCache::key(b"abc", "/x.c");
        cache.put(key, entry(1));
        assert!(cache.get(&key).is_none());
    }
}
