//! Stage F: the target tree's fingerprint set, held in memory for the
//! matcher. Nothing is persisted; the detector's result file is the only
//! output of a scan.

use std::collections::HashMap;

use lineage_tlsh::Digest;

use crate::fingerprint::Fingerprint;
use crate::tagindex::TagIndex;

pub struct TargetMap {
    paths: HashMap<Fingerprint, Vec<String>>,
    /// Pre-parsed digests for the modified-sibling search; parsing once
    /// here keeps the `O(|pred| x |target|)` loop to raw distance calls.
    digests: Vec<(Fingerprint, Digest)>,
}

impl TargetMap {
    pub fn from_index(index: &TagIndex) -> TargetMap {
        let mut paths = HashMap::new();
        let mut digests = Vec::new();
        for (fp, relpaths) in index.iter() {
            paths.insert(*fp, relpaths.to_vec());
            if let Some(digest) = fp.digest() {
                digests.push((*fp, digest));
            }
        }
        TargetMap { paths, digests }
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.paths.contains_key(fp)
    }

    pub fn paths_of(&self, fp: &Fingerprint) -> Option<&[String]> {
        self.paths.get(fp).map(|v| v.as_slice())
    }

    /// Distinct fingerprints in the target.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn digests(&self) -> &[(Fingerprint, Digest)] {
        &self.digests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_an_index() {
        let mut index = TagIndex::new("target");
        let fp = Fingerprint::of_normalized(
            &"intx=0;for(inti=0;i<12;i++)x+=i*i;returnx;/*rich-enough-body*/printf(\"%d\",x);"
                .repeat(2),
        )
        .unwrap();
        index.push(fp, "/src/a.c".into());
        index.push(fp, "/src/b.c".into());

        let target = TargetMap::from_index(&index);
        assert_eq!(target.len(), 1);
        assert!(target.contains(&fp));
        assert_eq!(target.paths_of(&fp).unwrap().len(), 2);
        assert_eq!(target.digests().len(), 1);
    }
}
