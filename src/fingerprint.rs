//! Fingerprint token shared by every pipeline stage.
//!
//! A fingerprint is the 70-hex-character digest of a normalised function
//! body. It is stored as a fixed-length byte array so that hash maps keyed
//! by it hash raw bytes instead of walking a heap string.

use std::fmt;
use std::str::FromStr;

use lineage_tlsh::Digest;

/// Length of the hex form, after the optional `T1` prefix is stripped.
pub const FP_LEN: usize = lineage_tlsh::DIGEST_HEX_LEN;

/// Oracle outputs that signal unusable input rather than a digest.
const SENTINELS: &[&str] = &["", "TNULL", "NULL"];

/// A 70-character hexadecimal locality-sensitive fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FP_LEN]);

impl Fingerprint {
    /// Parse from the oracle's textual output. Strips an optional `T1`
    /// version prefix, upper-cases, and rejects the sentinels, wrong
    /// lengths, and non-hex bytes.
    pub fn parse(s: &str) -> Option<Fingerprint> {
        let s = s.trim();
        if SENTINELS.contains(&s) {
            return None;
        }
        let body = s
            .strip_prefix(lineage_tlsh::VERSION_PREFIX)
            .filter(|rest| rest.len() == FP_LEN)
            .unwrap_or(s);
        if body.len() != FP_LEN {
            return None;
        }
        let mut raw = [0u8; FP_LEN];
        for (slot, b) in raw.iter_mut().zip(body.bytes()) {
            if !b.is_ascii_hexdigit() {
                return None;
            }
            *slot = b.to_ascii_uppercase();
        }
        Some(Fingerprint(raw))
    }

    /// Fingerprint a normalised function body. `None` when the oracle
    /// rejects the input (too short or too uniform).
    pub fn of_normalized(body: &str) -> Option<Fingerprint> {
        let hashed = lineage_tlsh::hash_force(body.as_bytes());
        Self::parse(&hashed)
    }

    pub fn as_str(&self) -> &str {
        // Invariant: the array only ever holds ASCII hex digits.
        std::str::from_utf8(&self.0).unwrap_or("")
    }

    /// Parsed digest for distance computation. `None` only for tokens that
    /// did not come out of the oracle (e.g. hand-edited index files).
    pub fn digest(&self) -> Option<Digest> {
        Digest::from_hex(self.as_str())
    }

    /// Length-insensitive distance between two fingerprints.
    pub fn distance(&self, other: &Fingerprint) -> Option<u32> {
        Some(self.digest()?.diff(&other.digest()?, false))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.as_str())
    }
}

impl FromStr for Fingerprint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fingerprint::parse(s).ok_or_else(|| anyhow::anyhow!("invalid fingerprint: {s:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(len: usize) -> String {
        let mut x = 0x2545_f491u32;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (b'!' + ((x >> 16) % 94) as u8) as char
            })
            .collect::<String>()
    }

    #[test]
    fn parse_strips_version_prefix() {
        let hashed = lineage_tlsh::hash_force(body(300).as_bytes());
        assert!(hashed.starts_with("T1"));
        let fp = Fingerprint::parse(&hashed).unwrap();
        assert_eq!(fp.as_str().len(), FP_LEN);
        // The bare form parses to the same token.
        assert_eq!(Fingerprint::parse(&hashed[2..]).unwrap(), fp);
    }

    #[test]
    fn parse_rejects_sentinels() {
        assert!(Fingerprint::parse("").is_none());
        assert!(Fingerprint::parse("TNULL").is_none());
        assert!(Fingerprint::parse("NULL").is_none());
        assert!(Fingerprint::parse(&"Z".repeat(FP_LEN)).is_none());
        assert!(Fingerprint::parse(&"A".repeat(FP_LEN + 1)).is_none());
    }

    #[test]
    fn parse_uppercases() {
        let hashed = lineage_tlsh::hash_force(body(300).as_bytes());
        let lower = hashed.to_ascii_lowercase();
        let a = Fingerprint::parse(&hashed).unwrap();
        let b = Fingerprint::parse(&lower).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distance_zero_on_self() {
        let fp = Fingerprint::of_normalized(&body(300)).unwrap();
        assert_eq!(fp.distance(&fp), Some(0));
    }

    #[test]
    fn rejects_low_entropy_bodies() {
        assert!(Fingerprint::of_normalized("").is_none());
        assert!(Fingerprint::of_normalized("x").is_none());
        assert!(Fingerprint::of_normalized(&"a".repeat(400)).is_none());
    }
}
