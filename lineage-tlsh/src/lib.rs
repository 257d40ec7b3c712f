//! TLSH-family locality-sensitive hash.
//!
//! Produces a 72-character digest (`T1` version prefix + 70 hex characters)
//! from an input byte stream, and a symmetric integer distance between two
//! digests. Similar inputs yield digests at small distance; unrelated inputs
//! land far apart. The rest of the workspace treats this crate as an opaque
//! oracle and only ever sees the textual digest and the distance.
//!
//! Layout of the 35 digest bytes:
//!
//! ```text
//! [checksum:1][lvalue:1][q-ratios:1][body:32]
//! ```
//!
//! The body packs 128 two-bit bucket codes. Header bytes are emitted with
//! their nibbles swapped, and the body is emitted bucket 127 first, matching
//! the classic digest layout.

use std::fmt;

/// Version prefix carried by every rendered digest.
pub const VERSION_PREFIX: &str = "T1";

/// Hex characters in a digest after the version prefix is stripped.
pub const DIGEST_HEX_LEN: usize = 70;

/// Bump when the digest computation changes; consumers use this to salt
/// content-addressed caches.
pub const ORACLE_VERSION: &str = "tlsh-128-1";

const WINDOW: usize = 5;
const BUCKETS: usize = 128;
const CODE_SIZE: usize = 32;

/// Inputs shorter than this carry too little structure to fingerprint.
pub const MIN_DATA_LEN: usize = 50;

/// Pearson permutation table; the salted triplet mapping below walks it.
#[rustfmt::skip]
const V_TABLE: [u8; 256] = [
    1, 87, 49, 12, 176, 178, 102, 166, 121, 193, 6, 84, 249, 230, 44, 163,
    14, 197, 213, 181, 161, 85, 218, 80, 64, 239, 24, 226, 236, 142, 38, 200,
    110, 177, 104, 103, 141, 253, 255, 50, 77, 101, 81, 18, 45, 96, 31, 222,
    25, 107, 190, 70, 86, 237, 240, 34, 72, 242, 20, 214, 244, 227, 149, 235,
    97, 234, 57, 22, 60, 250, 82, 175, 208, 5, 127, 199, 111, 62, 135, 248,
    174, 169, 211, 58, 66, 154, 106, 195, 245, 171, 17, 187, 182, 179, 0, 243,
    132, 56, 148, 75, 128, 133, 158, 100, 130, 126, 91, 13, 153, 246, 216, 219,
    119, 68, 223, 78, 83, 88, 201, 99, 122, 11, 92, 32, 136, 114, 52, 10,
    138, 30, 48, 183, 156, 35, 61, 26, 143, 74, 251, 94, 129, 162, 63, 152,
    170, 7, 115, 167, 241, 206, 3, 150, 55, 59, 151, 220, 90, 53, 23, 131,
    125, 173, 15, 238, 79, 95, 89, 16, 105, 137, 225, 224, 217, 160, 37, 123,
    118, 73, 2, 157, 46, 116, 9, 145, 134, 228, 207, 212, 202, 215, 69, 229,
    27, 188, 67, 124, 168, 252, 42, 4, 29, 108, 21, 247, 19, 205, 39, 203,
    233, 40, 186, 147, 198, 192, 155, 33, 164, 191, 98, 204, 165, 180, 117, 76,
    140, 36, 210, 172, 41, 54, 159, 8, 185, 232, 113, 196, 231, 47, 146, 120,
    51, 65, 28, 144, 254, 221, 93, 189, 194, 139, 112, 43, 71, 109, 184, 209,
];

#[inline]
fn b_mapping(salt: u8, i: u8, j: u8, k: u8) -> u8 {
    let mut h = V_TABLE[salt as usize];
    h = V_TABLE[(h ^ i) as usize];
    h = V_TABLE[(h ^ j) as usize];
    V_TABLE[(h ^ k) as usize]
}

#[inline]
fn swap_nibbles(b: u8) -> u8 {
    (b << 4) | (b >> 4)
}

/// Log-bucketed capture of the input length, capped at 255.
fn l_capturing(len: usize) -> u8 {
    let len = len as f64;
    let l = if len <= 656.0 {
        (len.ln() / 1.5f64.ln()).floor()
    } else if len <= 3199.0 {
        (len.ln() / 1.3f64.ln() - 8.727_77).floor()
    } else {
        (len.ln() / 1.1f64.ln() - 62.547_2).floor()
    };
    l.clamp(0.0, 255.0) as u8
}

fn mod_diff(a: u8, b: u8, range: u32) -> u32 {
    let dl = (a as i32 - b as i32).unsigned_abs();
    let dr = range - dl;
    dl.min(dr)
}

/// A parsed digest. Obtained from [`hash_force`] via [`Digest::from_hex`],
/// or directly from [`digest_force`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Digest {
    checksum: u8,
    lvalue: u8,
    q1_ratio: u8,
    q2_ratio: u8,
    code: [u8; CODE_SIZE],
}

impl Digest {
    /// Parse a digest from its textual form. Accepts the 72-character
    /// `T1`-prefixed rendering or the bare 70 hex characters; case is
    /// ignored. Returns `None` for anything else, including the `TNULL`
    /// sentinel.
    pub fn from_hex(s: &str) -> Option<Digest> {
        let body = s.strip_prefix(VERSION_PREFIX).unwrap_or(s);
        if body.len() != DIGEST_HEX_LEN {
            return None;
        }
        let mut bytes = [0u8; DIGEST_HEX_LEN / 2];
        for (i, chunk) in body.as_bytes().chunks_exact(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }

        let checksum = swap_nibbles(bytes[0]);
        let lvalue = swap_nibbles(bytes[1]);
        let qb = swap_nibbles(bytes[2]);
        let mut code = [0u8; CODE_SIZE];
        for i in 0..CODE_SIZE {
            code[i] = bytes[3 + (CODE_SIZE - 1 - i)];
        }
        Some(Digest {
            checksum,
            lvalue,
            q1_ratio: qb >> 4,
            q2_ratio: qb & 0x0F,
            code,
        })
    }

    /// Render the digest with its `T1` version prefix (72 characters).
    pub fn to_hex(&self) -> String {
        const HEX: &[u8; 16] = b"0123456789ABCDEF";
        let mut out = String::with_capacity(VERSION_PREFIX.len() + DIGEST_HEX_LEN);
        out.push_str(VERSION_PREFIX);
        let mut push = |b: u8| {
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        };
        push(swap_nibbles(self.checksum));
        push(swap_nibbles(self.lvalue));
        push(swap_nibbles((self.q1_ratio << 4) | self.q2_ratio));
        for i in 0..CODE_SIZE {
            push(self.code[CODE_SIZE - 1 - i]);
        }
        out
    }

    /// Distance to another digest. Symmetric; zero against itself.
    /// `include_len` adds the length-bucket component; the pipeline uses the
    /// length-insensitive form so that padding alone does not separate
    /// siblings.
    pub fn diff(&self, other: &Digest, include_len: bool) -> u32 {
        let mut d = 0u32;

        if include_len {
            let ld = mod_diff(self.lvalue, other.lvalue, 256);
            d += if ld <= 1 { ld } else { ld * 12 };
        }

        let q1d = mod_diff(self.q1_ratio, other.q1_ratio, 16);
        d += if q1d <= 1 { q1d } else { (q1d - 1) * 12 };
        let q2d = mod_diff(self.q2_ratio, other.q2_ratio, 16);
        d += if q2d <= 1 { q2d } else { (q2d - 1) * 12 };

        if self.checksum != other.checksum {
            d += 1;
        }

        for i in 0..CODE_SIZE {
            let (mut a, mut b) = (self.code[i], other.code[i]);
            for _ in 0..4 {
                let delta = ((a & 0x03) as i32 - (b & 0x03) as i32).unsigned_abs();
                d += if delta == 3 { 6 } else { delta };
                a >>= 2;
                b >>= 2;
            }
        }

        d
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute a digest, forcing output for low-variety inputs where possible.
/// Returns `None` when the input is shorter than [`MIN_DATA_LEN`] or so
/// uniform that three quarters of the buckets stay empty.
pub fn digest_force(data: &[u8]) -> Option<Digest> {
    if data.len() < MIN_DATA_LEN {
        return None;
    }

    let mut checksum = 0u8;
    let mut buckets = [0u32; 256];
    for w in data.windows(WINDOW) {
        // w[4] is the newest byte of the sliding window.
        let (b4, b3, b2, b1, b0) = (w[0], w[1], w[2], w[3], w[4]);
        checksum = b_mapping(0, b0, b1, checksum);
        buckets[b_mapping(2, b0, b1, b2) as usize] += 1;
        buckets[b_mapping(3, b0, b1, b3) as usize] += 1;
        buckets[b_mapping(5, b0, b2, b3) as usize] += 1;
        buckets[b_mapping(7, b0, b2, b4) as usize] += 1;
        buckets[b_mapping(11, b0, b1, b4) as usize] += 1;
        buckets[b_mapping(13, b0, b3, b4) as usize] += 1;
    }

    let mut sorted: Vec<u32> = buckets[..BUCKETS].to_vec();
    sorted.sort_unstable();
    let q1 = sorted[BUCKETS / 4 - 1];
    let q2 = sorted[BUCKETS / 2 - 1];
    let q3 = sorted[BUCKETS * 3 / 4 - 1];
    if q3 == 0 {
        return None;
    }

    let mut code = [0u8; CODE_SIZE];
    for (i, &count) in buckets[..BUCKETS].iter().enumerate() {
        let cell = if count <= q1 {
            0u8
        } else if count <= q2 {
            1
        } else if count <= q3 {
            2
        } else {
            3
        };
        code[i / 4] |= cell << ((i % 4) * 2);
    }

    Some(Digest {
        checksum,
        lvalue: l_capturing(data.len()),
        q1_ratio: ((q1 as u64 * 100 / q3 as u64) % 16) as u8,
        q2_ratio: ((q2 as u64 * 100 / q3 as u64) % 16) as u8,
        code,
    })
}

/// Textual convenience over [`digest_force`]: the `T1`-prefixed digest, or
/// an empty string for unusable input. Mirrors the classic `forcehash`
/// contract that callers gate with sentinel checks.
pub fn hash_force(data: &[u8]) -> String {
    match digest_force(data) {
        Some(d) => d.to_hex(),
        None => String::new(),
    }
}
