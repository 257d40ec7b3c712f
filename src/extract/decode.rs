//! Best-effort decoding of upstream source files.
//!
//! Upstream trees carry every encoding under the sun. The ladder tries the
//! common encodings in frequency order, then charset sniffing with a
//! confidence floor, and finally forces latin-1, which cannot fail. The
//! caller needs to know whether the bytes were already valid UTF-8: if they
//! were not, the tagger must run on a transcoded copy so its line numbers
//! agree with the decoded text.

/// Minimum sniffing confidence before a detected charset is trusted.
const SNIFF_CONFIDENCE_FLOOR: f32 = 0.7;

/// A decoded source file.
#[derive(Debug)]
pub struct SourceText {
    pub text: String,
    /// False when the on-disk bytes were not valid UTF-8/ASCII and any
    /// line-oriented external tool must see a transcoded copy instead.
    pub utf8_on_disk: bool,
}

/// Decode a byte buffer through the ladder. Infallible by construction:
/// the final latin-1 arm accepts every byte sequence.
pub fn decode(bytes: &[u8]) -> SourceText {
    // UTF-8 first; this also covers pure ASCII.
    if let Ok(text) = std::str::from_utf8(bytes) {
        return SourceText {
            text: text.to_string(),
            utf8_on_disk: true,
        };
    }

    if let Some(text) = encoding_rs::GB18030
        .decode_without_bom_handling_and_without_replacement(bytes)
    {
        return SourceText {
            text: text.into_owned(),
            utf8_on_disk: false,
        };
    }

    // Charset sniffing, only trusted above the confidence floor.
    let (charset, confidence, _) = chardet::detect(bytes);
    if confidence > SNIFF_CONFIDENCE_FLOOR {
        if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
            if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes)
            {
                return SourceText {
                    text: text.into_owned(),
                    utf8_on_disk: false,
                };
            }
        }
    }

    // Forced latin-1: every byte maps to a code point.
    SourceText {
        text: bytes.iter().map(|&b| b as char).collect(),
        utf8_on_disk: false,
    }
}
