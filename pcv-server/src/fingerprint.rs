//! Fingerprint verification and scoring
//!
//! The fingerprint of a decompressed upload is the SHA-256 digest of its UTF-8
//! bytes, encoded as URL-safe base64. An upload scores only when that
//! fingerprint equals the configured expected value, and the score rewards a
//! small *compact* upload: it is computed from the raw byte length before
//! expansion, not from the expanded text.

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

/// Numerator of the score formula
pub const SCORE_SCALE: u64 = 1_000_000;

/// Result of verifying one decompressed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Fingerprint of the decompressed text, kept whether or not it matched
    pub hash: String,
    pub matched: bool,
    pub score: u64,
}

/// Checks decompressed content against a fixed expected fingerprint
#[derive(Debug, Clone)]
pub struct Verifier {
    expected: String,
}

impl Verifier {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }

    /// Fingerprint a submission must produce to score
    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// Hash `decompressed` and score it against `raw_byte_length`.
    ///
    /// Never fails: malformed input simply hashes to something that does not
    /// match and scores 0.
    pub fn verify(&self, decompressed: &str, raw_byte_length: usize) -> Verification {
        let hash = fingerprint(decompressed);
        let matched = hash == self.expected;
        let score = if matched { score_for(raw_byte_length) } else { 0 };

        Verification {
            hash,
            matched,
            score,
        }
    }
}

/// URL-safe base64 SHA-256 of the text's UTF-8 bytes
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    general_purpose::URL_SAFE.encode(digest)
}

/// `floor(1_000_000 / raw_byte_length)`, or 0 for an empty upload
pub fn score_for(raw_byte_length: usize) -> u64 {
    SCORE_SCALE
        .checked_div(raw_byte_length as u64)
        .unwrap_or(0)
}
