//! Cache key derivation.
//!
//! A URI is hashed into a fixed-length, filesystem-safe key that names both the
//! memory-cache entry and the disk-cache file.

use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use tracing::warn;

/// Length in hex characters of a digest-derived key (128 bits).
pub const DIGEST_KEY_LEN: usize = 32;

/// Known answer for the digest self-check: first 128 bits of SHA-256("").
const EMPTY_DIGEST_PREFIX: &str = "e3b0c44298fc1c149afbf4c8996fb924";

/// Hashed, filesystem-safe representation of a source URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for a URI with the process-wide hasher.
    #[must_use]
    pub fn from_uri(uri: &str) -> Self {
        KeyHasher::global().hash(uri)
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strategy used to turn URIs into cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyHasher {
    /// 128-bit truncated SHA-256 rendered as 32 lowercase hex characters.
    Digest,
    /// Weaker 32-bit polynomial string hash, used when the digest fails its self-check.
    Fallback,
}

impl KeyHasher {
    /// Returns the hasher chosen once for the lifetime of the process.
    ///
    /// The choice is fixed after the first call so a URI always maps to the
    /// same disk filename within one process.
    pub fn global() -> Self {
        static HASHER: OnceLock<KeyHasher> = OnceLock::new();
        *HASHER.get_or_init(Self::detect)
    }

    /// Verifies the digest against a known answer and picks a strategy.
    #[must_use]
    pub fn detect() -> Self {
        if digest_hex(b"") == EMPTY_DIGEST_PREFIX {
            Self::Digest
        } else {
            warn!("Digest self-check failed, falling back to string hash for cache keys");
            Self::Fallback
        }
    }

    /// Hashes a URI into a cache key. Never fails.
    #[must_use]
    pub fn hash(self, uri: &str) -> CacheKey {
        match self {
            Self::Digest => CacheKey(digest_hex(uri.as_bytes())),
            Self::Fallback => CacheKey(fallback_hex(uri)),
        }
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    hex::encode(&result[..DIGEST_KEY_LEN / 2])
}

fn fallback_hex(uri: &str) -> String {
    let hash = uri
        .encode_utf16()
        .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(u32::from(unit)));
    format!("{hash:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_digest_key_shape() {
        let key = KeyHasher::Digest.hash("https://example.com/images/cat.png");
        assert_eq!(key.as_str().len(), DIGEST_KEY_LEN);
        assert!(
            key.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn test_key_is_deterministic() {
        let uri = "https://example.com/image.png";
        assert_eq!(CacheKey::from_uri(uri), CacheKey::from_uri(uri));
        assert_eq!(KeyHasher::Fallback.hash(uri), KeyHasher::Fallback.hash(uri));
    }

    #[test]
    fn test_no_collisions_across_corpus() {
        let keys: HashSet<CacheKey> = (0..2000)
            .map(|i| KeyHasher::Digest.hash(&format!("https://cdn.example.com/thumbs/{i}.jpg")))
            .collect();
        assert_eq!(keys.len(), 2000);
    }

    #[test]
    fn test_detect_prefers_digest() {
        assert_eq!(KeyHasher::detect(), KeyHasher::Digest);
        assert_eq!(KeyHasher::global(), KeyHasher::Digest);
    }

    #[test]
    fn test_fallback_matches_polynomial_hash() {
        // "a" = 97, "ab" = 97 * 31 + 98 = 3105
        assert_eq!(KeyHasher::Fallback.hash("a").as_str(), "00000061");
        assert_eq!(KeyHasher::Fallback.hash("ab").as_str(), "00000c21");
    }
}
