//! SHA-256 checksum utilities
//!
//! Checksums use the canonical format `sha256:<hex>`. The loader logs them to
//! identify exactly which set of sources a configuration was built from.

use sha2::{Digest, Sha256};

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Compute the SHA-256 checksum of some content.
pub fn compute_content_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Compute one checksum over a sequence of `(name, content)` pairs.
///
/// Names and contents are length-prefixed, so moving bytes between the name
/// and the content of an entry changes the result.
pub fn compute_entries_checksum<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut hasher = Sha256::new();
    for (name, content) in entries {
        hasher.update((name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(content);
    }
    format!("{}{:x}", PREFIX, hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_checksum_known_value() {
        let checksum = compute_content_checksum(b"hello world");
        assert_eq!(
            checksum,
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn entries_checksum_is_deterministic() {
        let a = compute_entries_checksum([("a.cue", b"x: 1".as_slice())]);
        let b = compute_entries_checksum([("a.cue", b"x: 1".as_slice())]);
        assert_eq!(a, b);
    }

    #[test]
    fn entries_checksum_separates_name_and_content() {
        let a = compute_entries_checksum([("ab", b"c".as_slice())]);
        let b = compute_entries_checksum([("a", b"bc".as_slice())]);
        assert_ne!(a, b);
    }
}
