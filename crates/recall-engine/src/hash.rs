//! Content hashing for change detection and chunk deduplication.

use sha2::{Digest, Sha256};

/// Compute the hex SHA-256 digest of `text`.
///
/// Stable for identical text, so it doubles as the chunk deduplication key
/// and as the file-level change detector.
///
/// # Examples
///
/// ```
/// use recall_engine::hash::content_hash;
///
/// let a = content_hash("hello");
/// let b = content_hash("hello");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// assert_ne!(a, content_hash("hello "));
/// ```
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_hashes_identically() {
        assert_eq!(content_hash("same"), content_hash("same"));
    }

    #[test]
    fn reverted_content_reproduces_previous_hash() {
        let original = content_hash("version one");
        let _modified = content_hash("version two");
        assert_eq!(content_hash("version one"), original);
    }

    #[test]
    fn empty_text_has_a_hash() {
        assert_eq!(content_hash("").len(), 64);
    }
}
