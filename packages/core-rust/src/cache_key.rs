//! Bounded-length keys for the external cache store.
//!
//! The cache store rejects keys longer than [`MAX_CACHE_KEY_LEN`] bytes.
//! Short inputs are used verbatim; longer inputs are replaced by the
//! hex-encoded SHA-256 digest of the input, which is 64 bytes long and
//! therefore always fits.

use std::fmt;

use sha2::{Digest, Sha256};

/// Maximum length of a cache key in bytes.
pub const MAX_CACHE_KEY_LEN: usize = 512;

/// A key that is guaranteed to be at most [`MAX_CACHE_KEY_LEN`] bytes long.
///
/// The only way to obtain a `CacheKey` is [`CacheKey::new`], so the length
/// bound holds for every value of this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a cache key from an arbitrary string.
    ///
    /// # Examples
    ///
    /// ```
    /// use edgeroute_core::cache_key::{CacheKey, MAX_CACHE_KEY_LEN};
    ///
    /// assert_eq!(CacheKey::new("/de/math").as_str(), "/de/math");
    ///
    /// let long = "x".repeat(MAX_CACHE_KEY_LEN + 1);
    /// assert_eq!(CacheKey::new(&long).as_str().len(), 64);
    /// ```
    #[must_use]
    pub fn new(key: &str) -> Self {
        if key.len() <= MAX_CACHE_KEY_LEN {
            Self(key.to_string())
        } else {
            Self(hex::encode(Sha256::digest(key.as_bytes())))
        }
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn short_keys_are_unchanged() {
        assert_eq!(CacheKey::new("").as_str(), "");
        assert_eq!(CacheKey::new("/de/math").as_str(), "/de/math");
    }

    #[test]
    fn key_of_exactly_max_length_is_unchanged() {
        let key = "a".repeat(MAX_CACHE_KEY_LEN);
        assert_eq!(CacheKey::new(&key).as_str(), key);
    }

    #[test]
    fn long_key_is_replaced_by_digest() {
        let key = format!("/de/{}", "a".repeat(600));
        let cache_key = CacheKey::new(&key);
        assert_eq!(cache_key.as_str().len(), 64);
        assert!(cache_key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn long_key_digest_is_deterministic() {
        let key = "b".repeat(1000);
        assert_eq!(CacheKey::new(&key), CacheKey::new(&key));
    }

    #[test]
    fn length_is_measured_in_bytes() {
        // 300 two-byte characters are 600 bytes and must be hashed.
        let key = "ä".repeat(300);
        assert_eq!(CacheKey::new(&key).as_str().len(), 64);
    }

    proptest! {
        #[test]
        fn bounded_inputs_pass_through(key in ".{0,128}") {
            prop_assume!(key.len() <= MAX_CACHE_KEY_LEN);
            let cache_key = CacheKey::new(&key);
            prop_assert_eq!(cache_key.as_str(), key.as_str());
        }

        #[test]
        fn every_key_fits_the_bound(key in ".{0,700}") {
            prop_assert!(CacheKey::new(&key).as_str().len() <= MAX_CACHE_KEY_LEN);
        }

        #[test]
        fn distinct_long_inputs_get_distinct_keys(
            a in "[a-z]{513,600}",
            b in "[a-z]{513,600}",
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(CacheKey::new(&a), CacheKey::new(&b));
        }
    }
}
