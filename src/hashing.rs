//! SHAKE-128 identity hashing for the dedup store (spec §4.1, §9).
//!
//! Scope names, feed names, and URLs are hashed to signed 64-bit integers so the
//! dedup table can use fixed-width composite keys instead of indexing raw strings.
//! A collision only ever suppresses a single post (spec §4.1 rationale).

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use once_cell::sync::Lazy;
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake128;

const CACHE_SIZE: usize = 4096;

static CACHE: Lazy<Mutex<LruCache<String, i64>>> =
    Lazy::new(|| Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap())));

/// Hash `text` to a signed 64-bit integer via SHAKE-128 truncated to 8 bytes, big-endian.
pub fn hash64(text: &str) -> i64 {
    if let Some(&cached) = CACHE.lock().unwrap().get(text) {
        return cached;
    }
    let mut hasher = Shake128::default();
    hasher.update(text.as_bytes());
    let mut reader = hasher.finalize_xof();
    let mut buf = [0u8; 8];
    reader.read(&mut buf);
    let value = i64::from_be_bytes(buf);
    CACHE.lock().unwrap().put(text.to_string(), value);
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(hash64("https://example.com/a"), hash64("https://example.com/a"));
    }

    #[test]
    fn distinct_inputs_usually_differ() {
        assert_ne!(hash64("https://example.com/a"), hash64("https://example.com/b"));
    }

    #[test]
    fn cache_returns_same_value_across_calls() {
        let a = hash64("distinct-cache-probe");
        for _ in 0..10 {
            assert_eq!(a, hash64("distinct-cache-probe"));
        }
    }
}
