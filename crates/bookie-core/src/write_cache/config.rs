//! Write cache configuration types.

use serde::{Deserialize, Serialize};

use crate::alloc::{align64, ALIGNMENT};

/// Default maximum cache size (64 MiB).
pub const DEFAULT_MAX_CACHE_SIZE: usize = 64 * 1024 * 1024;

/// Default maximum segment size (1 GiB).
///
/// The effective segment size is capped at the aligned cache size. Total
/// segment memory never exceeds the aligned cache size either.
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 1024 * 1024 * 1024;

/// What `put` does when the `(ledger, entry)` key is already cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Accept the put; the index points at the newest copy.
    ///
    /// The older bytes stay in their segment as garbage until `clear`.
    #[default]
    Overwrite,

    /// Reject the put with `Ok(false)`, leaving the cached copy untouched.
    Reject,
}

/// Configuration for a [`WriteCache`](super::WriteCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteCacheConfig {
    /// Maximum number of bytes (aligned footprints) the cache admits.
    pub max_cache_size: usize,

    /// Upper bound for the size of a single segment.
    pub max_segment_size: usize,

    /// Behaviour on re-put of an existing key.
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for WriteCacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            duplicate_policy: DuplicatePolicy::Overwrite,
        }
    }
}

impl WriteCacheConfig {
    /// Creates a configuration with the given capacity and default settings.
    #[must_use]
    pub fn with_max_cache_size(max_cache_size: usize) -> Self {
        Self {
            max_cache_size,
            ..Default::default()
        }
    }

    /// Sets the maximum segment size.
    #[must_use]
    pub fn max_segment_size(mut self, max_segment_size: usize) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }

    /// Sets the duplicate-key policy.
    #[must_use]
    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Returns the segment size actually used by the cache.
    ///
    /// Always a multiple of [`ALIGNMENT`], at least one alignment unit, and
    /// never larger than the aligned cache capacity.
    #[must_use]
    pub fn effective_segment_size(&self) -> usize {
        let cache_cap = align64(self.max_cache_size.min(usize::MAX - ALIGNMENT));
        let segment_cap = self.max_segment_size & !(ALIGNMENT - 1);
        segment_cap.min(cache_cap).max(ALIGNMENT)
    }

    /// Returns the upper bound on segment memory: the aligned cache size.
    #[must_use]
    pub fn segment_store_capacity(&self) -> usize {
        align64(self.max_cache_size.min(usize::MAX - ALIGNMENT)).max(ALIGNMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WriteCacheConfig::default();
        assert_eq!(config.max_cache_size, DEFAULT_MAX_CACHE_SIZE);
        assert_eq!(config.max_segment_size, DEFAULT_MAX_SEGMENT_SIZE);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Overwrite);
        assert_eq!(config.effective_segment_size(), DEFAULT_MAX_CACHE_SIZE);
    }

    #[test]
    fn test_effective_segment_size() {
        // Small cache caps the segment
        let config = WriteCacheConfig::with_max_cache_size(1000);
        assert_eq!(config.effective_segment_size(), 1024);

        // Explicit segment size rounds down to the alignment unit
        let config = WriteCacheConfig::with_max_cache_size(1 << 20).max_segment_size(1000);
        assert_eq!(config.effective_segment_size(), 960);

        // Never below one alignment unit
        let config = WriteCacheConfig::with_max_cache_size(0);
        assert_eq!(config.effective_segment_size(), ALIGNMENT);
        let config = WriteCacheConfig::with_max_cache_size(1 << 20).max_segment_size(10);
        assert_eq!(config.effective_segment_size(), ALIGNMENT);
    }

    #[test]
    fn test_segment_store_capacity() {
        assert_eq!(WriteCacheConfig::with_max_cache_size(1024).segment_store_capacity(), 1024);
        assert_eq!(WriteCacheConfig::with_max_cache_size(1000).segment_store_capacity(), 1024);
        assert_eq!(WriteCacheConfig::with_max_cache_size(0).segment_store_capacity(), ALIGNMENT);
    }

    #[test]
    fn test_builder() {
        let config = WriteCacheConfig::with_max_cache_size(4096)
            .max_segment_size(1024)
            .duplicate_policy(DuplicatePolicy::Reject);
        assert_eq!(config.max_cache_size, 4096);
        assert_eq!(config.max_segment_size, 1024);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
    }
}
