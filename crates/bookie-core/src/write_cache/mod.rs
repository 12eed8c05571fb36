//! # Write Cache
//!
//! Bounded in-memory staging area for newly appended entries.
//!
//! Writers [`put`](WriteCache::put) entries as they arrive; a background
//! flush path later drains everything with [`for_each`](WriteCache::for_each)
//! in ascending `(ledger, entry)` order into the persistent store, then
//! [`clear`](WriteCache::clear)s the cache for the next cycle.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        WriteCache                         │
//! │                                                           │
//! │   put ──► reserve align64(len) ──► SegmentStore.append    │
//! │              (capacity CAS)          (cursor CAS)         │
//! │                                          │                │
//! │                                          ▼                │
//! │                                  LedgerIndex.insert       │
//! │                              (location + last-entry max)  │
//! │                                                           │
//! │   ┌────────────┐ ┌────────────┐ ┌────────────┐            │
//! │   │ segment 0  │ │ segment 1  │ │ segment 2  │  ...       │
//! │   │ ████████░░ │ │ ██████░░░░ │ │ ░░░░░░░░░░ │            │
//! │   └────────────┘ └────────────┘ └────────────┘            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Puts and lookups hold the cache lock in shared mode and run in parallel.
//! [`for_each`](WriteCache::for_each), [`delete_ledger`](WriteCache::delete_ledger),
//! [`clear`](WriteCache::clear) and [`close`](WriteCache::close) take it
//! exclusively.

mod config;
mod error;
mod index;
mod segment;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, trace};

use crate::alloc::checked_align64;

pub use config::{
    DuplicatePolicy, WriteCacheConfig, DEFAULT_MAX_CACHE_SIZE, DEFAULT_MAX_SEGMENT_SIZE,
};
pub use error::WriteCacheError;
pub use index::LedgerIndex;
pub use segment::{EntryLocation, SegmentStore};

use error::{check_key, check_ledger_id};
use index::SortedEntry;

/// In-memory write cache for ledger entries.
///
/// `WriteCache` is `Send + Sync`; share it across writer threads with an
/// [`Arc`](std::sync::Arc).
pub struct WriteCache {
    config: WriteCacheConfig,
    segments: SegmentStore,
    index: LedgerIndex,
    /// Aligned bytes reserved by accepted puts.
    reserved: AtomicUsize,
    /// Accepted puts since the last clear.
    count: AtomicU64,
    /// Cache-wide lock. Shared for puts and lookups, exclusive for iteration
    /// and structural mutations. The guarded vector is the sort scratch reused
    /// by `for_each`; it only ever grows.
    exclusive: RwLock<Vec<SortedEntry>>,
}

impl WriteCache {
    /// Creates an empty cache. Segment memory is allocated on demand.
    #[must_use]
    pub fn new(config: WriteCacheConfig) -> Self {
        let segment_size = config.effective_segment_size();
        debug!(
            max_cache_size = config.max_cache_size,
            segment_size,
            duplicate_policy = ?config.duplicate_policy,
            "Created write cache"
        );

        Self {
            segments: SegmentStore::new(segment_size, config.segment_store_capacity()),
            index: LedgerIndex::new(),
            reserved: AtomicUsize::new(0),
            count: AtomicU64::new(0),
            exclusive: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Returns the configuration this cache was created with.
    #[must_use]
    pub fn config(&self) -> &WriteCacheConfig {
        &self.config
    }

    /// Stages an entry in the cache.
    ///
    /// Returns `Ok(false)` without side effects when the aligned footprint
    /// does not fit in the remaining capacity, when it exceeds a whole
    /// segment, when segment memory is exhausted (remainders wasted by
    /// segment rolls count against the cache size), or when the key exists
    /// and the policy is [`DuplicatePolicy::Reject`].
    ///
    /// # Errors
    ///
    /// - [`WriteCacheError::InvalidLedgerId`] / [`WriteCacheError::InvalidEntryId`]
    ///   for negative ids, before any mutation
    /// - [`WriteCacheError::Allocation`] if a new segment cannot be allocated;
    ///   the reservation is released first
    pub fn put(&self, ledger_id: i64, entry_id: i64, entry: &[u8]) -> Result<bool, WriteCacheError> {
        check_key(ledger_id, entry_id)?;
        let Some(footprint) = checked_align64(entry.len()) else {
            return Ok(false);
        };

        let _shared = self.exclusive.read();
        let policy = self.config.duplicate_policy;

        if policy == DuplicatePolicy::Reject && self.index.contains(ledger_id, entry_id) {
            trace!(ledger_id, entry_id, "Rejecting duplicate entry");
            return Ok(false);
        }

        if !self.try_reserve(footprint) {
            trace!(
                ledger_id,
                entry_id,
                footprint,
                reserved = self.size(),
                "Write cache full, rejecting entry"
            );
            return Ok(false);
        }

        let location = match self.segments.append(entry, footprint) {
            Ok(Some(location)) => location,
            Ok(None) => {
                self.release(footprint);
                trace!(
                    ledger_id,
                    entry_id,
                    footprint,
                    segment_size = self.segments.segment_size(),
                    allocated = self.segments.allocated_bytes(),
                    "No segment room for entry, rejecting"
                );
                return Ok(false);
            }
            Err(e) => {
                self.release(footprint);
                return Err(e);
            }
        };

        if !self.index.insert(ledger_id, entry_id, location, policy) {
            // Lost a race with a concurrent put of the same key
            self.release(footprint);
            return Ok(false);
        }

        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Returns a read-only copy of the cached entry, if present.
    ///
    /// # Errors
    ///
    /// Returns an invalid-id error for negative ids.
    pub fn get(&self, ledger_id: i64, entry_id: i64) -> Result<Option<Bytes>, WriteCacheError> {
        check_key(ledger_id, entry_id)?;
        let _shared = self.exclusive.read();
        Ok(self
            .index
            .get(ledger_id, entry_id)
            .and_then(|location| self.segments.read(location)))
    }

    /// Returns `true` if the entry is cached.
    ///
    /// # Errors
    ///
    /// Returns an invalid-id error for negative ids.
    pub fn has_entry(&self, ledger_id: i64, entry_id: i64) -> Result<bool, WriteCacheError> {
        check_key(ledger_id, entry_id)?;
        let _shared = self.exclusive.read();
        Ok(self.index.contains(ledger_id, entry_id))
    }

    /// Returns the entry with the highest id cached for `ledger_id`.
    ///
    /// # Errors
    ///
    /// Returns [`WriteCacheError::InvalidLedgerId`] for a negative id.
    pub fn get_last_entry(&self, ledger_id: i64) -> Result<Option<Bytes>, WriteCacheError> {
        check_ledger_id(ledger_id)?;
        let _shared = self.exclusive.read();
        Ok(self
            .index
            .last_entry(ledger_id)
            .and_then(|(_, location)| self.segments.read(location)))
    }

    /// Returns the id of the highest entry cached for `ledger_id`.
    ///
    /// # Errors
    ///
    /// Returns [`WriteCacheError::InvalidLedgerId`] for a negative id.
    pub fn get_last_entry_id(&self, ledger_id: i64) -> Result<Option<i64>, WriteCacheError> {
        check_ledger_id(ledger_id)?;
        let _shared = self.exclusive.read();
        Ok(self.index.last_entry(ledger_id).map(|(entry_id, _)| entry_id))
    }

    /// Makes every entry of `ledger_id` unreachable.
    ///
    /// Deleting an unknown or already-deleted ledger is a no-op. Reserved
    /// bytes and `count()` are not given back until [`clear`](Self::clear).
    ///
    /// # Errors
    ///
    /// Returns [`WriteCacheError::InvalidLedgerId`] for a negative id.
    pub fn delete_ledger(&self, ledger_id: i64) -> Result<(), WriteCacheError> {
        check_ledger_id(ledger_id)?;
        let _exclusive = self.exclusive.write();
        let removed = self.index.remove_ledger(ledger_id);
        if removed > 0 {
            debug!(ledger_id, removed, "Deleted ledger from write cache");
        }
        Ok(())
    }

    /// Visits every live entry in ascending `(ledger_id, entry_id)` order.
    ///
    /// Holds the cache exclusively for the whole call, so the consumer sees a
    /// consistent snapshot. The consumer must not call back into this cache.
    /// Iteration stops at the first consumer error, which is returned as is.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `consumer`.
    pub fn for_each<F, E>(&self, mut consumer: F) -> Result<(), E>
    where
        F: FnMut(i64, i64, &[u8]) -> Result<(), E>,
    {
        let mut sorted = self.exclusive.write();
        let start = Instant::now();

        sorted.clear();
        sorted.reserve(self.index.len());
        self.index.collect_into(&mut sorted);
        sorted.sort_unstable_by_key(|e| (e.ledger_id, e.entry_id));
        let sort_elapsed = start.elapsed();

        for entry in sorted.iter() {
            if let Some(result) = self.segments.with_slice(entry.location, |data| {
                consumer(entry.ledger_id, entry.entry_id, data)
            }) {
                result?;
            }
        }

        debug!(
            entries = sorted.len(),
            sort_us = u64::try_from(sort_elapsed.as_micros()).unwrap_or(u64::MAX),
            iterate_us =
                u64::try_from((start.elapsed() - sort_elapsed).as_micros()).unwrap_or(u64::MAX),
            "Write cache iteration complete"
        );
        Ok(())
    }

    /// Returns the aligned bytes reserved by accepted puts.
    #[must_use]
    pub fn size(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Returns the number of accepted puts since the last clear.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns `true` if no put has been accepted since the last clear.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns the number of keys currently reachable through the index.
    ///
    /// Lower than [`count`](Self::count) after duplicate puts or deletions.
    #[must_use]
    pub fn live_entries(&self) -> usize {
        let _shared = self.exclusive.read();
        self.index.len()
    }

    /// Returns the bytes still available for admission.
    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        self.config.max_cache_size.saturating_sub(self.size())
    }

    /// Returns the segment memory currently allocated.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.segments.allocated_bytes()
    }

    /// Empties the cache, keeping segment memory for reuse.
    pub fn clear(&self) {
        let _exclusive = self.exclusive.write();
        self.reset_contents();
        debug!("Cleared write cache");
    }

    /// Empties the cache and releases all segment memory.
    ///
    /// The cache stays usable; segments are allocated again on demand.
    pub fn close(&self) {
        let mut sorted = self.exclusive.write();
        self.reset_contents();
        self.segments.release();
        *sorted = Vec::new();
        info!("Closed write cache");
    }

    /// Resets index, cursors and counters. Caller holds the exclusive lock.
    fn reset_contents(&self) {
        self.segments.reset();
        self.index.clear();
        self.reserved.store(0, Ordering::Release);
        self.count.store(0, Ordering::Relaxed);
    }

    /// Atomically reserves `footprint` bytes of capacity.
    fn try_reserve(&self, footprint: usize) -> bool {
        let max = self.config.max_cache_size;
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |reserved| {
                reserved.checked_add(footprint).filter(|total| *total <= max)
            })
            .is_ok()
    }

    fn release(&self, footprint: usize) {
        self.reserved.fetch_sub(footprint, Ordering::AcqRel);
    }

    #[cfg(test)]
    fn sort_scratch_capacity(&self) -> usize {
        self.exclusive.read().capacity()
    }
}

impl std::fmt::Debug for WriteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCache")
            .field("max_cache_size", &self.config.max_cache_size)
            .field("size", &self.size())
            .field("count", &self.count())
            .field("segments", &self.segments)
            .finish_non_exhaustive()
    }
}
