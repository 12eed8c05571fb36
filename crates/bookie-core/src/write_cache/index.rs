//! Per-ledger entry index.
//!
//! Maps `(ledger, entry)` to the [`EntryLocation`] of the most recent put of
//! that key, and tracks the highest entry id per ledger so the last entry can
//! be found in O(1).

use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use super::config::DuplicatePolicy;
use super::segment::EntryLocation;

/// Marker for a ledger whose last-entry pointer has not been set.
const NO_ENTRY: i64 = -1;

/// Sort key collected during cache iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SortedEntry {
    pub ledger_id: i64,
    pub entry_id: i64,
    pub location: EntryLocation,
}

/// Entries of a single ledger.
struct LedgerEntries {
    entries: RwLock<FxHashMap<i64, EntryLocation>>,
    /// Highest entry id ever indexed for this ledger.
    last_entry_id: AtomicI64,
}

impl LedgerEntries {
    fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            last_entry_id: AtomicI64::new(NO_ENTRY),
        }
    }

    /// Raises the last-entry pointer to `entry_id`; smaller ids leave it alone.
    #[inline]
    fn advance_last_entry(&self, entry_id: i64) {
        self.last_entry_id.fetch_max(entry_id, Ordering::AcqRel);
    }
}

/// Concurrent ledger index.
///
/// Inserts and lookups may run in parallel. Structural operations
/// ([`LedgerIndex::remove_ledger`], [`LedgerIndex::clear`]) are safe on their
/// own, but the owning cache serializes them against puts so that a put
/// never observes a half-removed ledger.
#[derive(Default)]
pub struct LedgerIndex {
    ledgers: RwLock<FxHashMap<i64, Arc<LedgerEntries>>>,
}

impl LedgerIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Points `(ledger_id, entry_id)` at `location`.
    ///
    /// Returns `false` only when `policy` is [`DuplicatePolicy::Reject`] and
    /// the key is already indexed; the existing location is kept in that case.
    pub fn insert(
        &self,
        ledger_id: i64,
        entry_id: i64,
        location: EntryLocation,
        policy: DuplicatePolicy,
    ) -> bool {
        let ledger = self.ledger_or_insert(ledger_id);
        {
            let mut entries = ledger.entries.write();
            match (entries.entry(entry_id), policy) {
                (Entry::Occupied(_), DuplicatePolicy::Reject) => return false,
                (Entry::Occupied(mut slot), DuplicatePolicy::Overwrite) => {
                    slot.insert(location);
                }
                (Entry::Vacant(slot), _) => {
                    slot.insert(location);
                }
            }
        }
        // Index first, pointer second: a concurrent `last_entry` never
        // resolves an id that is not yet indexed.
        ledger.advance_last_entry(entry_id);
        true
    }

    /// Returns the location of `(ledger_id, entry_id)`.
    #[must_use]
    pub fn get(&self, ledger_id: i64, entry_id: i64) -> Option<EntryLocation> {
        let ledger = self.ledger(ledger_id)?;
        let location = ledger.entries.read().get(&entry_id).copied();
        location
    }

    /// Returns `true` if `(ledger_id, entry_id)` is indexed.
    #[must_use]
    pub fn contains(&self, ledger_id: i64, entry_id: i64) -> bool {
        self.get(ledger_id, entry_id).is_some()
    }

    /// Returns the highest indexed entry of `ledger_id` and its location.
    #[must_use]
    pub fn last_entry(&self, ledger_id: i64) -> Option<(i64, EntryLocation)> {
        let ledger = self.ledger(ledger_id)?;
        let entry_id = ledger.last_entry_id.load(Ordering::Acquire);
        if entry_id == NO_ENTRY {
            return None;
        }
        let location = ledger.entries.read().get(&entry_id).copied()?;
        Some((entry_id, location))
    }

    /// Drops the ledger and its last-entry pointer.
    ///
    /// Returns the number of entries that were indexed; 0 for an unknown
    /// ledger.
    pub fn remove_ledger(&self, ledger_id: i64) -> usize {
        self.ledgers
            .write()
            .remove(&ledger_id)
            .map_or(0, |ledger| ledger.entries.read().len())
    }

    /// Returns the number of ledgers with at least one indexed entry.
    #[must_use]
    pub fn ledger_count(&self) -> usize {
        self.ledgers.read().len()
    }

    /// Returns the number of indexed keys across all ledgers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ledgers
            .read()
            .values()
            .map(|ledger| ledger.entries.read().len())
            .sum()
    }

    /// Returns `true` if no key is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every ledger.
    pub fn clear(&self) {
        let mut ledgers = self.ledgers.write();
        ledgers.clear();
        ledgers.shrink_to_fit();
    }

    /// Appends a sort key for every indexed entry to `out` (unsorted).
    pub(crate) fn collect_into(&self, out: &mut Vec<SortedEntry>) {
        let ledgers = self.ledgers.read();
        for (&ledger_id, ledger) in ledgers.iter() {
            let entries = ledger.entries.read();
            out.extend(entries.iter().map(|(&entry_id, &location)| SortedEntry {
                ledger_id,
                entry_id,
                location,
            }));
        }
    }

    fn ledger(&self, ledger_id: i64) -> Option<Arc<LedgerEntries>> {
        self.ledgers.read().get(&ledger_id).cloned()
    }

    fn ledger_or_insert(&self, ledger_id: i64) -> Arc<LedgerEntries> {
        if let Some(ledger) = self.ledger(ledger_id) {
            return ledger;
        }
        Arc::clone(
            self.ledgers
                .write()
                .entry(ledger_id)
                .or_insert_with(|| Arc::new(LedgerEntries::new())),
        )
    }
}

impl std::fmt::Debug for LedgerIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerIndex")
            .field("ledgers", &self.ledger_count())
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(segment_id: usize, offset: usize, length: usize) -> EntryLocation {
        EntryLocation {
            segment_id,
            offset,
            length,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let index = LedgerIndex::new();
        assert!(index.is_empty());

        assert!(index.insert(1, 0, loc(0, 0, 10), DuplicatePolicy::Overwrite));
        assert!(index.insert(1, 1, loc(0, 64, 10), DuplicatePolicy::Overwrite));
        assert!(index.insert(2, 0, loc(0, 128, 5), DuplicatePolicy::Overwrite));

        assert_eq!(index.get(1, 1), Some(loc(0, 64, 10)));
        assert_eq!(index.get(2, 0), Some(loc(0, 128, 5)));
        assert_eq!(index.get(2, 1), None);
        assert_eq!(index.get(3, 0), None);
        assert_eq!(index.len(), 3);
        assert_eq!(index.ledger_count(), 2);
    }

    #[test]
    fn test_overwrite_policy() {
        let index = LedgerIndex::new();
        assert!(index.insert(5, 5, loc(0, 0, 3), DuplicatePolicy::Overwrite));
        assert!(index.insert(5, 5, loc(0, 64, 3), DuplicatePolicy::Overwrite));

        assert_eq!(index.get(5, 5), Some(loc(0, 64, 3)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_reject_policy() {
        let index = LedgerIndex::new();
        assert!(index.insert(5, 5, loc(0, 0, 3), DuplicatePolicy::Reject));
        assert!(!index.insert(5, 5, loc(0, 64, 3), DuplicatePolicy::Reject));

        assert_eq!(index.get(5, 5), Some(loc(0, 0, 3)));
    }

    #[test]
    fn test_last_entry_only_increases() {
        let index = LedgerIndex::new();
        assert_eq!(index.last_entry(1), None);

        index.insert(1, 2, loc(0, 0, 1), DuplicatePolicy::Overwrite);
        index.insert(1, 1, loc(0, 64, 1), DuplicatePolicy::Overwrite);
        index.insert(1, 0, loc(0, 128, 1), DuplicatePolicy::Overwrite);

        assert_eq!(index.last_entry(1), Some((2, loc(0, 0, 1))));

        // Re-put of the last id moves its location
        index.insert(1, 2, loc(1, 0, 1), DuplicatePolicy::Overwrite);
        assert_eq!(index.last_entry(1), Some((2, loc(1, 0, 1))));
    }

    #[test]
    fn test_remove_ledger() {
        let index = LedgerIndex::new();
        index.insert(1, 0, loc(0, 0, 1), DuplicatePolicy::Overwrite);
        index.insert(1, 1, loc(0, 64, 1), DuplicatePolicy::Overwrite);
        index.insert(2, 0, loc(0, 128, 1), DuplicatePolicy::Overwrite);

        assert_eq!(index.remove_ledger(1), 2);
        assert_eq!(index.get(1, 0), None);
        assert_eq!(index.last_entry(1), None);
        assert_eq!(index.get(2, 0), Some(loc(0, 128, 1)));

        // Idempotent
        assert_eq!(index.remove_ledger(1), 0);
        assert_eq!(index.remove_ledger(42), 0);

        // A deleted ledger starts over when written again
        index.insert(1, 0, loc(0, 192, 1), DuplicatePolicy::Overwrite);
        assert_eq!(index.last_entry(1), Some((0, loc(0, 192, 1))));
    }

    #[test]
    fn test_collect_into() {
        let index = LedgerIndex::new();
        index.insert(2, 0, loc(0, 0, 1), DuplicatePolicy::Overwrite);
        index.insert(1, 1, loc(0, 64, 1), DuplicatePolicy::Overwrite);
        index.insert(1, 0, loc(0, 128, 1), DuplicatePolicy::Overwrite);

        let mut out = Vec::new();
        index.collect_into(&mut out);
        out.sort_unstable_by_key(|e| (e.ledger_id, e.entry_id));

        let keys: Vec<(i64, i64)> = out.iter().map(|e| (e.ledger_id, e.entry_id)).collect();
        assert_eq!(keys, vec![(1, 0), (1, 1), (2, 0)]);
    }

    #[test]
    fn test_concurrent_last_entry() {
        let index = LedgerIndex::new();

        std::thread::scope(|s| {
            for t in 0..4i64 {
                let index = &index;
                s.spawn(move || {
                    for i in 0..250i64 {
                        let entry_id = i * 4 + t;
                        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                        let offset = entry_id as usize * 64;
                        index.insert(7, entry_id, loc(0, offset, 1), DuplicatePolicy::Overwrite);
                    }
                });
            }
        });

        assert_eq!(index.len(), 1000);
        assert_eq!(index.last_entry(7).map(|(id, _)| id), Some(999));
    }

    #[test]
    fn test_clear() {
        let index = LedgerIndex::new();
        index.insert(1, 0, loc(0, 0, 1), DuplicatePolicy::Overwrite);
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.ledger_count(), 0);
        assert_eq!(index.last_entry(1), None);
    }
}
