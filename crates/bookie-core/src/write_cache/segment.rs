//! Append-only segment storage for cached entries.
//!
//! The store owns a list of fixed-capacity byte segments. Each segment has an
//! atomic write cursor; a writer claims a byte range by advancing the cursor
//! with compare-and-advance, so two concurrent appends never overlap. When the
//! active segment cannot hold a record, the remainder is wasted and the store
//! rolls to the next segment.
//!
//! Segment memory never exceeds the store capacity: the last segment is cut
//! short to fit, and once it is full further appends are refused.
//!
//! Segments are allocated lazily and kept across [`SegmentStore::reset`], so a
//! cache that is cleared and refilled does not reallocate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use super::error::WriteCacheError;

/// Position of a stored record: `(segment, offset, length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    /// Segment holding the record.
    pub segment_id: usize,
    /// Byte offset of the record inside the segment.
    pub offset: usize,
    /// Payload length in bytes (not the aligned footprint).
    pub length: usize,
}

/// One fixed-capacity memory region.
struct Segment {
    /// Backing bytes; written only inside ranges claimed through `cursor`.
    data: RwLock<Box<[u8]>>,
    /// Next free byte. Only moves forward, except on store reset.
    cursor: AtomicUsize,
    capacity: usize,
}

impl Segment {
    /// Allocates a zeroed segment, failing fast if memory is unavailable.
    fn allocate(segment_id: usize, capacity: usize) -> Result<Self, WriteCacheError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| WriteCacheError::Allocation {
                segment_id,
                requested: capacity,
            })?;
        data.resize(capacity, 0);

        Ok(Self {
            data: RwLock::new(data.into_boxed_slice()),
            cursor: AtomicUsize::new(0),
            capacity,
        })
    }

    /// Claims `footprint` bytes at the cursor.
    ///
    /// Returns the claimed offset, or `None` if the remainder is too small.
    #[inline]
    fn try_claim(&self, footprint: usize) -> Option<usize> {
        self.cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                cursor
                    .checked_add(footprint)
                    .filter(|end| *end <= self.capacity)
            })
            .ok()
    }

    fn used(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }
}

/// Segmented, append-only arena for entry payloads.
///
/// Allocated memory never exceeds `capacity`. Remainders wasted when rolling
/// count against it, so a store with small segments may fill up before the
/// owning cache has reserved its full capacity.
pub struct SegmentStore {
    /// Capacity of every segment except possibly the last.
    segment_size: usize,
    /// Upper bound on the sum of all segment capacities.
    capacity: usize,
    /// Number of segments that fit in `capacity`.
    max_segments: usize,
    /// Allocated segments, indexed by segment id.
    segments: RwLock<Vec<Arc<Segment>>>,
    /// Segment currently receiving appends.
    active: AtomicUsize,
}

impl SegmentStore {
    /// Creates an empty store of at most `capacity` bytes split into segments
    /// of `segment_size`; no memory is allocated until the first append.
    #[must_use]
    pub fn new(segment_size: usize, capacity: usize) -> Self {
        let segment_size = segment_size.max(1);
        Self {
            segment_size,
            capacity,
            max_segments: capacity.div_ceil(segment_size),
            segments: RwLock::new(Vec::new()),
            active: AtomicUsize::new(0),
        }
    }

    /// Returns the capacity of each segment.
    #[must_use]
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Returns the upper bound on allocated segment memory.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of allocated segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Returns the total bytes of segment memory currently allocated.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.segments.read().iter().map(|s| s.capacity).sum()
    }

    /// Returns the id of the segment currently receiving appends.
    #[must_use]
    pub fn active_segment(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Copies `payload` into the store, claiming `footprint` bytes.
    ///
    /// Returns `Ok(None)` if the footprint is larger than a whole segment, or
    /// if placing it would need a segment beyond the store capacity.
    ///
    /// # Errors
    ///
    /// Returns [`WriteCacheError::Allocation`] if a new segment is needed and
    /// its memory cannot be allocated.
    pub fn append(
        &self,
        payload: &[u8],
        footprint: usize,
    ) -> Result<Option<EntryLocation>, WriteCacheError> {
        debug_assert!(payload.len() <= footprint);
        if footprint > self.segment_size {
            return Ok(None);
        }

        loop {
            let segment_id = self.active.load(Ordering::Acquire);
            if segment_id >= self.max_segments {
                return Ok(None);
            }
            let segment = self.segment_or_allocate(segment_id)?;

            if let Some(offset) = segment.try_claim(footprint) {
                segment.data.write()[offset..offset + payload.len()].copy_from_slice(payload);
                return Ok(Some(EntryLocation {
                    segment_id,
                    offset,
                    length: payload.len(),
                }));
            }

            self.roll(segment_id, &segment);
        }
    }

    /// Returns a copy of the record at `location`.
    #[must_use]
    pub fn read(&self, location: EntryLocation) -> Option<Bytes> {
        self.with_slice(location, Bytes::copy_from_slice)
    }

    /// Runs `f` over the stored bytes at `location` without copying.
    pub fn with_slice<R>(&self, location: EntryLocation, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let segment = Arc::clone(self.segments.read().get(location.segment_id)?);
        let data = segment.data.read();
        let end = location.offset.checked_add(location.length)?;
        data.get(location.offset..end).map(f)
    }

    /// Rewinds every segment cursor and makes segment 0 active again.
    ///
    /// Memory is retained for reuse.
    pub fn reset(&self) {
        let segments = self.segments.read();
        for segment in segments.iter() {
            segment.cursor.store(0, Ordering::Release);
        }
        self.active.store(0, Ordering::Release);
    }

    /// Drops all segment memory.
    pub fn release(&self) {
        let mut segments = self.segments.write();
        let released: usize = segments.iter().map(|s| s.capacity).sum();
        segments.clear();
        segments.shrink_to_fit();
        self.active.store(0, Ordering::Release);
        debug!(released_bytes = released, "Released write cache segments");
    }

    /// Returns the segment with `segment_id`, allocating up to it if needed.
    fn segment_or_allocate(&self, segment_id: usize) -> Result<Arc<Segment>, WriteCacheError> {
        if let Some(segment) = self.segments.read().get(segment_id) {
            return Ok(Arc::clone(segment));
        }

        let mut segments = self.segments.write();
        while segments.len() <= segment_id {
            let id = segments.len();
            let size = self.segment_capacity(id);
            segments.push(Arc::new(Segment::allocate(id, size)?));
            debug!(segment_id = id, segment_size = size, "Allocated write cache segment");
        }
        Ok(Arc::clone(&segments[segment_id]))
    }

    /// Capacity of segment `segment_id`; the last one takes what is left.
    fn segment_capacity(&self, segment_id: usize) -> usize {
        let start = segment_id.saturating_mul(self.segment_size);
        self.segment_size.min(self.capacity.saturating_sub(start))
    }

    /// Moves the active pointer past `from`, unless another writer already did.
    fn roll(&self, from: usize, segment: &Segment) {
        if self
            .active
            .compare_exchange(from, from + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!(
                segment_id = from,
                wasted_bytes = segment.capacity.saturating_sub(segment.used()),
                "Rolling to next write cache segment"
            );
        }
    }
}

impl std::fmt::Debug for SegmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentStore")
            .field("segment_size", &self.segment_size)
            .field("capacity", &self.capacity)
            .field("segment_count", &self.segment_count())
            .field("active", &self.active_segment())
            .finish()
    }
}
