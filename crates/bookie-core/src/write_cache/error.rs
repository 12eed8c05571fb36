//! Error types for write cache operations.

/// Errors that can occur in write cache operations.
///
/// A full cache is not an error: [`WriteCache::put`](super::WriteCache::put)
/// returns `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum WriteCacheError {
    /// Negative ledger id supplied by the caller.
    #[error("Invalid ledger id {0}: must be non-negative")]
    InvalidLedgerId(i64),

    /// Negative entry id supplied by the caller.
    #[error("Invalid entry id {0}: must be non-negative")]
    InvalidEntryId(i64),

    /// A cache segment could not be allocated.
    #[error("Failed to allocate cache segment {segment_id} of {requested} bytes")]
    Allocation {
        /// Segment that was being allocated.
        segment_id: usize,
        /// Requested segment size in bytes.
        requested: usize,
    },
}

/// Validates a ledger id at the API boundary.
#[inline]
pub(crate) fn check_ledger_id(ledger_id: i64) -> Result<(), WriteCacheError> {
    if ledger_id < 0 {
        return Err(WriteCacheError::InvalidLedgerId(ledger_id));
    }
    Ok(())
}

/// Validates a `(ledger, entry)` key at the API boundary.
#[inline]
pub(crate) fn check_key(ledger_id: i64, entry_id: i64) -> Result<(), WriteCacheError> {
    check_ledger_id(ledger_id)?;
    if entry_id < 0 {
        return Err(WriteCacheError::InvalidEntryId(entry_id));
    }
    Ok(())
}
