//! # Bookie Core
//!
//! The hot write path of the bookie entry-storage engine.
//!
//! This crate provides:
//! - **Write cache**: a bounded, segmented in-memory staging area that absorbs
//!   newly appended entries before they are drained into the persistent store
//! - **Ledger index**: per-ledger entry locations with O(1) last-entry lookup
//! - **Alignment**: fixed 64-byte record footprints for predictable placement
//!
//! ## Design Principles
//!
//! 1. **Admission, not blocking** - a full cache rejects a put, it never waits
//! 2. **Append-only segments** - bytes are never rewritten in place
//! 3. **No raw pointers** - entry locations are `(segment, offset, length)` triples
//! 4. **One serialization point** - only `for_each` (and structural
//!   mutations) take the cache exclusively
//!
//! ## Example
//!
//! ```rust
//! use bookie_core::write_cache::{WriteCache, WriteCacheConfig};
//! use std::convert::Infallible;
//!
//! let cache = WriteCache::new(WriteCacheConfig::with_max_cache_size(1024 * 1024));
//!
//! assert!(cache.put(1, 0, b"first").unwrap());
//! assert!(cache.put(1, 1, b"second").unwrap());
//! assert_eq!(cache.get_last_entry(1).unwrap().unwrap().as_ref(), b"second");
//!
//! // Drain in ascending (ledger, entry) order
//! cache
//!     .for_each(|ledger_id, entry_id, entry| {
//!         println!("{ledger_id}:{entry_id} -> {} bytes", entry.len());
//!         Ok::<(), Infallible>(())
//!     })
//!     .unwrap();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alloc;
pub mod write_cache;

// Re-export key types
pub use alloc::{align64, ALIGNMENT};
pub use write_cache::{DuplicatePolicy, WriteCache, WriteCacheConfig, WriteCacheError};
