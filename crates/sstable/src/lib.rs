//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk storage files for the Silt storage engine.
//!
//! When the in-memory [`memtable::Memtable`] exceeds its size threshold the
//! engine flushes it to disk as an SSTable. SSTables are **write-once,
//! read-many**: once created they are never modified, only replaced during
//! compaction.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │ HEADER                                            │
//! │                                                   │
//! │ magic (4) | entry_count (u32)                     │
//! │ smallest_len (u32) | smallest_key                 │
//! │ largest_len (u32)  | largest_key | version (u8)   │
//! ├───────────────────────────────────────────────────┤
//! │ ENTRIES (strictly ascending key order)            │
//! │                                                   │
//! │ SET:    0x01 | key_len (u32) | key                │
//! │              | val_len (u32) | val                │
//! │ DELETE: 0x02 | key_len (u32) | key                │
//! │                                                   │
//! │ ... repeated entry_count times ...                │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. The magic bytes and the version byte are
//! configured by the embedding application and validated when a table is
//! opened; a mismatch rejects the whole file.

mod reader;
mod writer;

use thiserror::Error;

pub use reader::{TableIter, TableReader};
pub use writer::TableWriter;

/// Identification bytes stamped into and checked against every table header.
#[derive(Debug, Clone, Copy)]
pub struct TableOptions {
    pub magic: [u8; 4],
    pub version: u8,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] codec::Error),
    #[error("corrupted table: {0}")]
    Corrupted(String),
    #[error("table version {found} is not compatible with engine version {expected}")]
    OutdatedVersion { expected: u8, found: u8 },
    #[error("refusing to write an empty table")]
    Empty,
}
