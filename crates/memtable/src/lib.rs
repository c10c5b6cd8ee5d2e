//! # Memtable
//!
//! An in-memory, sorted, mutable write buffer for the Silt storage engine.
//!
//! The memtable is the first point of contact for every write operation. It
//! buffers recent `SET` and `DELETE` operations in a sorted structure
//! (`BTreeMap`) before they are flushed to immutable on-disk SSTables.
//!
//! ## Key properties
//! - **Sorted order**: entries are always in ascending key order (required for
//!   SSTable flush).
//! - **Last write wins**: a later `set` or `delete` of a key replaces whatever
//!   was stored before, including tombstones.
//! - **Tombstone support**: deletes are recorded as `None` markers so that
//!   older values in on-disk tables are correctly shadowed during reads.
//! - **Size tracking**: tracks the byte size of each entry as it would sit in
//!   memory (key bytes, one op tag byte, value bytes) for flush threshold
//!   decisions.
//!
//! ## Example
//! ```rust
//! use memtable::Memtable;
//!
//! let mut m = Memtable::new();
//! m.put(b"hello".to_vec(), b"world".to_vec());
//! assert_eq!(m.get(b"hello"), Some(Some(b"world".as_slice())));
//!
//! m.delete(b"hello".to_vec());
//! assert_eq!(m.get(b"hello"), Some(None));
//! ```

use codec::{Entry, OpKind};
use std::collections::BTreeMap;

/// An ordered, in-memory write buffer backed by a `BTreeMap`.
///
/// Values are stored as `Option<Vec<u8>>`: `Some(bytes)` is a live value,
/// `None` is a tombstone. Both kinds are flushed to SSTables so reads against
/// older generations see the deletion.
#[derive(Debug, Default)]
pub struct Memtable {
    map: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    size: usize,
}

impl Memtable {
    /// Creates a new, empty memtable.
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
            size: 0,
        }
    }

    /// Inserts a key-value pair, replacing any existing entry for the key.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.upsert(key, Some(value));
    }

    /// Records a tombstone for the given key, replacing any existing entry.
    ///
    /// The tombstone shadows older values both here and in on-disk tables
    /// until a full compaction drops it.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.upsert(key, None);
    }

    /// Applies a decoded log entry. This is the WAL-replay entry point; replay
    /// of the same log is idempotent because every insert overwrites by key.
    pub fn apply(&mut self, entry: Entry) {
        match entry.op {
            OpKind::Set => self.upsert(entry.key, Some(entry.value.unwrap_or_default())),
            OpKind::Delete => self.upsert(entry.key, None),
        }
    }

    fn upsert(&mut self, key: Vec<u8>, stored: Option<Vec<u8>>) {
        let key_len = key.len();
        // One tag byte plus the value bytes, mirroring the on-disk record.
        let new_blob = 1 + stored.as_ref().map_or(0, |v| v.len());

        match self.map.insert(key, stored) {
            Some(old) => {
                let old_blob = 1 + old.as_ref().map_or(0, |v| v.len());
                self.size = self.size.saturating_sub(old_blob).saturating_add(new_blob);
            }
            None => {
                self.size = self.size.saturating_add(key_len + new_blob);
            }
        }
    }

    /// Looks up a key.
    ///
    /// - `None` - the key is absent from this buffer (check older tables).
    /// - `Some(None)` - the key is tombstoned here.
    /// - `Some(Some(bytes))` - a live value.
    pub fn get(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        self.map.get(key).map(|stored| stored.as_deref())
    }

    /// Projects the stored state of `key` into a serializable [`Entry`].
    ///
    /// Returns `None` when the key is absent. Used by the flush path, which
    /// needs the op tag preserved (tombstones flush as `Delete` records).
    pub fn entry(&self, key: &[u8]) -> Option<Entry> {
        self.map.get(key).map(|stored| match stored {
            Some(value) => Entry::set(key.to_vec(), value.clone()),
            None => Entry::delete(key.to_vec()),
        })
    }

    /// Returns an iterator over all entries in **ascending key order**,
    /// tombstones included.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], Option<&[u8]>)> {
        self.map.iter().map(|(k, v)| (k.as_slice(), v.as_deref()))
    }

    /// The smallest key currently buffered, if any.
    pub fn first_key(&self) -> Option<&[u8]> {
        self.map.keys().next().map(|k| k.as_slice())
    }

    /// The largest key currently buffered, if any. One step of reverse
    /// iteration; used to fill in the SSTable header at flush time.
    pub fn last_key(&self) -> Option<&[u8]> {
        self.map.keys().next_back().map(|k| k.as_slice())
    }

    /// Returns the number of entries (including tombstones).
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the memtable contains zero entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the byte size of all buffered entries: for each entry, key
    /// bytes plus one op tag byte plus value bytes. This is the quantity the
    /// engine compares against its flush threshold.
    pub fn size_in_bytes(&self) -> usize {
        self.size
    }

    /// Removes all entries and resets the size counter, reusing the existing
    /// allocations.
    pub fn clear(&mut self) {
        self.map.clear();
        self.size = 0;
    }
}
