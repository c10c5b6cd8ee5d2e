//! Full-set compaction: merges every table generation into one.
//!
//! Reads walk the generation stack newest to oldest, so lookup cost grows
//! with every flush. Once the stack reaches the configured threshold the
//! engine k-way merges all generations into a single table. Because the
//! merge always covers the entire set, tombstones can be dropped outright:
//! there is no older table left for a deleted key to resurface from.

use sstable::{TableError, TableIter, TableReader, TableWriter};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::io;
use tracing::{info, warn};

use crate::{Error, Inner, Result};

/// One buffered head-of-stream entry inside the merge heap.
///
/// Ordering makes `BinaryHeap::pop` yield the smallest key first and, among
/// equal keys, the highest source index first. Sources are arranged oldest to
/// newest, so the first pop for any key is the winning (newest) version.
struct HeapItem {
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    source: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.key.cmp(&other.key) {
            Ordering::Equal => self.source.cmp(&other.source),
            ord => ord.reverse(), // min-heap on keys
        }
    }
}

impl Inner {
    /// Merges all current generations into a single `f1.sst`.
    ///
    /// The merged output is first written as the *next* generation and only
    /// then renumbered, so every intermediate crash state keeps reads
    /// correct: the counter always references a table set in which the
    /// newest reachable version of each key is the right one, and lookups
    /// already tolerate missing intermediate generations.
    pub(crate) fn compact(&mut self) -> Result<()> {
        let count = self.sst_count;
        if count < 2 {
            return Ok(());
        }

        let opts = self.table_options();
        let mut sources = Vec::new();
        for gen in 1..=count {
            match TableReader::open(self.sst_path(gen), &opts) {
                Ok(reader) => sources.push(reader.iter()?),
                Err(TableError::Io(e)) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let merged = merge_sources(sources)?;
        let live: Vec<(Vec<u8>, Vec<u8>)> = merged
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect();

        if live.is_empty() {
            // Nothing but tombstones survived; the store is empty on disk.
            self.metadata.store(0)?;
            self.sst_count = 0;
            self.remove_generations(count);
        } else {
            let staged = count + 1;
            let staged_path = self.sst_path(staged);
            let smallest = live[0].0.as_slice();
            let largest = live[live.len() - 1].0.as_slice();
            TableWriter::write_sorted(
                &staged_path,
                &opts,
                live.len() as u32,
                smallest,
                largest,
                live.iter().map(|(k, v)| (k.as_slice(), Some(v.as_slice()))),
            )?;
            self.metadata.store(staged)?;

            self.remove_generations(count);
            fs::rename(&staged_path, self.sst_path(1))?;
            self.metadata.store(1)?;
            self.sst_count = 1;
        }

        self.readers.clear();
        info!(inputs = count, live = self.sst_count, "generations compacted");
        Ok(())
    }

    fn remove_generations(&self, upto: u32) {
        for gen in 1..=upto {
            if let Err(e) = fs::remove_file(self.sst_path(gen)) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(gen, error = %e, "failed to remove compacted table");
                }
            }
        }
    }
}

/// K-way merges sorted entry streams, newest source winning per key.
/// Tombstones are kept; the caller decides whether to drop them.
fn merge_sources(
    mut sources: Vec<TableIter>,
) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>> {
    let mut heap = BinaryHeap::new();
    for (source, iter) in sources.iter_mut().enumerate() {
        if let Some(entry) = iter.next() {
            let entry = entry.map_err(Error::from)?;
            heap.push(HeapItem {
                key: entry.key,
                value: entry.value,
                source,
            });
        }
    }

    let mut out: Vec<(Vec<u8>, Option<Vec<u8>>)> = Vec::new();
    while let Some(item) = heap.pop() {
        // Keep the source stream flowing before deciding about the item.
        if let Some(entry) = sources[item.source].next() {
            let entry = entry.map_err(Error::from)?;
            heap.push(HeapItem {
                key: entry.key,
                value: entry.value,
                source: item.source,
            });
        }

        // Equal keys pop newest first; later pops of the same key are older
        // versions and are dropped here.
        if out.last().is_some_and(|(key, _)| *key == item.key) {
            continue;
        }
        out.push((item.key, item.value));
    }

    Ok(out)
}
