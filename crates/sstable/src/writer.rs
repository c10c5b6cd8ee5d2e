use codec::TableHeader;
use memtable::Memtable;
use std::fs::{rename, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;

use crate::{TableError, TableOptions};

/// Writes an immutable SSTable file.
///
/// The writer is stateless; all work happens inside the associated functions.
/// Writes are crash-safe: data goes to a temporary file first, is fsynced,
/// and is then atomically renamed to the final path. A crash mid-write leaves
/// only the temp file behind, which no reader ever looks at.
pub struct TableWriter {}

impl TableWriter {
    /// Flushes `mem` to a new SSTable at `path`.
    ///
    /// The header's smallest and largest keys come from the memtable's min
    /// and max iterators; the entry count includes tombstones, which are
    /// written as `DELETE` records so they keep shadowing older tables.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Empty`] for an empty memtable (writing an empty
    /// table is not useful and likely indicates a logic bug), or any I/O
    /// failure.
    pub fn write_from_memtable(
        path: &Path,
        opts: &TableOptions,
        mem: &Memtable,
    ) -> Result<(), TableError> {
        let (smallest, largest) = match (mem.first_key(), mem.last_key()) {
            (Some(s), Some(l)) => (s.to_vec(), l.to_vec()),
            _ => return Err(TableError::Empty),
        };

        Self::write_sorted(path, opts, mem.len() as u32, &smallest, &largest, mem.iter())
    }

    /// Writes a table from an already-sorted entry stream.
    ///
    /// The caller supplies the header fields; `entries` must yield exactly
    /// `entry_count` items in strictly ascending key order, `None` values
    /// marking tombstones. Compaction uses this entry point directly.
    pub fn write_sorted<'a, I>(
        path: &Path,
        opts: &TableOptions,
        entry_count: u32,
        smallest: &[u8],
        largest: &[u8],
        entries: I,
    ) -> Result<(), TableError>
    where
        I: Iterator<Item = (&'a [u8], Option<&'a [u8]>)>,
    {
        // Temporary file next to the target for the atomic rename below.
        let tmp_path = path.with_extension("sst.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut w = BufWriter::new(file);

        let header = TableHeader {
            magic: opts.magic,
            entry_count,
            smallest_key: smallest.to_vec(),
            largest_key: largest.to_vec(),
            version: opts.version,
        };
        header.write_to(&mut w)?;

        for (key, value) in entries {
            match value {
                Some(value) => codec::write_entry(&mut w, codec::OpKind::Set, key, Some(value))?,
                None => codec::write_entry(&mut w, codec::OpKind::Delete, key, None)?,
            }
        }

        let file = w.into_inner().map_err(|e| TableError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        rename(&tmp_path, path)?;
        sync_dir(path)?;

        Ok(())
    }
}

// Makes the rename itself durable. On non-unix platforms directories cannot
// be opened as files, so this is a no-op there.
#[cfg(unix)]
fn sync_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
