use codec::{Entry, OpKind, TableHeader};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::{TableError, TableOptions};

/// Reads an SSTable file for point lookups.
///
/// On [`open`](TableReader::open) the header is validated and the entry
/// stream is scanned once to build an in-memory index mapping each key to its
/// byte offset. Point lookups then require a single seek plus one record
/// decode.
///
/// The data file itself is **not** kept open between lookups. Each
/// [`get`](TableReader::get) call opens the file, seeks, reads the record,
/// and closes the handle; the table is immutable, so the index never goes
/// stale.
#[derive(Debug)]
pub struct TableReader {
    /// Path to the `.sst` file on disk.
    path: PathBuf,
    header: TableHeader,
    /// Byte offset of the first entry (end of the header).
    entries_start: u64,
    /// In-memory index mapping each key to its entry's byte offset.
    index: BTreeMap<Vec<u8>, u64>,
}

impl TableReader {
    /// Opens an SSTable and loads its index into memory.
    ///
    /// # Validation
    ///
    /// - The header magic must equal `opts.magic`, otherwise the file is
    ///   rejected as corrupted.
    /// - The header version must equal `opts.version`, otherwise the file is
    ///   rejected as incompatible.
    ///
    /// A file truncated mid-entry surfaces the short read as an I/O error.
    pub fn open<P: AsRef<Path>>(path: P, opts: &TableOptions) -> Result<Self, TableError> {
        let path = path.as_ref().to_path_buf();
        let mut r = BufReader::new(File::open(&path)?);

        let header = TableHeader::read_from(&mut r)?;
        if header.magic != opts.magic {
            return Err(TableError::Corrupted(format!(
                "bad magic {:02x?} in {}",
                header.magic,
                path.display()
            )));
        }
        if header.version != opts.version {
            return Err(TableError::OutdatedVersion {
                expected: opts.version,
                found: header.version,
            });
        }

        let entries_start = r.stream_position()?;
        let mut index = BTreeMap::new();
        let mut offset = entries_start;
        while let Some(entry) = codec::read_entry(&mut r)? {
            index.insert(entry.key, offset);
            offset = r.stream_position()?;
        }

        Ok(Self {
            path,
            header,
            entries_start,
            index,
        })
    }

    /// Point lookup for a single key.
    ///
    /// - `Ok(None)` - the key is not in this table; the caller should move on
    ///   to the next older generation.
    /// - `Ok(Some(None))` - the key is tombstoned here; it must be treated as
    ///   deleted regardless of what older generations hold.
    /// - `Ok(Some(Some(bytes)))` - a live value.
    ///
    /// Keys outside the header's `[smallest, largest]` range are rejected
    /// without touching the file at all.
    pub fn get(&self, key: &[u8]) -> Result<Option<Option<Vec<u8>>>, TableError> {
        if key < self.header.smallest_key.as_slice() || key > self.header.largest_key.as_slice() {
            return Ok(None);
        }

        let offset = match self.index.get(key) {
            Some(offset) => *offset,
            None => return Ok(None),
        };

        // Open per lookup; the handle lives only for this one read.
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut r = BufReader::new(file);

        let entry = codec::read_entry(&mut r)?.ok_or_else(|| {
            TableError::Corrupted(format!("entry offset {} past end of file", offset))
        })?;
        if entry.key != key {
            return Err(TableError::Corrupted(
                "index points at a mismatching key".to_string(),
            ));
        }

        match entry.op {
            OpKind::Set => Ok(Some(Some(entry.value.unwrap_or_default()))),
            OpKind::Delete => Ok(Some(None)),
        }
    }

    /// Streams every entry in file order (ascending by key).
    ///
    /// Opens an independent handle, so multiple iterations and concurrent
    /// lookups do not disturb each other. Compaction drains tables this way.
    pub fn iter(&self) -> Result<TableIter, TableError> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.entries_start))?;
        Ok(TableIter {
            reader: BufReader::new(file),
        })
    }

    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    /// Returns the number of entries in the in-memory index.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Streaming decoder over a table's entry section.
pub struct TableIter {
    reader: BufReader<File>,
}

impl Iterator for TableIter {
    type Item = Result<Entry, TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        match codec::read_entry(&mut self.reader) {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TableWriter;
    use memtable::Memtable;
    use tempfile::tempdir;

    const OPTS: TableOptions = TableOptions {
        magic: *b"LSMD",
        version: 0x01,
    };

    fn make_sample_memtable() -> Memtable {
        let mut m = Memtable::new();
        m.put(b"a".to_vec(), b"apple".to_vec());
        m.put(b"b".to_vec(), b"banana".to_vec());
        m.put(b"c".to_vec(), b"".to_vec());
        m.delete(b"d".to_vec());
        m
    }

    // -------------------- Open & get --------------------

    #[test]
    fn open_and_get_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.sst");
        TableWriter::write_from_memtable(&path, &OPTS, &make_sample_memtable()).unwrap();

        let reader = TableReader::open(&path, &OPTS).unwrap();
        assert_eq!(reader.len(), 4);

        assert_eq!(reader.get(b"a").unwrap(), Some(Some(b"apple".to_vec())));
        assert_eq!(reader.get(b"b").unwrap(), Some(Some(b"banana".to_vec())));
        // Present but empty value.
        assert_eq!(reader.get(b"c").unwrap(), Some(Some(Vec::new())));
        // Tombstone.
        assert_eq!(reader.get(b"d").unwrap(), Some(None));
        // Inside the key range but absent.
        assert_eq!(reader.get(b"bb").unwrap(), None);
    }

    #[test]
    fn header_reflects_writer_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hdr.sst");
        TableWriter::write_from_memtable(&path, &OPTS, &make_sample_memtable()).unwrap();

        let reader = TableReader::open(&path, &OPTS).unwrap();
        let header = reader.header();
        assert_eq!(header.magic, *b"LSMD");
        assert_eq!(header.entry_count, 4);
        assert_eq!(header.smallest_key, b"a");
        assert_eq!(header.largest_key, b"d");
        assert_eq!(header.version, 0x01);
    }

    #[test]
    fn keys_outside_range_are_pruned() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prune.sst");

        let mut m = Memtable::new();
        m.put(b"m1".to_vec(), b"v1".to_vec());
        m.put(b"m5".to_vec(), b"v5".to_vec());
        TableWriter::write_from_memtable(&path, &OPTS, &m).unwrap();

        let reader = TableReader::open(&path, &OPTS).unwrap();
        assert_eq!(reader.get(b"a").unwrap(), None); // below smallest
        assert_eq!(reader.get(b"z").unwrap(), None); // above largest
        assert_eq!(reader.get(b"m3").unwrap(), None); // in range, absent
    }

    // -------------------- Validation --------------------

    #[test]
    fn wrong_magic_is_corrupted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("magic.sst");
        TableWriter::write_from_memtable(&path, &OPTS, &make_sample_memtable()).unwrap();

        let other = TableOptions {
            magic: *b"XXXX",
            version: 0x01,
        };
        match TableReader::open(&path, &other) {
            Err(TableError::Corrupted(_)) => {}
            other => panic!("expected Corrupted, got {:?}", other),
        }
    }

    #[test]
    fn wrong_version_is_outdated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("version.sst");
        TableWriter::write_from_memtable(&path, &OPTS, &make_sample_memtable()).unwrap();

        let newer = TableOptions {
            magic: *b"LSMD",
            version: 0x02,
        };
        match TableReader::open(&path, &newer) {
            Err(TableError::OutdatedVersion {
                expected: 0x02,
                found: 0x01,
            }) => {}
            other => panic!("expected OutdatedVersion, got {:?}", other),
        }
    }

    #[test]
    fn truncated_file_fails_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trunc.sst");
        TableWriter::write_from_memtable(&path, &OPTS, &make_sample_memtable()).unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        assert!(TableReader::open(&path, &OPTS).is_err());
    }

    #[test]
    fn missing_file_is_io_not_found() {
        let missing = tempdir().unwrap().path().join("nope.sst");
        match TableReader::open(&missing, &OPTS) {
            Err(TableError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io, got {:?}", other),
        }
    }

    // -------------------- Iteration --------------------

    #[test]
    fn iter_yields_entries_in_key_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("iter.sst");

        let mut m = Memtable::new();
        m.put(b"z".to_vec(), b"1".to_vec());
        m.put(b"a".to_vec(), b"2".to_vec());
        m.put(b"m".to_vec(), b"3".to_vec());
        TableWriter::write_from_memtable(&path, &OPTS, &m).unwrap();

        let reader = TableReader::open(&path, &OPTS).unwrap();
        let keys: Vec<_> = reader
            .iter()
            .unwrap()
            .map(|e| e.unwrap().key)
            .collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"m".to_vec(), b"z".to_vec()]);
    }

    #[test]
    fn multiple_gets_on_one_reader() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("multi.sst");

        let mut m = Memtable::new();
        for i in 0..100u32 {
            m.put(format!("k{:03}", i).into_bytes(), format!("v{}", i).into_bytes());
        }
        TableWriter::write_from_memtable(&path, &OPTS, &m).unwrap();

        let reader = TableReader::open(&path, &OPTS).unwrap();
        // Read everything twice; each get opens its own handle.
        for _ in 0..2 {
            for i in 0..100u32 {
                let key = format!("k{:03}", i).into_bytes();
                let value = reader.get(&key).unwrap().unwrap().unwrap();
                assert_eq!(value, format!("v{}", i).into_bytes());
            }
        }
    }

    #[test]
    fn large_value_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.sst");

        let mut m = Memtable::new();
        m.put(b"big".to_vec(), vec![b'x'; 500_000]);
        TableWriter::write_from_memtable(&path, &OPTS, &m).unwrap();

        let reader = TableReader::open(&path, &OPTS).unwrap();
        let value = reader.get(b"big").unwrap().unwrap().unwrap();
        assert_eq!(value.len(), 500_000);
    }
}
