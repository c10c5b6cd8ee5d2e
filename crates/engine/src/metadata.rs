use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use crate::{Error, Result};

/// The metadata file: exactly four bytes holding the current generation count
/// as a big-endian u32.
///
/// It is rewritten after every flush and every compaction, always after the
/// table files it describes are durable on disk. A crash in between leaves an
/// orphan table that the surviving counter simply does not reference.
pub(crate) struct Metadata {
    path: PathBuf,
}

impl Metadata {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Creates the file holding a zero counter if it does not exist yet.
    pub(crate) fn create_if_missing(&self) -> Result<()> {
        if !self.path.exists() {
            self.store(0)?;
        }
        Ok(())
    }

    /// Reads the generation count from disk. Any length other than four bytes
    /// means the file was damaged.
    pub(crate) fn load(&self) -> Result<u32> {
        let content = fs::read(&self.path)?;
        if content.len() != 4 {
            return Err(Error::Corrupted(format!(
                "metadata file is {} bytes, expected 4",
                content.len()
            )));
        }
        Ok(BigEndian::read_u32(&content))
    }

    /// Rewrites the file with `count` and fsyncs it.
    pub(crate) fn store(&self, count: u32) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_u32::<BigEndian>(count)?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let meta = Metadata::new(dir.path().join("metadata.meta"));

        meta.store(7).unwrap();
        assert_eq!(meta.load().unwrap(), 7);

        meta.store(8).unwrap();
        assert_eq!(meta.load().unwrap(), 8);
    }

    #[test]
    fn file_is_exactly_four_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.meta");
        let meta = Metadata::new(path.clone());

        meta.store(0x01020304).unwrap();
        let content = fs::read(&path).unwrap();
        assert_eq!(content, vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn create_if_missing_initializes_zero() {
        let dir = tempdir().unwrap();
        let meta = Metadata::new(dir.path().join("metadata.meta"));

        meta.create_if_missing().unwrap();
        assert_eq!(meta.load().unwrap(), 0);

        // A second call must not clobber an existing counter.
        meta.store(3).unwrap();
        meta.create_if_missing().unwrap();
        assert_eq!(meta.load().unwrap(), 3);
    }

    #[test]
    fn wrong_length_is_corrupted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.meta");
        fs::write(&path, [0u8; 3]).unwrap();

        let meta = Metadata::new(path);
        match meta.load() {
            Err(Error::Corrupted(_)) => {}
            other => panic!("expected Corrupted, got {:?}", other),
        }
    }
}
