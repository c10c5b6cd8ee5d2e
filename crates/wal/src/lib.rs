//! Write-ahead log for the Silt storage engine.
//!
//! Every mutation is appended here before it touches the memtable, so a crash
//! between the append and the next flush is recoverable by replaying the file.
//! The log holds bare [`codec`] records back to back; there is no file header
//! and no framing beyond the records themselves. At flush time the engine
//! truncates the log with [`Wal::clear`], since everything it held is then
//! durable in an SSTable.

use codec::Entry;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] codec::Error),
}

/// A single long-lived append handle over the log file.
///
/// With `sync` enabled every append is fsynced before it is acknowledged;
/// with it disabled durability is bounded by the OS page cache.
pub struct Wal {
    file: File,
    path: PathBuf,
    sync: bool,
}

impl Wal {
    /// Opens the log at `path`, creating it if missing. Existing contents are
    /// preserved; appends go to the end of the file.
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        Ok(Self { file, path, sync })
    }

    /// Appends one record to the end of the log.
    ///
    /// The record is serialized into a buffer first so it reaches the file in
    /// a single write call.
    pub fn append(&mut self, entry: &Entry) -> Result<(), WalError> {
        let mut buf = Vec::new();
        entry.write_to(&mut buf)?;

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&buf)?;

        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Truncates the log by replacing the current handle with a fresh one
    /// opened in truncate mode. Postcondition: the file is empty and writable.
    pub fn clear(&mut self) -> Result<(), WalError> {
        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(())
    }

    /// Replays every record in the log, oldest first, through `apply`.
    ///
    /// Uses an independent read handle so the append position is untouched.
    /// Stops cleanly at end of stream; a record cut off mid-way surfaces as
    /// an error.
    pub fn replay<F>(&self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(Entry),
    {
        let mut reader = BufReader::new(File::open(&self.path)?);
        while let Some(entry) = codec::read_entry(&mut reader)? {
            apply(entry);
        }
        Ok(())
    }

    /// Returns the current size of the log file in bytes.
    pub fn len(&self) -> Result<u64, WalError> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, WalError> {
        Ok(self.len()? == 0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
