//! # Engine
//!
//! The Silt storage engine: a persistent embedded key-value store organized
//! as a log-structured merge tree.
//!
//! Writes land in the write-ahead log first, then in an in-memory sorted
//! buffer (the [`memtable::Memtable`]). When the buffer exceeds its size
//! threshold it is sealed into an immutable, sorted on-disk table
//! (`f<N>.sst`); a four-byte metadata file tracks how many generations
//! exist. Reads consult the buffer first and then the tables, newest
//! generation to oldest, so the latest write always wins. Tombstones mask
//! older values until a full compaction drops them.
//!
//! ## Example
//! ```no_run
//! use engine::{Config, Engine};
//!
//! let engine = Engine::open(Config::in_dir("data".as_ref()))?;
//! engine.set(b"hello", b"world")?;
//! assert_eq!(engine.get(b"hello")?, b"world");
//! let prior = engine.del(b"hello")?;
//! assert_eq!(prior, b"world");
//! # Ok::<(), engine::Error>(())
//! ```

mod compaction;
mod metadata;

use codec::Entry;
use memtable::Memtable;
use metadata::Metadata;
use sstable::{TableError, TableOptions, TableReader, TableWriter};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error as ThisError;
use tracing::{debug, info};
use wal::{Wal, WalError};

/// Engine errors. `NotFound` is a normal outcome of `get` and `del`, not a
/// failure of the engine itself.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("key not found")]
    NotFound,
    #[error("corrupted file: {0}")]
    Corrupted(String),
    #[error("table version {found} is not compatible with engine version {expected}")]
    OutdatedVersion { expected: u8, found: u8 },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<codec::Error> for Error {
    fn from(err: codec::Error) -> Self {
        match err {
            codec::Error::Io(e) => Error::Io(e),
            codec::Error::InvalidOp(tag) => {
                Error::Corrupted(format!("invalid op tag {tag:#04x}"))
            }
        }
    }
}

impl From<WalError> for Error {
    fn from(err: WalError) -> Self {
        match err {
            WalError::Io(e) => Error::Io(e),
            WalError::Codec(e) => e.into(),
        }
    }
}

impl From<TableError> for Error {
    fn from(err: TableError) -> Self {
        match err {
            TableError::Io(e) => Error::Io(e),
            TableError::Codec(e) => e.into(),
            TableError::Corrupted(msg) => Error::Corrupted(msg),
            TableError::OutdatedVersion { expected, found } => {
                Error::OutdatedVersion { expected, found }
            }
            TableError::Empty => Error::Corrupted("attempted to write an empty table".to_string()),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Four bytes stamped into every table header; tables carrying anything
    /// else are rejected as corrupted.
    pub magic: [u8; 4],
    /// Format version byte stamped into every table header.
    pub version: u8,
    /// Path of the four-byte generation counter file.
    pub metadata_path: PathBuf,
    /// Directory in which `f<N>.sst` files are created and read.
    pub sst_dir: PathBuf,
    /// Path of the write-ahead log.
    pub wal_path: PathBuf,
    /// Flush the memtable once its byte size reaches this threshold.
    pub mem_size_threshold: usize,
    /// Compact all generations into one once their count reaches this
    /// threshold.
    pub file_num_threshold: u32,
    /// fsync the write-ahead log on every append. Turning this off trades
    /// durability of the most recent writes for throughput.
    pub sync_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            magic: *b"LSMD",
            version: 0x01,
            metadata_path: PathBuf::from("metadata.meta"),
            sst_dir: PathBuf::from("sst"),
            wal_path: PathBuf::from("wal.log"),
            mem_size_threshold: 100,
            file_num_threshold: 20,
            sync_writes: true,
        }
    }
}

impl Config {
    /// Places all of the store's files under one directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            metadata_path: dir.join("metadata.meta"),
            sst_dir: dir.join("sst"),
            wal_path: dir.join("wal.log"),
            ..Self::default()
        }
    }
}

/// The storage engine. All public operations are serialized through one
/// internal mutex, so an `Engine` can be shared across threads as-is.
pub struct Engine {
    inner: Mutex<Inner>,
}

pub(crate) struct Inner {
    config: Config,
    memtable: Memtable,
    wal: Wal,
    metadata: Metadata,
    /// Open readers keyed by generation. A table is immutable once written,
    /// so a cached reader (and its key index) never goes stale; the cache is
    /// dropped wholesale when compaction replaces the generation set.
    readers: HashMap<u32, TableReader>,
    /// Number of table generations on disk, mirroring the metadata file.
    sst_count: u32,
}

impl Engine {
    /// Opens the store, creating its files on first use and replaying the
    /// write-ahead log into the memtable.
    pub fn open(config: Config) -> Result<Engine> {
        fs::create_dir_all(&config.sst_dir)?;

        let metadata = Metadata::new(config.metadata_path.clone());
        metadata.create_if_missing()?;
        let sst_count = metadata.load()?;

        let wal = Wal::open(&config.wal_path, config.sync_writes)?;
        let mut memtable = Memtable::new();
        let mut replayed = 0usize;
        wal.replay(|entry| {
            memtable.apply(entry);
            replayed += 1;
        })?;

        info!(generations = sst_count, replayed, "store opened");

        Ok(Engine {
            inner: Mutex::new(Inner {
                config,
                memtable,
                wal,
                metadata,
                readers: HashMap::new(),
                sst_count,
            }),
        })
    }

    /// Returns the value stored under `key`, or [`Error::NotFound`].
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.lock()?.lookup(key)
    }

    /// Stores `value` under `key`. May trigger a flush of the memtable.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut inner = self.lock()?;

        // Log first: a crash after the append is recoverable by replay.
        inner
            .wal
            .append(&Entry::set(key.to_vec(), value.to_vec()))?;
        inner.memtable.put(key.to_vec(), value.to_vec());

        if inner.memtable.size_in_bytes() >= inner.config.mem_size_threshold {
            inner.flush()?;
        }
        Ok(())
    }

    /// Deletes `key`, returning the value it held.
    ///
    /// Deleting an absent key is [`Error::NotFound`] and writes nothing, so
    /// tombstones only ever shadow keys that actually exist.
    pub fn del(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut inner = self.lock()?;

        let prior = inner.lookup(key)?;

        inner.wal.append(&Entry::delete(key.to_vec()))?;
        inner.memtable.delete(key.to_vec());

        // A tombstone is small; no size-triggered flush here.
        Ok(prior)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| {
                Error::Io(io::Error::new(io::ErrorKind::Other, "engine mutex poisoned"))
            })
    }
}

impl Inner {
    fn lookup(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        match self.memtable.get(key) {
            Some(Some(value)) => return Ok(value.to_vec()),
            // A tombstone in the memtable masks every older table.
            Some(None) => return Err(Error::NotFound),
            None => {}
        }
        self.search_sstables(key)
    }

    /// Probes the on-disk tables newest generation first, stopping at the
    /// first table that knows the key (either as a value or a tombstone).
    fn search_sstables(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        // Refresh from disk so the probe always matches the persisted set.
        self.sst_count = self.metadata.load()?;

        for gen in (1..=self.sst_count).rev() {
            if !self.readers.contains_key(&gen) {
                match TableReader::open(self.sst_path(gen), &self.table_options()) {
                    Ok(reader) => {
                        self.readers.insert(gen, reader);
                    }
                    // Generations can vanish while the counter still reaches
                    // past them (compaction renumbering); skip the gap.
                    Err(TableError::Io(e)) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            let reader = match self.readers.get(&gen) {
                Some(reader) => reader,
                None => continue,
            };

            match reader.get(key)? {
                Some(Some(value)) => return Ok(value),
                Some(None) => return Err(Error::NotFound),
                None => continue,
            }
        }

        Err(Error::NotFound)
    }

    /// Seals the memtable into the next table generation.
    ///
    /// Ordering is load-bearing: the table must be durable before the counter
    /// references it, and the counter must be persisted before the log is
    /// truncated. A crash between the last two steps leaves a log that
    /// replays entries already present in the newest table, which is harmless
    /// because replay overwrites by key.
    pub(crate) fn flush(&mut self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        let next = self.sst_count + 1;
        let path = self.sst_path(next);
        TableWriter::write_from_memtable(&path, &self.table_options(), &self.memtable)?;

        self.metadata.store(next)?;
        self.sst_count = next;

        self.wal.clear()?;
        debug!(
            generation = next,
            entries = self.memtable.len(),
            "memtable flushed"
        );
        self.memtable.clear();

        if self.sst_count >= self.config.file_num_threshold && self.sst_count >= 2 {
            self.compact()?;
        }
        Ok(())
    }

    pub(crate) fn sst_path(&self, gen: u32) -> PathBuf {
        self.config.sst_dir.join(format!("f{gen}.sst"))
    }

    pub(crate) fn table_options(&self) -> TableOptions {
        TableOptions {
            magic: self.config.magic,
            version: self.config.version,
        }
    }
}
