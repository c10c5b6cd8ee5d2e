//! # Codec
//!
//! Shared binary encoding for the Silt storage engine. Both the write-ahead
//! log and the SSTable files store the same record layout, so the encoder and
//! decoder live in one place.
//!
//! ## Record layout
//!
//! ```text
//! SET record:    op (u8 = 0x01) | key_len (u32) | key | val_len (u32) | val
//! DELETE record: op (u8 = 0x02) | key_len (u32) | key
//! ```
//!
//! ## SSTable header layout
//!
//! ```text
//! magic (4 bytes) | entry_count (u32) | smallest_len (u32) | smallest_key
//! | largest_len (u32) | largest_key | version (u8)
//! ```
//!
//! All integers are **big-endian**. There are no checksums and no varints;
//! a truncated file surfaces as an `UnexpectedEof` I/O error from whichever
//! field the reader was in the middle of.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Errors produced while encoding or decoding records.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid op tag {0:#04x}")]
    InvalidOp(u8),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The two record kinds the engine knows about.
///
/// A `Delete` is a tombstone: it records the act of deletion so that older
/// copies of the key in other files stay shadowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpKind {
    Set = 1,
    Delete = 2,
}

impl OpKind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(OpKind::Set),
            2 => Some(OpKind::Delete),
            _ => None,
        }
    }
}

/// One logical operation: the unit of durability in the WAL and the unit of
/// serialization in SSTables.
///
/// `value` is `Some` exactly when `op == OpKind::Set`; tombstones carry no
/// value bytes on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub op: OpKind,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

impl Entry {
    pub fn set(key: Vec<u8>, value: Vec<u8>) -> Self {
        Entry {
            op: OpKind::Set,
            key,
            value: Some(value),
        }
    }

    pub fn delete(key: Vec<u8>) -> Self {
        Entry {
            op: OpKind::Delete,
            key,
            value: None,
        }
    }

    /// Serializes this entry into `w` using the record layout above.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_entry(w, self.op, &self.key, self.value.as_deref())
    }
}

/// Writes one record from borrowed parts. For a `Delete`, `value` is ignored.
pub fn write_entry<W: Write>(
    w: &mut W,
    op: OpKind,
    key: &[u8],
    value: Option<&[u8]>,
) -> Result<()> {
    w.write_u8(op as u8)?;
    w.write_u32::<BigEndian>(key.len() as u32)?;
    w.write_all(key)?;

    if op == OpKind::Set {
        let value = value.unwrap_or(&[]);
        w.write_u32::<BigEndian>(value.len() as u32)?;
        w.write_all(value)?;
    }

    Ok(())
}

/// Decodes the next record from `r`.
///
/// Returns `Ok(None)` on a clean end of stream, that is when the reader is
/// exhausted before the op tag. End of stream anywhere inside a record is a
/// short read and surfaces as `Error::Io`.
pub fn read_entry<R: Read>(r: &mut R) -> Result<Option<Entry>> {
    let tag = match r.read_u8() {
        Ok(tag) => tag,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };

    let op = OpKind::from_u8(tag).ok_or(Error::InvalidOp(tag))?;
    let key = read_len_prefixed(r)?;

    let value = match op {
        OpKind::Set => Some(read_len_prefixed(r)?),
        OpKind::Delete => None,
    };

    Ok(Some(Entry { op, key, value }))
}

fn read_len_prefixed<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = r.read_u32::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// The fixed header at the start of every SSTable file.
///
/// `smallest_key` and `largest_key` are a writer-side convention (the first
/// and last key of the flushed buffer); the reader stores whatever the writer
/// wrote and does not re-verify the ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeader {
    pub magic: [u8; 4],
    pub entry_count: u32,
    pub smallest_key: Vec<u8>,
    pub largest_key: Vec<u8>,
    pub version: u8,
}

impl TableHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.magic)?;
        w.write_u32::<BigEndian>(self.entry_count)?;
        w.write_u32::<BigEndian>(self.smallest_key.len() as u32)?;
        w.write_all(&self.smallest_key)?;
        w.write_u32::<BigEndian>(self.largest_key.len() as u32)?;
        w.write_all(&self.largest_key)?;
        w.write_u8(self.version)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        let entry_count = r.read_u32::<BigEndian>()?;
        let smallest_key = read_len_prefixed(r)?;
        let largest_key = read_len_prefixed(r)?;
        let version = r.read_u8()?;

        Ok(TableHeader {
            magic,
            entry_count,
            smallest_key,
            largest_key,
            version,
        })
    }
}
