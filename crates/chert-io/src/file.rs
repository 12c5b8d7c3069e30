//! The [`StorageFile`] capability set and the concrete backend selector.

use std::path::Path;

use crate::{DirectFile, IoError, MappedFile, mapped::DEFAULT_CHUNK_LENGTH};

/// Access mode for an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read and write; the file is created if it does not exist.
    ReadWrite,
    /// Read only; the file must already exist.
    ReadOnly,
}

impl Access {
    /// Returns true for [`Access::ReadOnly`].
    pub fn is_read_only(self) -> bool {
        matches!(self, Access::ReadOnly)
    }
}

/// Uniform capability set over a single random-access file.
///
/// The trait models a file with one logical cursor. `seek` moves the cursor;
/// reads and writes start at the cursor and advance it. All multi-byte
/// accessors are little-endian.
///
/// Implementations guarantee single-threaded cooperative safety only:
/// every method takes `&mut self` and callers serialise externally.
pub trait StorageFile {
    /// Moves the logical cursor to an absolute offset.
    ///
    /// Seeking past the end of the file is permitted; a subsequent write
    /// through a [`DirectFile`] extends the file.
    fn seek(&mut self, position: u64);

    /// Returns the current cursor position.
    fn position(&self) -> u64;

    /// Reads exactly `buf.len()` bytes at the cursor.
    fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), IoError>;

    /// Writes all of `buf` at the cursor in a single call.
    fn write_all(&mut self, buf: &[u8]) -> Result<(), IoError>;

    /// Returns the file length in bytes.
    fn length(&self) -> Result<u64, IoError>;

    /// Grows or truncates the file to `length` bytes.
    fn set_length(&mut self, length: u64) -> Result<(), IoError>;

    /// Flushes file data and metadata to stable storage.
    fn sync(&mut self) -> Result<(), IoError>;

    /// Releases the underlying OS resources. Idempotent.
    fn close(&mut self) -> Result<(), IoError>;

    /// Reads one byte at the cursor.
    fn read_u8(&mut self) -> Result<u8, IoError> {
        let mut buf = [0u8; 1];
        self.read_fully(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a little-endian `u32` at the cursor.
    fn read_u32(&mut self) -> Result<u32, IoError> {
        let mut buf = [0u8; 4];
        self.read_fully(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a little-endian `u64` at the cursor.
    fn read_u64(&mut self) -> Result<u64, IoError> {
        let mut buf = [0u8; 8];
        self.read_fully(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Writes one byte at the cursor.
    fn write_u8(&mut self, value: u8) -> Result<(), IoError> {
        self.write_all(&[value])
    }

    /// Writes a little-endian `u32` at the cursor.
    fn write_u32(&mut self, value: u32) -> Result<(), IoError> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `u64` at the cursor.
    fn write_u64(&mut self, value: u64) -> Result<(), IoError> {
        self.write_all(&value.to_le_bytes())
    }
}

/// The two concrete backends, selected once at open time.
///
/// The store engine holds one variant per instance and dispatches
/// statically; there is no trait-object indirection on the I/O path.
#[derive(Debug)]
pub enum FileBackend {
    /// Positioned `std::fs::File` I/O.
    Direct(DirectFile),
    /// Chunked memory-mapped I/O.
    Mapped(MappedFile),
}

impl FileBackend {
    /// Opens `path` with the requested access, memory-mapped or direct.
    pub fn open(path: &Path, access: Access, memory_mapped: bool) -> Result<Self, IoError> {
        if memory_mapped {
            Ok(Self::Mapped(MappedFile::open(
                path,
                access,
                DEFAULT_CHUNK_LENGTH,
            )?))
        } else {
            Ok(Self::Direct(DirectFile::open(path, access)?))
        }
    }
}

macro_rules! delegate {
    ($self:ident, $file:ident => $body:expr) => {
        match $self {
            FileBackend::Direct($file) => $body,
            FileBackend::Mapped($file) => $body,
        }
    };
}

impl StorageFile for FileBackend {
    fn seek(&mut self, position: u64) {
        delegate!(self, f => f.seek(position));
    }

    fn position(&self) -> u64 {
        delegate!(self, f => f.position())
    }

    fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), IoError> {
        delegate!(self, f => f.read_fully(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), IoError> {
        delegate!(self, f => f.write_all(buf))
    }

    fn length(&self) -> Result<u64, IoError> {
        delegate!(self, f => f.length())
    }

    fn set_length(&mut self, length: u64) -> Result<(), IoError> {
        delegate!(self, f => f.set_length(length))
    }

    fn sync(&mut self) -> Result<(), IoError> {
        delegate!(self, f => f.sync())
    }

    fn close(&mut self) -> Result<(), IoError> {
        delegate!(self, f => f.close())
    }
}
