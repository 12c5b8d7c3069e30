//! Memory-mapped backend with epoch-published remapping.
//!
//! The file is covered by a sequence of equal-sized mapped chunks. A
//! resize publishes a new **epoch**, an immutable `{chunks, mapped_length}`
//! snapshot: only chunks whose extent changed are remapped, unchanged
//! chunks are moved into the new epoch, and chunks falling outside the new
//! length are dropped (unmapped) at the moment the epoch is swapped in.
//!
//! If any remap fails the prior epoch stays current and the error is
//! surfaced; the store engine then retires the instance. Every operation
//! observes exactly one epoch because the exclusive `&mut` borrow rules out
//! interleaving.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::{Access, IoError, StorageFile};

/// Default mapped-chunk length: 128 MiB.
pub const DEFAULT_CHUNK_LENGTH: u64 = 128 * 1024 * 1024;

/// One mapped chunk, read-only or writable to match the file's access mode.
#[derive(Debug)]
enum Chunk {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Chunk {
    fn len(&self) -> usize {
        match self {
            Chunk::ReadOnly(m) => m.len(),
            Chunk::ReadWrite(m) => m.len(),
        }
    }

    fn as_slice(&self) -> &[u8] {
        match self {
            Chunk::ReadOnly(m) => m,
            Chunk::ReadWrite(m) => m,
        }
    }

    fn as_mut_slice(&mut self) -> Result<&mut [u8], IoError> {
        match self {
            Chunk::ReadOnly(_) => Err(IoError::ReadOnlyFile),
            Chunk::ReadWrite(m) => Ok(&mut m[..]),
        }
    }

    fn flush(&self) -> Result<(), IoError> {
        if let Chunk::ReadWrite(m) = self {
            m.flush()?;
        }
        Ok(())
    }
}

/// An immutable mapping snapshot.
#[derive(Debug, Default)]
struct Epoch {
    chunks: Vec<Chunk>,
    mapped_length: u64,
}

/// Chunked memory-mapped backend.
#[derive(Debug)]
pub struct MappedFile {
    /// `None` once closed.
    file: Option<File>,
    access: Access,
    chunk_length: u64,
    epoch: Epoch,
    position: u64,
}

impl MappedFile {
    /// Opens `path` and maps its current extent.
    ///
    /// `chunk_length` is the mapped-chunk size; production callers use
    /// [`DEFAULT_CHUNK_LENGTH`], tests shrink it to exercise chunk
    /// boundaries.
    pub fn open(path: &Path, access: Access, chunk_length: u64) -> Result<Self, IoError> {
        assert!(chunk_length > 0, "chunk length must be positive");

        let mut opts = OpenOptions::new();
        opts.read(true);
        if access == Access::ReadWrite {
            opts.write(true).create(true);
        }
        let file = opts.open(path)?;

        let length = file.metadata()?.len();
        let mut empty = Epoch::default();
        let epoch = Self::build_epoch(&file, access, chunk_length, length, &mut empty)?;

        Ok(Self {
            file: Some(file),
            access,
            chunk_length,
            epoch,
            position: 0,
        })
    }

    fn file(&self) -> Result<&File, IoError> {
        self.file.as_ref().ok_or(IoError::Closed)
    }

    /// Maps one chunk of `length` bytes at `offset`.
    fn map_chunk(
        file: &File,
        access: Access,
        offset: u64,
        length: usize,
    ) -> Result<Chunk, IoError> {
        let mut opts = MmapOptions::new();
        opts.offset(offset).len(length);

        // SAFETY: the range [offset, offset + length) lies within the file
        // extent established by the caller (open reads the metadata length,
        // set_length calls set_len first). The file handle outlives every
        // chunk: close drops the epoch before the handle, and remaps drop
        // out-of-range chunks before the next truncation can be issued.
        let chunk = match access {
            Access::ReadOnly => Chunk::ReadOnly(unsafe { opts.map(file)? }),
            Access::ReadWrite => Chunk::ReadWrite(unsafe { opts.map_mut(file)? }),
        };
        Ok(chunk)
    }

    /// Computes the epoch for `new_length`, reusing chunks from `old`.
    ///
    /// Fresh mappings are created before anything is taken from the old
    /// epoch, so a mapping failure leaves `old` intact as the current
    /// epoch. On success the reusable chunks are moved across and the
    /// leftovers drop here, which unmaps them.
    fn build_epoch(
        file: &File,
        access: Access,
        chunk_length: u64,
        new_length: u64,
        old: &mut Epoch,
    ) -> Result<Epoch, IoError> {
        let count = usize::try_from(new_length.div_ceil(chunk_length)).expect("chunk count");

        let mut fresh: Vec<Option<Chunk>> = Vec::with_capacity(count);
        for i in 0..count {
            let offset = i as u64 * chunk_length;
            let required = usize::try_from(chunk_length.min(new_length - offset))
                .expect("chunk length fits usize");
            let reusable = old.chunks.get(i).is_some_and(|c| c.len() == required);
            if reusable {
                fresh.push(None);
            } else {
                fresh.push(Some(Self::map_chunk(file, access, offset, required)?));
            }
        }

        // Commit point: no fallible work below
        let mut reusable: Vec<Option<Chunk>> =
            std::mem::take(&mut old.chunks).into_iter().map(Some).collect();

        let mut chunks = Vec::with_capacity(count);
        for (i, slot) in fresh.into_iter().enumerate() {
            match slot {
                Some(chunk) => chunks.push(chunk),
                None => {
                    let kept = reusable[i].take();
                    chunks.push(kept.expect("chunk marked reusable is present"));
                }
            }
        }

        tracing::trace!(new_length, chunks = count, "published mapping epoch");
        Ok(Epoch {
            chunks,
            mapped_length: new_length,
        })
    }

    fn chunk_span(&self, position: u64) -> (usize, usize) {
        let index = usize::try_from(position / self.chunk_length).expect("chunk index");
        let within = usize::try_from(position % self.chunk_length).expect("chunk offset");
        (index, within)
    }
}

impl StorageFile for MappedFile {
    fn seek(&mut self, position: u64) {
        self.position = position;
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), IoError> {
        self.file()?;
        let end = self.position + buf.len() as u64;
        if end > self.epoch.mapped_length {
            return Err(IoError::UnexpectedEof {
                offset: self.position,
                needed: buf.len(),
                length: self.epoch.mapped_length,
            });
        }

        let mut copied = 0;
        while copied < buf.len() {
            let (index, within) = self.chunk_span(self.position + copied as u64);
            let chunk = self.epoch.chunks[index].as_slice();
            let n = (buf.len() - copied).min(chunk.len() - within);
            buf[copied..copied + n].copy_from_slice(&chunk[within..within + n]);
            copied += n;
        }

        self.position = end;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), IoError> {
        self.file()?;
        let end = self.position + buf.len() as u64;
        if end > self.epoch.mapped_length {
            // The engine resizes before writing; landing here is a caller bug
            return Err(IoError::OutOfMappedRange {
                offset: self.position,
                len: buf.len(),
                mapped: self.epoch.mapped_length,
            });
        }

        let mut copied = 0;
        while copied < buf.len() {
            let (index, within) = self.chunk_span(self.position + copied as u64);
            let chunk = self.epoch.chunks[index].as_mut_slice()?;
            let n = (buf.len() - copied).min(chunk.len() - within);
            chunk[within..within + n].copy_from_slice(&buf[copied..copied + n]);
            copied += n;
        }

        self.position = end;
        Ok(())
    }

    fn length(&self) -> Result<u64, IoError> {
        self.file()?;
        Ok(self.epoch.mapped_length)
    }

    fn set_length(&mut self, length: u64) -> Result<(), IoError> {
        if self.access.is_read_only() {
            return Err(IoError::ReadOnlyFile);
        }
        let file = self.file.as_ref().ok_or(IoError::Closed)?;

        // Flush dirty chunks before any of them can be unmapped
        for chunk in &self.epoch.chunks {
            chunk.flush()?;
        }

        file.set_len(length)?;
        let epoch = Self::build_epoch(file, self.access, self.chunk_length, length, &mut self.epoch)?;
        self.epoch = epoch;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), IoError> {
        for chunk in &self.epoch.chunks {
            chunk.flush()?;
        }
        self.file()?.sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), IoError> {
        // Unmap all chunks deterministically, then drop the handle
        self.epoch = Epoch::default();
        self.file = None;
        Ok(())
    }
}
