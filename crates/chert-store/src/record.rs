//! Record header codec.
//!
//! Each index slot ends with a fixed 24-byte record header describing one
//! payload block in the data region:
//!
//! ```text
//! [data_pointer:u64][data_capacity:u32][data_count:u32][header_crc:u64]
//!        8B               4B                4B               8B
//! ```
//!
//! `header_crc` holds the CRC32 of the first 16 bytes in its low 32 bits.
//! `data_count` is the value length in bytes; the all-ones sentinel means
//! the record has been allocated but never written. All integers are
//! little-endian.
//!
//! The payload block at `data_pointer` is serialised as a `u32` length
//! prefix, the value bytes, and (when payload CRC is enabled) a trailing
//! CRC32 of the value.

use chert_io::StorageFile;

use crate::StoreError;

/// Length of the serialised record header in bytes.
pub const RECORD_HEADER_LENGTH: u64 = 24;

/// Bytes covered by the header CRC.
const CRC_COVERED: usize = 16;

/// On-disk sentinel for "allocated, never written".
const COUNT_UNSET: u32 = u32::MAX;

/// Payload length prefix size.
const LENGTH_PREFIX: u32 = 4;

/// Trailing payload CRC size.
const PAYLOAD_CRC: u32 = 4;

/// One record's header: where its payload block lives and how much of the
/// block is in use.
///
/// `slot` is the record's position in the index region. It is in-memory
/// bookkeeping only and is not serialised; the slot a header is read from
/// or written to determines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Absolute file offset of the payload block.
    pub data_pointer: u64,
    /// Allocated bytes at `data_pointer`.
    pub data_capacity: u32,
    /// Value length, `None` before the first payload write.
    data_count: Option<u32>,
    /// Index slot holding this header.
    pub slot: u32,
}

impl RecordHeader {
    /// Creates a header for a freshly allocated, unwritten block.
    pub fn new(data_pointer: u64, data_capacity: u32) -> Self {
        Self {
            data_pointer,
            data_capacity,
            data_count: None,
            slot: 0,
        }
    }

    /// Returns the value length, or `None` if the block was never written.
    pub fn data_count(&self) -> Option<u32> {
        self.data_count
    }

    /// Records the value length after a payload write.
    pub fn set_data_count(&mut self, count: u32) {
        self.data_count = Some(count);
    }

    /// Serialised length of a payload holding `count` value bytes.
    pub fn serialized_length(count: u32, payload_crc: bool) -> u32 {
        LENGTH_PREFIX + count + if payload_crc { PAYLOAD_CRC } else { 0 }
    }

    /// Bytes of the block occupied by the current payload, zero if unwritten.
    pub fn used_length(&self, payload_crc: bool) -> u32 {
        self.data_count
            .map_or(0, |c| Self::serialized_length(c, payload_crc))
    }

    /// Unused bytes at the tail of the block.
    pub fn free_space(&self, payload_crc: bool) -> u32 {
        self.data_capacity
            .saturating_sub(self.used_length(payload_crc))
    }

    /// One past the last byte of the block.
    pub fn end(&self) -> u64 {
        self.data_pointer + u64::from(self.data_capacity)
    }

    /// Whether `offset` falls inside the block's span.
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.data_pointer && offset < self.end()
    }

    /// Carves the free tail of this block into a new unwritten header.
    ///
    /// The new block starts right after this record's payload and owns all
    /// of its free space; this record shrinks to exactly its used length.
    /// The caller must persist the shrunk donor header and refresh its
    /// free-space map membership.
    pub fn split(&mut self, payload_crc: bool) -> RecordHeader {
        let used = self.used_length(payload_crc);
        let free = self.data_capacity - used;
        debug_assert!(free > 0, "split of a record with no free space");

        self.data_capacity = used;
        RecordHeader::new(self.data_pointer + u64::from(used), free)
    }

    /// Serialises the header, computing the CRC over the first 16 bytes.
    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_LENGTH as usize] {
        let count = self
            .data_count
            .expect("record header serialised before first payload write");
        debug_assert_ne!(count, COUNT_UNSET);

        let mut buf = [0u8; RECORD_HEADER_LENGTH as usize];
        buf[0..8].copy_from_slice(&self.data_pointer.to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_capacity.to_le_bytes());
        buf[12..16].copy_from_slice(&count.to_le_bytes());
        let crc = u64::from(crc32fast::hash(&buf[..CRC_COVERED]));
        buf[16..24].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes a header read from `offset`, verifying its self-CRC.
    pub fn from_bytes(
        buf: &[u8; RECORD_HEADER_LENGTH as usize],
        offset: u64,
    ) -> Result<Self, StoreError> {
        let stored = u64::from_le_bytes(buf[16..24].try_into().expect("8-byte slice"));
        let computed = crc32fast::hash(&buf[..CRC_COVERED]);
        if stored != u64::from(computed) {
            return Err(StoreError::HeaderCorrupt {
                offset,
                stored,
                computed,
            });
        }

        let raw_count = u32::from_le_bytes(buf[12..16].try_into().expect("4-byte slice"));
        Ok(Self {
            data_pointer: u64::from_le_bytes(buf[0..8].try_into().expect("8-byte slice")),
            data_capacity: u32::from_le_bytes(buf[8..12].try_into().expect("4-byte slice")),
            data_count: (raw_count != COUNT_UNSET).then_some(raw_count),
            slot: 0,
        })
    }

    /// Reads and verifies a header at `offset`.
    pub fn read(file: &mut impl StorageFile, offset: u64) -> Result<Self, StoreError> {
        let mut buf = [0u8; RECORD_HEADER_LENGTH as usize];
        file.seek(offset);
        file.read_fully(&mut buf)?;
        Self::from_bytes(&buf, offset)
    }

    /// Writes the header at `offset` in a single call.
    pub fn write(&self, file: &mut impl StorageFile, offset: u64) -> Result<(), StoreError> {
        file.seek(offset);
        file.write_all(&self.to_bytes())?;
        Ok(())
    }
}
