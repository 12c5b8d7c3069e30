//! File header codec.
//!
//! The fixed 18-byte prefix of every store file:
//!
//! ```text
//! ┌─────────┬──────┬───────────────────────────────┐
//! │ Offset  │ Size │ Description                   │
//! ├─────────┼──────┼───────────────────────────────┤
//! │ 0       │ 4    │ Magic bytes: "CHT1"           │
//! │ 4       │ 2    │ max_key_length (u16 LE)       │
//! │ 6       │ 4    │ num_records (u32 LE)          │
//! │ 10      │ 8    │ data_start_ptr (u64 LE)       │
//! └─────────┴──────┴───────────────────────────────┘
//! ```
//!
//! The magic value doubles as the format version: any change to header
//! sizes, the alignment rule, or the CRC polynomial bumps it.

use std::path::Path;

use chert_io::{Access, DirectFile, StorageFile};

use crate::StoreError;

/// Magic bytes identifying a chert file, format version 1.
pub const MAGIC: [u8; 4] = *b"CHT1";

/// Length of the file header region in bytes.
pub const FILE_HEADER_LENGTH: u64 = 18;

/// Hard cap on `max_key_length` so slot arithmetic fits 16 bits.
pub const MAX_KEY_LENGTH_CAP: u16 = 32_763;

/// Byte offset of the `num_records` field.
pub(crate) const NUM_RECORDS_OFFSET: u64 = 6;

/// Byte offset of the `data_start_ptr` field.
pub(crate) const DATA_START_OFFSET: u64 = 10;

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Effective (rounded) maximum key length recorded at creation.
    pub max_key_length: u16,
    /// Number of live records, equal to the occupied index slots.
    pub num_records: u32,
    /// Absolute offset where the data region starts.
    pub data_start_ptr: u64,
}

impl FileHeader {
    /// Reads and validates the header at the start of `file`.
    pub fn read(file: &mut impl StorageFile) -> Result<Self, StoreError> {
        let length = file.length()?;
        if length < FILE_HEADER_LENGTH {
            return Err(StoreError::FileTooShort {
                expected: FILE_HEADER_LENGTH,
                actual: length,
            });
        }

        file.seek(0);
        let mut magic = [0u8; 4];
        file.read_fully(&mut magic)?;
        if magic != MAGIC {
            return Err(StoreError::MagicMismatch {
                found: magic,
                expected: MAGIC,
            });
        }

        let mut key_len = [0u8; 2];
        file.read_fully(&mut key_len)?;
        let max_key_length = u16::from_le_bytes(key_len);
        let num_records = file.read_u32()?;
        let data_start_ptr = file.read_u64()?;

        Ok(Self {
            max_key_length,
            num_records,
            data_start_ptr,
        })
    }

    /// Writes the full header at the start of `file` in one call.
    pub fn write(&self, file: &mut impl StorageFile) -> Result<(), StoreError> {
        let mut buf = [0u8; FILE_HEADER_LENGTH as usize];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&self.max_key_length.to_le_bytes());
        buf[6..10].copy_from_slice(&self.num_records.to_le_bytes());
        buf[10..18].copy_from_slice(&self.data_start_ptr.to_le_bytes());

        file.seek(0);
        file.write_all(&buf)?;
        Ok(())
    }
}

/// Rounds a requested key length up so `max_key_length + 5` is a multiple
/// of 8, keeping index slots 8-byte aligned.
pub(crate) fn round_up_key_length(requested: u16) -> Result<u16, StoreError> {
    if requested == 0 || requested > MAX_KEY_LENGTH_CAP {
        return Err(StoreError::UnsupportedKeyLength {
            requested,
            max: MAX_KEY_LENGTH_CAP,
        });
    }
    let rounded = (u32::from(requested) + 5).div_ceil(8) * 8 - 5;
    debug_assert!(rounded <= u32::from(MAX_KEY_LENGTH_CAP));
    Ok(rounded as u16)
}

/// Reads the file header of a store file without opening a full store.
///
/// Used by tooling to discover the recorded `max_key_length` before
/// opening. The file handle is released before returning.
pub fn read_file_header(path: &Path) -> Result<FileHeader, StoreError> {
    let mut file = DirectFile::open(path, Access::ReadOnly)?;
    let result = FileHeader::read(&mut file);
    let _ = file.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, 3; "one rounds to three")]
    #[test_case(3, 3; "three is aligned")]
    #[test_case(4, 11; "four rounds up")]
    #[test_case(64, 67; "default rounds to sixty seven")]
    #[test_case(32_763, 32_763; "cap is aligned")]
    fn key_length_rounding(requested: u16, expected: u16) {
        assert_eq!(round_up_key_length(requested).unwrap(), expected);
        // Rounded slots are 8-byte aligned
        assert_eq!((u32::from(expected) + 5) % 8, 0);
    }

    #[test]
    fn key_length_out_of_range() {
        assert!(matches!(
            round_up_key_length(0),
            Err(StoreError::UnsupportedKeyLength { .. })
        ));
        assert!(matches!(
            round_up_key_length(32_764),
            Err(StoreError::UnsupportedKeyLength { .. })
        ));
    }

    #[test]
    fn header_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("header.db");
        let mut file = DirectFile::open(&path, Access::ReadWrite).unwrap();

        let header = FileHeader {
            max_key_length: 67,
            num_records: 42,
            data_start_ptr: 0xDEAD,
        };
        header.write(&mut file).unwrap();

        assert_eq!(FileHeader::read(&mut file).unwrap(), header);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.db");
        std::fs::write(&path, b"NOPE..............").unwrap();

        let err = read_file_header(&path).unwrap_err();
        assert!(matches!(err, StoreError::MagicMismatch { .. }));
    }

    #[test]
    fn short_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.db");
        std::fs::write(&path, b"CHT1").unwrap();

        let err = read_file_header(&path).unwrap_err();
        assert!(matches!(err, StoreError::FileTooShort { .. }));
    }
}
