//! Index-slot layout and key codec.
//!
//! The index region is a contiguous array of fixed-size slots starting
//! right after the file header. Each slot holds a length-prefixed key,
//! zero padding, the key's CRC32, and the record header:
//!
//! ```text
//! [key_len:u8][key bytes, zero-padded to max_key_length][key_crc:u32][record header:24B]
//! ```
//!
//! `max_key_length` is rounded at creation so the key region is a multiple
//! of 8 bytes, keeping every slot 8-byte aligned.

use chert_io::StorageFile;

use crate::StoreError;
use crate::header::FILE_HEADER_LENGTH;
use crate::record::RECORD_HEADER_LENGTH;

/// Length byte plus key CRC overhead inside the key region.
const KEY_OVERHEAD: u64 = 5;

/// Length of a slot's key region (length byte, padded key, CRC).
pub(crate) fn key_region_length(max_key_length: u16) -> u64 {
    u64::from(max_key_length) + KEY_OVERHEAD
}

/// Total length of one index slot.
pub fn index_entry_length(max_key_length: u16) -> u64 {
    key_region_length(max_key_length) + RECORD_HEADER_LENGTH
}

/// Absolute file offset of a slot.
pub(crate) fn slot_offset(slot: u32, max_key_length: u16) -> u64 {
    FILE_HEADER_LENGTH + u64::from(slot) * index_entry_length(max_key_length)
}

/// Absolute file offset of a slot's record header.
pub(crate) fn slot_header_offset(slot: u32, max_key_length: u16) -> u64 {
    slot_offset(slot, max_key_length) + key_region_length(max_key_length)
}

/// Serialises a slot's key region: length byte, padded key bytes, CRC.
pub(crate) fn encode_key(key: &[u8], max_key_length: u16) -> Vec<u8> {
    debug_assert!(!key.is_empty() && key.len() <= usize::from(max_key_length));

    let region = key_region_length(max_key_length) as usize;
    let mut buf = vec![0u8; region];
    buf[0] = key.len() as u8;
    buf[1..=key.len()].copy_from_slice(key);
    let crc = crc32fast::hash(key);
    buf[region - 4..].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Writes a key into its slot in a single call.
pub(crate) fn write_key(
    file: &mut impl StorageFile,
    slot: u32,
    max_key_length: u16,
    key: &[u8],
) -> Result<(), StoreError> {
    file.seek(slot_offset(slot, max_key_length));
    file.write_all(&encode_key(key, max_key_length))?;
    Ok(())
}

/// Reads and verifies the key stored in a slot.
pub(crate) fn read_key(
    file: &mut impl StorageFile,
    slot: u32,
    max_key_length: u16,
) -> Result<Vec<u8>, StoreError> {
    let region = key_region_length(max_key_length) as usize;
    let mut buf = vec![0u8; region];
    file.seek(slot_offset(slot, max_key_length));
    file.read_fully(&mut buf)?;

    let len = buf[0];
    if len == 0 || usize::from(len) > usize::from(max_key_length) {
        return Err(StoreError::InvalidKeyLength {
            slot,
            len,
            max: max_key_length,
        });
    }

    let key = &buf[1..=usize::from(len)];
    let stored = u32::from_le_bytes(buf[region - 4..].try_into().expect("4-byte slice"));
    let computed = crc32fast::hash(key);
    if stored != computed {
        return Err(StoreError::KeyCrcMismatch {
            slot,
            stored,
            computed,
        });
    }

    Ok(key.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chert_io::{Access, DirectFile};
    use proptest::prelude::*;

    const MAX: u16 = 67;

    fn scratch_file(dir: &tempfile::TempDir) -> DirectFile {
        DirectFile::open(&dir.path().join("slots.db"), Access::ReadWrite).unwrap()
    }

    #[test]
    fn slot_geometry_is_aligned() {
        assert_eq!(index_entry_length(MAX), 96);
        assert_eq!(index_entry_length(MAX) % 8, 0);
        assert_eq!(slot_offset(0, MAX), FILE_HEADER_LENGTH);
        assert_eq!(slot_offset(3, MAX), FILE_HEADER_LENGTH + 3 * 96);
        assert_eq!(slot_header_offset(0, MAX), FILE_HEADER_LENGTH + 72);
    }

    #[test]
    fn key_roundtrip_through_slots() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = scratch_file(&dir);

        write_key(&mut file, 0, MAX, b"alpha").unwrap();
        write_key(&mut file, 2, MAX, b"a-longer-key-with-punctuation!").unwrap();

        assert_eq!(read_key(&mut file, 0, MAX).unwrap(), b"alpha");
        assert_eq!(
            read_key(&mut file, 2, MAX).unwrap(),
            b"a-longer-key-with-punctuation!"
        );
    }

    #[test]
    fn zero_length_byte_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = scratch_file(&dir);

        // A zeroed slot decodes as a zero length byte
        file.seek(0);
        file.write_all(&vec![0u8; slot_offset(1, MAX) as usize])
            .unwrap();
        let err = read_key(&mut file, 0, MAX).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidKeyLength { slot: 0, len: 0, .. }
        ));
    }

    #[test]
    fn flipped_key_byte_fails_crc() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = scratch_file(&dir);
        write_key(&mut file, 1, MAX, b"integrity").unwrap();

        // Flip one byte inside the stored key
        let offset = slot_offset(1, MAX) + 3;
        file.seek(offset);
        let byte = {
            let mut b = [0u8; 1];
            file.read_fully(&mut b).unwrap();
            b[0]
        };
        file.seek(offset);
        file.write_all(&[byte ^ 0x40]).unwrap();

        let err = read_key(&mut file, 1, MAX).unwrap_err();
        assert!(matches!(err, StoreError::KeyCrcMismatch { slot: 1, .. }));
    }

    proptest! {
        #[test]
        fn arbitrary_keys_roundtrip(key in proptest::collection::vec(any::<u8>(), 1..=usize::from(MAX))) {
            let dir = tempfile::tempdir().unwrap();
            let mut file = scratch_file(&dir);
            write_key(&mut file, 0, MAX, &key).unwrap();
            prop_assert_eq!(read_key(&mut file, 0, MAX).unwrap(), key);
        }
    }
}
