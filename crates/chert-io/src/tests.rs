//! Integration tests for the file backends.

use crate::{Access, DirectFile, FileBackend, IoError, MappedFile, StorageFile};

#[test]
fn direct_write_and_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("direct.dat");

    let mut file = DirectFile::open(&path, Access::ReadWrite).unwrap();
    file.write_all(b"hello world").unwrap();
    assert_eq!(file.position(), 11);
    file.sync().unwrap();

    file.seek(6);
    let mut buf = [0u8; 5];
    file.read_fully(&mut buf).unwrap();
    assert_eq!(&buf, b"world");
    file.close().unwrap();
}

#[test]
fn direct_typed_accessors_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typed.dat");

    let mut file = DirectFile::open(&path, Access::ReadWrite).unwrap();
    file.write_u8(0xAB).unwrap();
    file.write_u32(0xDEAD_BEEF).unwrap();
    file.write_u64(0x0123_4567_89AB_CDEF).unwrap();

    file.seek(0);
    assert_eq!(file.read_u8().unwrap(), 0xAB);
    assert_eq!(file.read_u32().unwrap(), 0xDEAD_BEEF);
    assert_eq!(file.read_u64().unwrap(), 0x0123_4567_89AB_CDEF);
}

#[test]
fn direct_short_read_reports_eof() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.dat");

    let mut file = DirectFile::open(&path, Access::ReadWrite).unwrap();
    file.write_all(b"abc").unwrap();

    file.seek(1);
    let mut buf = [0u8; 8];
    let err = file.read_fully(&mut buf).unwrap_err();
    assert!(matches!(err, IoError::UnexpectedEof { .. }));
}

#[test]
fn direct_set_length_grows_and_shrinks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resize.dat");

    let mut file = DirectFile::open(&path, Access::ReadWrite).unwrap();
    file.set_length(100).unwrap();
    assert_eq!(file.length().unwrap(), 100);
    file.set_length(10).unwrap();
    assert_eq!(file.length().unwrap(), 10);
}

#[test]
fn direct_close_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("close.dat");

    let mut file = DirectFile::open(&path, Access::ReadWrite).unwrap();
    file.close().unwrap();
    file.close().unwrap();
    assert!(matches!(file.length(), Err(IoError::Closed)));
}

#[test]
fn mapped_roundtrip_across_chunk_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mapped.dat");

    // 32-byte chunks force multi-chunk spans
    let mut file = MappedFile::open(&path, Access::ReadWrite, 32).unwrap();
    file.set_length(100).unwrap();

    let data: Vec<u8> = (0..80).collect();
    file.seek(10);
    file.write_all(&data).unwrap();

    file.seek(10);
    let mut buf = vec![0u8; 80];
    file.read_fully(&mut buf).unwrap();
    assert_eq!(buf, data);
}

#[test]
fn mapped_remap_preserves_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remap.dat");

    let mut file = MappedFile::open(&path, Access::ReadWrite, 16).unwrap();
    file.set_length(40).unwrap();
    file.seek(0);
    file.write_all(b"persistent across remaps").unwrap();

    // Growing remaps only the tail chunk; earlier chunks are reused
    file.set_length(200).unwrap();
    file.seek(0);
    let mut buf = [0u8; 24];
    file.read_fully(&mut buf).unwrap();
    assert_eq!(&buf, b"persistent across remaps");

    // Shrinking drops chunks past the new length
    file.set_length(24).unwrap();
    assert_eq!(file.length().unwrap(), 24);
    file.seek(0);
    file.read_fully(&mut buf).unwrap();
    assert_eq!(&buf, b"persistent across remaps");
}

#[test]
fn mapped_write_past_mapping_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oob.dat");

    let mut file = MappedFile::open(&path, Access::ReadWrite, 16).unwrap();
    file.set_length(8).unwrap();
    file.seek(4);
    let err = file.write_all(&[0u8; 16]).unwrap_err();
    assert!(matches!(err, IoError::OutOfMappedRange { .. }));
}

#[test]
fn mapped_read_only_rejects_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro.dat");
    std::fs::write(&path, b"fixed contents").unwrap();

    let mut file = MappedFile::open(&path, Access::ReadOnly, 16).unwrap();
    let mut buf = [0u8; 5];
    file.read_fully(&mut buf).unwrap();
    assert_eq!(&buf, b"fixed");

    file.seek(0);
    assert!(matches!(
        file.write_all(b"nope"),
        Err(IoError::ReadOnlyFile)
    ));
    assert!(matches!(file.set_length(4), Err(IoError::ReadOnlyFile)));
}

#[test]
fn mapped_survives_data_written_by_direct() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cross.dat");

    let mut direct = DirectFile::open(&path, Access::ReadWrite).unwrap();
    direct.write_all(b"written directly").unwrap();
    direct.sync().unwrap();
    direct.close().unwrap();

    let mut mapped = MappedFile::open(&path, Access::ReadOnly, 8).unwrap();
    let mut buf = vec![0u8; 16];
    mapped.read_fully(&mut buf).unwrap();
    assert_eq!(&buf, b"written directly");
}

#[test]
fn backend_selector_opens_both_variants() {
    let dir = tempfile::tempdir().unwrap();

    let path = dir.path().join("selector_direct.dat");
    let mut backend = FileBackend::open(&path, Access::ReadWrite, false).unwrap();
    backend.write_all(b"x").unwrap();
    assert!(matches!(backend, FileBackend::Direct(_)));
    backend.close().unwrap();

    let path = dir.path().join("selector_mapped.dat");
    let backend = FileBackend::open(&path, Access::ReadWrite, true).unwrap();
    assert!(matches!(backend, FileBackend::Mapped(_)));
}
