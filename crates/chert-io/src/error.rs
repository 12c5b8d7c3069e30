//! I/O error types.

/// Errors from the file backends.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Underlying OS I/O error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A read ran past the end of the file.
    #[error("unexpected end of file: needed {needed} bytes at offset {offset}, length {length}")]
    UnexpectedEof {
        offset: u64,
        needed: usize,
        length: u64,
    },

    /// A write landed outside the published mapping.
    #[error("write of {len} bytes at offset {offset} exceeds mapped length {mapped}")]
    OutOfMappedRange { offset: u64, len: usize, mapped: u64 },

    /// A write or resize was attempted through a read-only backend.
    #[error("write attempted on a read-only file")]
    ReadOnlyFile,

    /// The backend has been closed.
    #[error("file is closed")]
    Closed,
}
