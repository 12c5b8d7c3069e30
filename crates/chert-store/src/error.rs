//! Store error taxonomy.
//!
//! Argument and policy errors leave the store operational with no observable
//! state change. Format errors surface corruption found on open or on read.
//! Any I/O error observed by an operation retires the instance: the store
//! transitions to its unusable state and only `close` remains callable.

/// Errors from the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Insert of a key that is already present.
    #[error("key already exists")]
    DuplicateKey,

    /// Read, update, or delete of an absent key.
    #[error("key not found")]
    KeyNotFound,

    /// Zero-length keys are not representable in the index.
    #[error("key is empty")]
    EmptyKey,

    /// Key longer than the store's recorded maximum.
    #[error("key length {len} exceeds maximum {max}")]
    KeyTooLong { len: usize, max: u16 },

    /// Value does not fit the capacity field, or an allocated block.
    #[error("value of {len} bytes exceeds maximum {max}")]
    ValueTooLarge { len: u64, max: u64 },

    /// The file does not start with the chert magic marker.
    #[error("bad magic marker {found:02x?}, expected {expected:02x?}")]
    MagicMismatch { found: [u8; 4], expected: [u8; 4] },

    /// The file was created with a different `max_key_length`.
    #[error("file records max key length {file}, store opened with {requested}")]
    KeyLengthMismatch { file: u16, requested: u16 },

    /// A record header failed its self-CRC.
    #[error(
        "record header at offset {offset} is corrupt: stored CRC {stored:#018x}, computed {computed:#010x}"
    )]
    HeaderCorrupt {
        offset: u64,
        stored: u64,
        computed: u32,
    },

    /// A record header decoded but violates a structural invariant.
    #[error("record header at offset {offset} is invalid: {reason}")]
    HeaderInvalid { offset: u64, reason: &'static str },

    /// An index slot's key failed its CRC.
    #[error("key CRC mismatch in slot {slot}: stored {stored:#010x}, computed {computed:#010x}")]
    KeyCrcMismatch {
        slot: u32,
        stored: u32,
        computed: u32,
    },

    /// An index slot's key length byte is out of range.
    #[error("slot {slot} has invalid key length byte {len} (valid range 1..={max})")]
    InvalidKeyLength { slot: u32, len: u8, max: u16 },

    /// A payload failed its length or CRC check.
    #[error("payload at offset {offset} is corrupt")]
    PayloadCorrupt { offset: u64 },

    /// The file ends before a structure it must contain.
    #[error("file too short: {actual} bytes, need at least {expected}")]
    FileTooShort { expected: u64, actual: u64 },

    /// The data-start pointer sits inside the occupied index region.
    #[error("data start pointer {data_start} overlaps the index region ending at {index_end}")]
    DataStartOverlap { data_start: u64, index_end: u64 },

    /// `max_key_length` option outside the supported range.
    #[error("max key length {requested} outside supported range 1..={max}")]
    UnsupportedKeyLength { requested: u16, max: u16 },

    /// Mutation attempted on a read-only store.
    #[error("store is read-only")]
    ReadOnly,

    /// The index region is full and header expansion is disabled.
    #[error("index region is full at {slots} slots and header expansion is disabled")]
    CapacityExceeded { slots: u32 },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// The store observed an I/O failure mid-mutation and must be reopened.
    #[error("store is unusable after an I/O failure; close and reopen the file")]
    Unusable,

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] chert_io::IoError),
}

impl StoreError {
    /// True for failures that retire the store instance.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Io(_))
    }
}
