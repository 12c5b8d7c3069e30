//! Store configuration.
//!
//! Options are passed explicitly to [`Store::open`](crate::Store::open);
//! there are no environment overrides and no global state. The effective
//! configuration (notably the rounded `max_key_length`) is captured per
//! store instance.

use chert_io::Access;

/// Effective configuration for one store instance.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Read-write (default) or read-only access.
    pub access: Access,

    /// Index slots to preallocate when creating a new file. Preallocating
    /// avoids record relocation while the store stays under this count.
    pub preallocated_records: u32,

    /// Maximum key length in bytes, range 1..=32763. Rounded up at open so
    /// that index slots are 8-byte aligned; the rounded value is recorded
    /// in the file header and must match on reopen.
    pub max_key_length: u16,

    /// Append a CRC32 of the value to every payload block and verify it on
    /// every read.
    pub payload_crc: bool,

    /// Use the memory-mapped backend instead of positioned file I/O.
    pub memory_mapped: bool,

    /// Accepted for parity with sibling implementations of the format.
    /// Ownership semantics already copy every value across the API
    /// boundary, so this flag has no effect.
    pub defensive_copy: bool,

    /// Allow same-size and CRC-protected shrinking updates to rewrite the
    /// payload in place. When off, every update relocates to a fresh block
    /// so a reader of the old block can never observe a tear.
    pub allow_in_place_updates: bool,

    /// Allow the index region to grow by relocating the record at the
    /// data-start pointer. When off, inserts that need more slots fail
    /// with `CapacityExceeded`.
    pub allow_header_expansion: bool,

    /// Pad every allocation to at least one index-slot width, so growing
    /// the index region by one slot relocates at most one record.
    pub pad_to_slot: bool,

    /// Round allocated capacities up to a multiple of this block size.
    pub preferred_block_size_kib: Option<u32>,

    /// Grow end-of-file allocations by this percentage of the current file
    /// length; the excess becomes the new record's free space.
    pub preferred_expansion_percent: Option<u32>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            access: Access::ReadWrite,
            preallocated_records: 0,
            max_key_length: 64,
            payload_crc: true,
            memory_mapped: false,
            defensive_copy: true,
            allow_in_place_updates: true,
            allow_header_expansion: true,
            pad_to_slot: true,
            preferred_block_size_kib: None,
            preferred_expansion_percent: None,
        }
    }
}

impl StoreOptions {
    /// Default options with read-only access.
    pub fn read_only() -> Self {
        Self {
            access: Access::ReadOnly,
            ..Self::default()
        }
    }
}
