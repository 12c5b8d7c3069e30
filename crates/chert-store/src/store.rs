//! The store engine.
//!
//! [`Store`] ties the pieces together: it owns one file backend, the
//! in-memory index, and the effective configuration, and implements the
//! public operations with the crash-safe write ordering described in the
//! crate docs.
//!
//! # Write Ordering
//!
//! - **Insert**: payload, record header, key, record count. A crash before
//!   the count bump leaves an unreferenced payload that the next open
//!   ignores, because index population stops at `num_records`.
//! - **In-place update**: record header with the old count, payload, record
//!   header with the new count. At least one valid header is on disk at
//!   every instant; the payload CRC rejects a torn value.
//! - **Delete**: vacated slot overwritten by the last slot, record count
//!   decrement, then space reclamation. A crash between the first two
//!   leaves the moved record duplicated in the last slot; the next open
//!   drops the stale copy and completes the decrement.
//!
//! # Lifecycle
//!
//! A store is read-write or read-only from open until `close`. Any I/O
//! failure surfaced by an operation retires the instance: every call except
//! `close` then fails, and recovery means reopening the file. `close` is
//! idempotent and performs a final `fsync`.

use std::path::Path;

use chert_io::{FileBackend, StorageFile};

use crate::error::StoreError;
use crate::header::{self, FILE_HEADER_LENGTH, FileHeader, round_up_key_length};
use crate::index::MemIndex;
use crate::options::StoreOptions;
use crate::record::RecordHeader;
use crate::slot::{self, index_entry_length, slot_header_offset};

/// Largest accepted value length; the serialised payload (length prefix,
/// value, CRC) must fit the 32-bit capacity field.
pub const MAX_VALUE_LENGTH: u64 = u32::MAX as u64 - 8;

/// Index slots reserved beyond the incoming record when carving new blocks
/// out of front free space.
const RESERVED_SLOTS: u64 = 2;

/// Lifecycle states of a store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    OpenRw,
    OpenRo,
    /// An I/O failure was observed mid-mutation; only `close` may follow.
    Unknown,
    Closed,
}

/// Per-record listing entry, used by tooling and tests.
#[derive(Debug, Clone)]
pub struct RecordInfo {
    pub slot: u32,
    pub key: Vec<u8>,
    pub data_pointer: u64,
    pub data_capacity: u32,
    pub data_count: u32,
    pub free_space: u32,
}

/// Single-file key/value record store.
///
/// All operations take `&mut self`; the exclusive borrow serialises every
/// reader and writer, which is the engine's whole concurrency model. Wrap
/// the store in a mutex to share it across threads.
#[derive(Debug)]
pub struct Store {
    file: FileBackend,
    state: State,
    options: StoreOptions,
    /// Effective (rounded) maximum key length.
    max_key_length: u16,
    /// Cached `index_entry_length(max_key_length)`.
    entry_length: u64,
    num_records: u32,
    data_start_ptr: u64,
    index: MemIndex,
}

impl Store {
    /// Opens or creates a store file.
    ///
    /// A new file is created only under read-write access; it is laid out
    /// with `preallocated_records` empty index slots. An existing file must
    /// carry the chert magic and the same effective `max_key_length`, or
    /// the open fails after releasing the file handle and any mappings.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let max_key_length = round_up_key_length(options.max_key_length)?;

        let mut file = FileBackend::open(path, options.access, options.memory_mapped)?;
        match Self::init(&mut file, &options, max_key_length) {
            Ok((num_records, data_start_ptr, index)) => {
                tracing::info!(
                    path = %path.display(),
                    records = num_records,
                    max_key_length,
                    memory_mapped = options.memory_mapped,
                    read_only = options.access.is_read_only(),
                    "opened store"
                );
                let state = if options.access.is_read_only() {
                    State::OpenRo
                } else {
                    State::OpenRw
                };
                Ok(Self {
                    file,
                    state,
                    max_key_length,
                    entry_length: index_entry_length(max_key_length),
                    num_records,
                    data_start_ptr,
                    index,
                    options,
                })
            }
            Err(e) => {
                // Release the handle and mappings before failing the open
                let _ = file.close();
                Err(e)
            }
        }
    }

    /// Creates a fresh layout or populates the index from an existing file.
    fn init(
        file: &mut FileBackend,
        options: &StoreOptions,
        max_key_length: u16,
    ) -> Result<(u32, u64, MemIndex), StoreError> {
        let entry_length = index_entry_length(max_key_length);
        let length = file.length()?;

        if length == 0 {
            if options.access.is_read_only() {
                return Err(StoreError::FileTooShort {
                    expected: FILE_HEADER_LENGTH,
                    actual: 0,
                });
            }
            let data_start_ptr =
                FILE_HEADER_LENGTH + u64::from(options.preallocated_records) * entry_length;
            file.set_length(data_start_ptr)?;
            FileHeader {
                max_key_length,
                num_records: 0,
                data_start_ptr,
            }
            .write(file)?;
            return Ok((0, data_start_ptr, MemIndex::new(options.payload_crc)));
        }

        let file_header = FileHeader::read(file)?;
        if file_header.max_key_length != max_key_length {
            return Err(StoreError::KeyLengthMismatch {
                file: file_header.max_key_length,
                requested: max_key_length,
            });
        }

        let index_end =
            FILE_HEADER_LENGTH + u64::from(file_header.num_records) * entry_length;
        if file_header.data_start_ptr < index_end {
            return Err(StoreError::DataStartOverlap {
                data_start: file_header.data_start_ptr,
                index_end,
            });
        }
        if length < file_header.data_start_ptr {
            return Err(StoreError::FileTooShort {
                expected: file_header.data_start_ptr,
                actual: length,
            });
        }

        let mut index = MemIndex::new(options.payload_crc);
        let mut stale_trailing_slot = false;
        for position in 0..file_header.num_records {
            let key = slot::read_key(file, position, max_key_length)?;
            let offset = slot_header_offset(position, max_key_length);
            let mut record = RecordHeader::read(file, offset)?;
            record.slot = position;

            if record.data_count().is_none() {
                return Err(StoreError::HeaderInvalid {
                    offset,
                    reason: "indexed record was never written",
                });
            }
            if record.used_length(options.payload_crc) > record.data_capacity {
                return Err(StoreError::HeaderInvalid {
                    offset,
                    reason: "payload length exceeds block capacity",
                });
            }
            if let Some(existing) = index.header(&key) {
                // A delete interrupted between its slot swap and the record
                // count decrement leaves the moved record duplicated in the
                // last slot; keep the first occurrence, drop the stale one
                let same_block = existing.data_pointer == record.data_pointer
                    && existing.data_capacity == record.data_capacity
                    && existing.data_count() == record.data_count();
                if same_block && position == file_header.num_records - 1 {
                    tracing::warn!(
                        slot = position,
                        "dropped stale trailing slot left by an interrupted delete"
                    );
                    stale_trailing_slot = true;
                    continue;
                }
                return Err(StoreError::HeaderInvalid {
                    offset,
                    reason: "duplicate key in index region",
                });
            }
            if record.end() > length {
                // Tolerated so a file truncated inside one payload still
                // opens; reading that record reports corruption
                tracing::warn!(
                    slot = position,
                    end = record.end(),
                    file_length = length,
                    "record block extends past end of file"
                );
            }

            index.insert(key, record);
        }

        let mut num_records = file_header.num_records;
        if stale_trailing_slot {
            // Complete the interrupted delete's record count decrement
            num_records -= 1;
            if !options.access.is_read_only() {
                file.seek(header::NUM_RECORDS_OFFSET);
                file.write_u32(num_records)?;
            }
        }

        Ok((num_records, file_header.data_start_ptr, index))
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Inserts a new record.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.ensure_writable()?;
        self.check_key(key)?;
        self.check_value(value)?;
        if self.index.header(key).is_some() {
            return Err(StoreError::DuplicateKey);
        }
        let result = self.insert_inner(key, value);
        self.fatal_guard(result)
    }

    /// Replaces an existing record's value.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.ensure_writable()?;
        self.check_value(value)?;
        let Some(&record) = self.index.header(key) else {
            return Err(StoreError::KeyNotFound);
        };
        let result = self.update_inner(key, record, value);
        self.fatal_guard(result)
    }

    /// Reads a record's value, verifying the payload CRC when enabled.
    pub fn read(&mut self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.ensure_open()?;
        let Some(&record) = self.index.header(key) else {
            return Err(StoreError::KeyNotFound);
        };
        let result = self.read_payload(&record);
        self.fatal_guard(result)
    }

    /// Deletes a record.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.ensure_writable()?;
        if self.index.header(key).is_none() {
            return Err(StoreError::KeyNotFound);
        }
        let result = self.delete_inner(key);
        self.fatal_guard(result)
    }

    /// Whether a key is present.
    pub fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.ensure_open()?;
        Ok(self.index.header(key).is_some())
    }

    /// Number of records.
    pub fn len(&self) -> Result<usize, StoreError> {
        self.ensure_open()?;
        Ok(self.index.len())
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// All keys in slot order, snapshotted at call time.
    pub fn keys(&self) -> Result<std::vec::IntoIter<Vec<u8>>, StoreError> {
        self.ensure_open()?;
        Ok(self.index.keys_snapshot().into_iter())
    }

    /// Flushes file data and metadata to stable storage.
    ///
    /// Durability points are exactly this call and `close`; the engine
    /// never fsyncs on its own.
    pub fn fsync(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let result = self.file.sync().map_err(StoreError::from);
        self.fatal_guard(result)
    }

    /// Syncs (when writable) and releases the file. Idempotent.
    pub fn close(&mut self) -> Result<(), StoreError> {
        match self.state {
            State::Closed => Ok(()),
            State::Unknown => {
                let _ = self.file.close();
                self.state = State::Closed;
                Ok(())
            }
            State::OpenRw | State::OpenRo => {
                let sync = if self.state == State::OpenRw {
                    self.file.sync()
                } else {
                    Ok(())
                };
                let _ = self.file.close();
                self.state = State::Closed;
                tracing::info!(records = self.num_records, "closed store");
                sync.map_err(StoreError::from)
            }
        }
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Current file length in bytes.
    pub fn file_length(&self) -> Result<u64, StoreError> {
        self.ensure_open()?;
        Ok(self.file.length()?)
    }

    /// Absolute offset where the data region starts.
    pub fn data_start(&self) -> u64 {
        self.data_start_ptr
    }

    /// Effective (rounded) maximum key length.
    pub fn max_key_length(&self) -> u16 {
        self.max_key_length
    }

    /// Per-record listing in slot order, for tooling.
    pub fn records(&self) -> Result<Vec<RecordInfo>, StoreError> {
        self.ensure_open()?;
        let mut out = Vec::with_capacity(self.index.len());
        for (position, key) in self.index.keys_snapshot().into_iter().enumerate() {
            let header = self.index.header(&key).expect("slot key is indexed");
            out.push(RecordInfo {
                slot: position as u32,
                data_pointer: header.data_pointer,
                data_capacity: header.data_capacity,
                data_count: header.data_count().unwrap_or(0),
                free_space: header.free_space(self.options.payload_crc),
                key,
            });
        }
        Ok(out)
    }

    // ========================================================================
    // Guards
    // ========================================================================

    fn ensure_open(&self) -> Result<(), StoreError> {
        match self.state {
            State::Closed => Err(StoreError::Closed),
            State::Unknown => Err(StoreError::Unusable),
            State::OpenRw | State::OpenRo => Ok(()),
        }
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.state == State::OpenRo {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn check_key(&self, key: &[u8]) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        if key.len() > usize::from(self.max_key_length) {
            return Err(StoreError::KeyTooLong {
                len: key.len(),
                max: self.max_key_length,
            });
        }
        Ok(())
    }

    fn check_value(&self, value: &[u8]) -> Result<(), StoreError> {
        if value.len() as u64 > MAX_VALUE_LENGTH {
            return Err(StoreError::ValueTooLarge {
                len: value.len() as u64,
                max: MAX_VALUE_LENGTH,
            });
        }
        Ok(())
    }

    /// Retires the instance on fatal errors; argument, policy, and format
    /// errors pass through with the store still operational.
    fn fatal_guard<T>(&mut self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(e) = &result
            && e.is_fatal()
        {
            self.state = State::Unknown;
            tracing::error!(error = %e, "I/O failure, store is now unusable");
        }
        result
    }

    // ========================================================================
    // Mutation internals
    // ========================================================================

    fn insert_inner(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.ensure_index_space(self.num_records + 1)?;

        let mut record = self.allocate(value.len())?;
        record.slot = self.num_records;

        self.write_payload(&mut record, value)?;
        self.write_record_header(&record)?;
        slot::write_key(&mut self.file, record.slot, self.max_key_length, key)?;
        self.persist_num_records(self.num_records + 1)?;

        self.index.insert(key.to_vec(), record);
        tracing::debug!(
            slot = record.slot,
            data_pointer = record.data_pointer,
            value_len = value.len(),
            "inserted record"
        );
        Ok(())
    }

    fn update_inner(
        &mut self,
        key: &[u8],
        mut record: RecordHeader,
        value: &[u8],
    ) -> Result<(), StoreError> {
        let payload_crc = self.options.payload_crc;
        let capacity = record.data_capacity;
        let new_used = RecordHeader::serialized_length(value.len() as u32, payload_crc);
        let in_place = self.options.allow_in_place_updates;

        // Same size, or shrinking with the CRC binding count to contents:
        // rewrite in place under the dual-write protocol
        if in_place && (new_used == capacity || (new_used < capacity && payload_crc)) {
            self.write_record_header(&record)?;
            self.write_payload(&mut record, value)?;
            self.write_record_header(&record)?;
            self.index.set_header(key, record);
            return Ok(());
        }

        // Last block in the file: resize the file instead of relocating
        if in_place && record.end() == self.file.length()? {
            let pointer = record.data_pointer;
            if new_used >= capacity {
                self.file.set_length(pointer + u64::from(new_used))?;
                record.data_capacity = new_used;
                self.write_payload(&mut record, value)?;
                self.write_record_header(&record)?;
            } else {
                record.data_capacity = new_used;
                self.write_payload(&mut record, value)?;
                self.write_record_header(&record)?;
                self.file.set_length(pointer + u64::from(new_used))?;
            }
            self.index.set_header(key, record);
            tracing::debug!(
                slot = record.slot,
                old_capacity = capacity,
                new_capacity = new_used,
                "resized last record in place"
            );
            return Ok(());
        }

        // Relocate: fresh block, payload, header into the same slot, then
        // donate the old block's capacity
        let old = record;
        let mut fresh = self.allocate(value.len())?;
        fresh.slot = old.slot;
        self.write_payload(&mut fresh, value)?;
        self.write_record_header(&fresh)?;
        self.index.set_header(key, fresh);
        self.donate_block(old.data_pointer, old.data_capacity)?;
        tracing::debug!(
            slot = old.slot,
            from = old.data_pointer,
            to = fresh.data_pointer,
            "relocated record on update"
        );
        Ok(())
    }

    fn delete_inner(&mut self, key: &[u8]) -> Result<(), StoreError> {
        let (removed, moved_key) = self
            .index
            .remove_swap(key)
            .expect("presence checked by caller");

        if let Some(moved) = moved_key {
            // Overwrite the vacated slot with the former last slot's key
            // and header in one write
            let moved_header = *self.index.header(&moved).expect("moved record is indexed");
            let mut buf = slot::encode_key(&moved, self.max_key_length);
            buf.extend_from_slice(&moved_header.to_bytes());
            self.file
                .seek(slot::slot_offset(removed.slot, self.max_key_length));
            self.file.write_all(&buf)?;
        }

        self.persist_num_records(self.num_records - 1)?;
        self.donate_block(removed.data_pointer, removed.data_capacity)?;
        tracing::debug!(
            slot = removed.slot,
            data_pointer = removed.data_pointer,
            "deleted record"
        );
        Ok(())
    }

    // ========================================================================
    // Allocation and space management
    // ========================================================================

    /// Finds capacity for a payload of `value_len` bytes.
    ///
    /// Preference order: carve from front free space (keeping two slots of
    /// headroom for index growth), split the smallest sufficient free tail,
    /// grow the file. The returned header is unwritten; the first payload
    /// write sets its count.
    fn allocate(&mut self, value_len: usize) -> Result<RecordHeader, StoreError> {
        let payload = RecordHeader::serialized_length(value_len as u32, self.options.payload_crc);
        let mut wanted = u64::from(payload);
        if self.options.pad_to_slot {
            wanted = wanted.max(self.entry_length);
        }
        if let Some(kib) = self.options.preferred_block_size_kib {
            let block = u64::from(kib) * 1024;
            if block > 0 {
                wanted = wanted.div_ceil(block) * block;
            }
        }
        if wanted > u64::from(u32::MAX) {
            return Err(StoreError::ValueTooLarge {
                len: value_len as u64,
                max: MAX_VALUE_LENGTH,
            });
        }

        // 1. Front free space, reserving the incoming slot plus two more
        let index_end =
            FILE_HEADER_LENGTH + (u64::from(self.num_records) + 1) * self.entry_length;
        let reserved_end = index_end + RESERVED_SLOTS * self.entry_length;
        let front_free = self.data_start_ptr.saturating_sub(reserved_end);
        if wanted <= front_free {
            let pointer = self.data_start_ptr - wanted;
            self.persist_data_start(pointer)?;
            tracing::trace!(pointer, capacity = wanted, "allocated from front free space");
            return Ok(RecordHeader::new(pointer, wanted as u32));
        }

        // 2. Smallest sufficient free tail in the free-space map
        if let Some(donor_key) = self.index.first_free_at_least(wanted as u32) {
            return self.split_donor(&donor_key);
        }

        // 3. Grow the file
        let length = self.file.length()?;
        let mut growth = wanted;
        if let Some(percent) = self.options.preferred_expansion_percent {
            let preferred = length.saturating_mul(u64::from(percent)) / 100;
            if preferred > growth && preferred <= u64::from(u32::MAX) {
                growth = preferred;
            }
        }
        self.file.set_length(length + growth)?;
        tracing::trace!(pointer = length, capacity = growth, "allocated at end of file");
        Ok(RecordHeader::new(length, growth as u32))
    }

    /// Splits the donor's free tail off as a fresh block, persisting the
    /// shrunk donor header first.
    fn split_donor(&mut self, donor_key: &[u8]) -> Result<RecordHeader, StoreError> {
        let mut donor = *self
            .index
            .header(donor_key)
            .expect("donor key came from the free-space map");
        let fresh = donor.split(self.options.payload_crc);

        self.write_record_header(&donor)?;
        self.index.set_header(donor_key, donor);
        tracing::trace!(
            pointer = fresh.data_pointer,
            capacity = fresh.data_capacity,
            donor_slot = donor.slot,
            "allocated by splitting a free tail"
        );
        Ok(fresh)
    }

    /// Makes room for `slots` index slots, relocating front records to the
    /// end of the file as needed.
    fn ensure_index_space(&mut self, slots: u32) -> Result<(), StoreError> {
        let required_end = FILE_HEADER_LENGTH + u64::from(slots) * self.entry_length;
        if self.data_start_ptr >= required_end {
            return Ok(());
        }
        if !self.options.allow_header_expansion {
            return Err(StoreError::CapacityExceeded { slots });
        }

        if self.num_records == 0 {
            if self.file.length()? < required_end {
                self.file.set_length(required_end)?;
            }
            self.persist_data_start(required_end)?;
            return Ok(());
        }

        while self.data_start_ptr < required_end {
            match self.index.record_at(self.data_start_ptr) {
                Some(front_key) => self.relocate_to_end(&front_key)?,
                None => match self.index.min_pointer_at_or_above(self.data_start_ptr) {
                    // Gap left by an interrupted relocation: reclaim it
                    Some(pointer) => {
                        tracing::warn!(
                            from = self.data_start_ptr,
                            to = pointer,
                            "healed gap below the data region"
                        );
                        self.persist_data_start(pointer)?;
                    }
                    None => {
                        if self.file.length()? < required_end {
                            self.file.set_length(required_end)?;
                        }
                        self.persist_data_start(required_end)?;
                    }
                },
            }
        }
        Ok(())
    }

    /// Moves the record at the data-start pointer to the end of the file
    /// and advances the pointer past its old block.
    fn relocate_to_end(&mut self, key: &[u8]) -> Result<(), StoreError> {
        let mut record = *self.index.header(key).expect("record key is indexed");
        let old_pointer = record.data_pointer;
        let capacity = u64::from(record.data_capacity);
        let used = record.used_length(self.options.payload_crc);

        let length = self.file.length()?;
        self.file.set_length(length + capacity)?;

        // Only the occupied prefix of the block carries data
        let mut buf = vec![0u8; used as usize];
        self.file.seek(old_pointer);
        self.file.read_fully(&mut buf)?;
        self.file.seek(length);
        self.file.write_all(&buf)?;

        record.data_pointer = length;
        self.write_record_header(&record)?;
        self.index.set_header(key, record);
        self.persist_data_start(old_pointer + capacity)?;

        tracing::debug!(
            slot = record.slot,
            from = old_pointer,
            to = length,
            capacity,
            "relocated front record for index expansion"
        );
        Ok(())
    }

    /// Returns a freed block's capacity to the file, the front free space,
    /// or the preceding record, in that preference order.
    fn donate_block(&mut self, pointer: u64, capacity: u32) -> Result<(), StoreError> {
        let length = self.file.length()?;
        if pointer + u64::from(capacity) == length {
            self.file.set_length(pointer)?;
            tracing::trace!(pointer, capacity, "trimmed freed block off the file end");
            return Ok(());
        }

        if pointer == self.data_start_ptr {
            self.persist_data_start(pointer + u64::from(capacity))?;
            tracing::trace!(pointer, capacity, "freed block grew the front free space");
            return Ok(());
        }

        if let Some(neighbour_key) = self.index.record_at(pointer - 1) {
            let mut neighbour = *self
                .index
                .header(&neighbour_key)
                .expect("neighbour key is indexed");
            neighbour.data_capacity += capacity;
            self.write_record_header(&neighbour)?;
            self.index.set_header(&neighbour_key, neighbour);
            tracing::trace!(
                to = neighbour.data_pointer,
                donated = capacity,
                "donated freed capacity to the preceding record"
            );
            return Ok(());
        }

        // Unreachable while spans tile the data region; a crash-legacy gap
        // stays unowned until expansion heals it
        tracing::warn!(pointer, capacity, "freed block has no neighbour to absorb it");
        Ok(())
    }

    // ========================================================================
    // Payload and header I/O
    // ========================================================================

    fn write_payload(&mut self, record: &mut RecordHeader, value: &[u8]) -> Result<(), StoreError> {
        let count = value.len() as u32;
        let serialized = RecordHeader::serialized_length(count, self.options.payload_crc);
        if serialized > record.data_capacity {
            // Unreachable from the public API while allocation is correct
            return Err(StoreError::ValueTooLarge {
                len: value.len() as u64,
                max: u64::from(record.data_capacity),
            });
        }

        let mut buf = Vec::with_capacity(serialized as usize);
        buf.extend_from_slice(&count.to_le_bytes());
        buf.extend_from_slice(value);
        if self.options.payload_crc {
            buf.extend_from_slice(&crc32fast::hash(value).to_le_bytes());
        }

        self.file.seek(record.data_pointer);
        self.file.write_all(&buf)?;
        record.set_data_count(count);
        Ok(())
    }

    fn read_payload(&mut self, record: &RecordHeader) -> Result<Vec<u8>, StoreError> {
        let count = record
            .data_count()
            .expect("indexed record has a written payload");
        let pointer = record.data_pointer;

        self.file.seek(pointer);
        let stored_count = eof_is_corrupt(self.file.read_u32(), pointer)?;
        if stored_count != count {
            return Err(StoreError::PayloadCorrupt { offset: pointer });
        }

        let mut value = vec![0u8; count as usize];
        eof_is_corrupt(self.file.read_fully(&mut value), pointer)?;

        if self.options.payload_crc {
            let stored = eof_is_corrupt(self.file.read_u32(), pointer)?;
            let computed = crc32fast::hash(&value);
            if stored != computed {
                tracing::warn!(
                    offset = pointer,
                    stored,
                    computed,
                    "payload CRC mismatch"
                );
                return Err(StoreError::PayloadCorrupt { offset: pointer });
            }
        }
        Ok(value)
    }

    fn write_record_header(&mut self, record: &RecordHeader) -> Result<(), StoreError> {
        record.write(
            &mut self.file,
            slot_header_offset(record.slot, self.max_key_length),
        )
    }

    fn persist_num_records(&mut self, count: u32) -> Result<(), StoreError> {
        self.file.seek(header::NUM_RECORDS_OFFSET);
        self.file.write_u32(count)?;
        self.num_records = count;
        Ok(())
    }

    fn persist_data_start(&mut self, pointer: u64) -> Result<(), StoreError> {
        self.file.seek(header::DATA_START_OFFSET);
        self.file.write_u64(pointer)?;
        self.data_start_ptr = pointer;
        Ok(())
    }

    // ========================================================================
    // Test support
    // ========================================================================

    /// Checks the structural invariants that every observable state must
    /// satisfy. Test-only; the engine maintains these by construction.
    #[cfg(test)]
    pub(crate) fn verify_invariants(&mut self) {
        let length = self.file.length().unwrap();
        let records = self.records().unwrap();

        assert_eq!(records.len(), self.num_records as usize);
        assert!(
            self.data_start_ptr
                >= FILE_HEADER_LENGTH + u64::from(self.num_records) * self.entry_length,
            "data start overlaps the index region"
        );
        assert!(length >= self.data_start_ptr, "file shorter than data start");

        let mut spans: Vec<(u64, u64)> = records
            .iter()
            .map(|r| (r.data_pointer, r.data_pointer + u64::from(r.data_capacity)))
            .collect();
        spans.sort_unstable();
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "record spans overlap: {pair:?}");
        }
        for (start, end) in &spans {
            assert!(*start >= self.data_start_ptr, "block below the data region");
            assert!(*end <= length, "block past end of file");
        }

        let mut expected_free: Vec<(u32, u64)> = records
            .iter()
            .filter(|r| r.free_space > 0)
            .map(|r| (r.free_space, r.data_pointer))
            .collect();
        expected_free.sort_unstable();
        assert_eq!(
            self.index.free_entries(),
            expected_free,
            "free-space map out of sync"
        );

        // The persisted header matches the in-memory state
        let disk = FileHeader::read(&mut self.file).unwrap();
        assert_eq!(disk.num_records, self.num_records);
        assert_eq!(disk.data_start_ptr, self.data_start_ptr);
        assert_eq!(disk.max_key_length, self.max_key_length);
    }
}

/// Maps a short read inside a payload block to `PayloadCorrupt`, so a file
/// truncated mid-record reads as corruption rather than a fatal I/O error.
fn eof_is_corrupt<T>(
    result: Result<T, chert_io::IoError>,
    offset: u64,
) -> Result<T, StoreError> {
    match result {
        Ok(v) => Ok(v),
        Err(chert_io::IoError::UnexpectedEof { .. }) => {
            Err(StoreError::PayloadCorrupt { offset })
        }
        Err(e) => Err(e.into()),
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                tracing::error!(error = %e, "failed to close store during drop");
            }
        }
    }
}
