//! In-memory index: primary key map and free-space map.
//!
//! The engine owns one [`MemIndex`] per store. It mirrors the on-disk
//! index region exactly: one primary entry per occupied slot, a slot-order
//! key list for compaction on delete, and an ordered free-space map over
//! records with a strictly positive free tail.
//!
//! # Invariants
//!
//! - `primary.len() == slots.len() == num_records`
//! - `slots[h.slot] == key` for every `(key, h)` in the primary map
//! - the free map holds `(free_space, data_pointer) -> key` exactly for
//!   records with `free_space > 0`; ordering is free space ascending with
//!   pointer ties broken ascending

use std::collections::{BTreeMap, HashMap};

use crate::record::RecordHeader;

#[derive(Debug)]
pub(crate) struct MemIndex {
    primary: HashMap<Vec<u8>, RecordHeader>,
    /// Slot position to key, densely packed.
    slots: Vec<Vec<u8>>,
    /// `(free_space, data_pointer)` to key.
    free: BTreeMap<(u32, u64), Vec<u8>>,
    payload_crc: bool,
}

impl MemIndex {
    pub fn new(payload_crc: bool) -> Self {
        Self {
            primary: HashMap::new(),
            slots: Vec::new(),
            free: BTreeMap::new(),
            payload_crc,
        }
    }

    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn header(&self, key: &[u8]) -> Option<&RecordHeader> {
        self.primary.get(key)
    }

    fn free_key(&self, header: &RecordHeader) -> Option<(u32, u64)> {
        let free = header.free_space(self.payload_crc);
        (free > 0).then_some((free, header.data_pointer))
    }

    fn unlink_free(&mut self, header: &RecordHeader) {
        if let Some(entry) = self.free_key(header) {
            let removed = self.free.remove(&entry);
            debug_assert!(removed.is_some(), "free-space map out of sync");
        }
    }

    fn link_free(&mut self, key: &[u8], header: &RecordHeader) {
        if let Some(entry) = self.free_key(header) {
            let prev = self.free.insert(entry, key.to_vec());
            debug_assert!(prev.is_none(), "overlapping free-space entry");
        }
    }

    /// Adds a record in slot order. `header.slot` must be the next slot.
    pub fn insert(&mut self, key: Vec<u8>, header: RecordHeader) {
        debug_assert_eq!(
            header.slot as usize,
            self.slots.len(),
            "records enter the index in slot order"
        );
        self.link_free(&key, &header);
        self.slots.push(key.clone());
        let prev = self.primary.insert(key, header);
        debug_assert!(prev.is_none(), "key already indexed");
    }

    /// Replaces a record's header, refreshing free-space membership.
    ///
    /// The slot must not change here; slots move only through
    /// [`MemIndex::remove_swap`].
    pub fn set_header(&mut self, key: &[u8], header: RecordHeader) {
        let old = *self.primary.get(key).expect("set_header on indexed key");
        debug_assert_eq!(old.slot, header.slot, "slot changed outside remove_swap");
        self.unlink_free(&old);
        self.link_free(key, &header);
        self.primary.insert(key.to_vec(), header);
    }

    /// Removes a record, compacting the slot list by moving the last slot's
    /// key into the vacated position.
    ///
    /// Returns the removed header and, when compaction moved a record, the
    /// moved record's key; the caller must rewrite that record's slot on
    /// disk.
    pub fn remove_swap(&mut self, key: &[u8]) -> Option<(RecordHeader, Option<Vec<u8>>)> {
        let removed = self.primary.remove(key)?;
        self.unlink_free(&removed);

        let last_key = self.slots.pop().expect("slot list tracks the primary map");
        let moved = if last_key == key {
            debug_assert_eq!(removed.slot as usize, self.slots.len());
            None
        } else {
            self.slots[removed.slot as usize] = last_key.clone();
            let header = self
                .primary
                .get_mut(&last_key)
                .expect("last slot's key is indexed");
            header.slot = removed.slot;
            Some(last_key)
        };

        Some((removed, moved))
    }

    /// Smallest record with at least `needed` free bytes, pointer ties
    /// broken by file order.
    pub fn first_free_at_least(&self, needed: u32) -> Option<Vec<u8>> {
        self.free
            .range((needed, 0)..)
            .next()
            .map(|(_, key)| key.clone())
    }

    /// Key of the record whose block span contains `offset`.
    ///
    /// A linear scan; the map is small enough that this has never shown up
    /// in profiles, and it runs only on relocation and donation paths.
    pub fn record_at(&self, offset: u64) -> Option<Vec<u8>> {
        self.primary
            .iter()
            .find(|(_, header)| header.contains(offset))
            .map(|(key, _)| key.clone())
    }

    /// Smallest data pointer at or above `offset`.
    pub fn min_pointer_at_or_above(&self, offset: u64) -> Option<u64> {
        self.primary
            .values()
            .map(|header| header.data_pointer)
            .filter(|pointer| *pointer >= offset)
            .min()
    }

    /// All keys in slot order, snapshotted.
    pub fn keys_snapshot(&self) -> Vec<Vec<u8>> {
        self.slots.clone()
    }

    /// Key occupying a slot.
    pub fn key_at_slot(&self, slot: u32) -> Option<&[u8]> {
        self.slots.get(slot as usize).map(Vec::as_slice)
    }

    /// Free-space map contents, for invariant checks.
    #[cfg(test)]
    pub fn free_entries(&self) -> Vec<(u32, u64)> {
        self.free.keys().copied().collect()
    }
}
