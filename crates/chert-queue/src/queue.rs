//! The queue itself: counter keys, the genesis record, and recovery.

use std::collections::BTreeSet;
use std::path::Path;

use chert_store::{Store, StoreOptions};

use crate::QueueError;

/// Reserved key of the genesis record; counters start at 1 so no item can
/// collide with it.
const GENESIS_KEY: [u8; 16] = [0u8; 16];

/// Serialised genesis length: counter (16) plus five u64 fields.
const GENESIS_LENGTH: usize = 56;

/// Queue-level counters held in the genesis record.
///
/// `low_water_mark` is session-relative: it resets to the recovered size on
/// open. `high_water_mark` and the totals persist for the life of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Counter the next `put` will use.
    pub next_counter: u128,
    /// Items ever put.
    pub total_put_count: u64,
    /// Items ever taken.
    pub total_take_count: u64,
    /// Items currently queued.
    pub current_size: u64,
    /// Largest `current_size` ever observed.
    pub high_water_mark: u64,
    /// Smallest `current_size` observed since open.
    pub low_water_mark: u64,
}

impl Default for QueueStats {
    fn default() -> Self {
        Self {
            next_counter: 1,
            total_put_count: 0,
            total_take_count: 0,
            current_size: 0,
            high_water_mark: 0,
            low_water_mark: 0,
        }
    }
}

impl QueueStats {
    fn encode(&self) -> [u8; GENESIS_LENGTH] {
        let mut buf = [0u8; GENESIS_LENGTH];
        buf[0..16].copy_from_slice(&self.next_counter.to_be_bytes());
        buf[16..24].copy_from_slice(&self.total_put_count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.total_take_count.to_le_bytes());
        buf[32..40].copy_from_slice(&self.current_size.to_le_bytes());
        buf[40..48].copy_from_slice(&self.high_water_mark.to_le_bytes());
        buf[48..56].copy_from_slice(&self.low_water_mark.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self, QueueError> {
        if buf.len() != GENESIS_LENGTH {
            return Err(QueueError::GenesisCorrupt {
                len: buf.len(),
                expected: GENESIS_LENGTH,
            });
        }
        Ok(Self {
            next_counter: u128::from_be_bytes(buf[0..16].try_into().expect("16-byte slice")),
            total_put_count: u64::from_le_bytes(buf[16..24].try_into().expect("8-byte slice")),
            total_take_count: u64::from_le_bytes(buf[24..32].try_into().expect("8-byte slice")),
            current_size: u64::from_le_bytes(buf[32..40].try_into().expect("8-byte slice")),
            high_water_mark: u64::from_le_bytes(buf[40..48].try_into().expect("8-byte slice")),
            low_water_mark: u64::from_le_bytes(buf[48..56].try_into().expect("8-byte slice")),
        })
    }
}

/// Big-endian counter key, so lexicographic and numeric order agree.
fn key_for(counter: u128) -> [u8; 16] {
    debug_assert_ne!(counter, 0, "counter 0 is the genesis key");
    counter.to_be_bytes()
}

/// FIFO queue over a single store file.
///
/// The queue owns its store; all operations take `&mut self`, so the
/// store's exclusive-receiver rule serialises every producer and consumer
/// naturally.
#[derive(Debug)]
pub struct Queue {
    store: Store,
    /// Counters of queued items, ascending.
    pending: BTreeSet<u128>,
    stats: QueueStats,
}

impl Queue {
    /// Opens or creates a queue file.
    ///
    /// `max_key_length` in the options is overridden: queue keys are
    /// 16-byte counters. On reopen the genesis record is read, the keys are
    /// scanned, and the ordering is rebuilt; counters the genesis does not
    /// yet account for (a crash hit between an item write and the genesis
    /// rewrite) are reconciled and logged.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, QueueError> {
        let read_only = options.access.is_read_only();
        let options = StoreOptions {
            max_key_length: 16,
            ..options
        };
        let mut store = Store::open(path, options)?;

        let mut stats = if store.exists(&GENESIS_KEY)? {
            QueueStats::decode(&store.read(&GENESIS_KEY)?)?
        } else if read_only {
            return Err(QueueError::MissingGenesis);
        } else {
            let fresh = QueueStats::default();
            store.insert(&GENESIS_KEY, &fresh.encode())?;
            fresh
        };

        let mut pending = BTreeSet::new();
        for key in store.keys()? {
            if key == GENESIS_KEY {
                continue;
            }
            if key.len() != 16 {
                return Err(QueueError::ForeignKey { len: key.len() });
            }
            let counter = u128::from_be_bytes(key[..].try_into().expect("16-byte key"));
            pending.insert(counter);
        }

        // Reconcile after a crash between item writes and the genesis write
        let mut healed = false;
        if let Some(&max) = pending.iter().next_back() {
            if max >= stats.next_counter {
                stats.next_counter = max + 1;
                healed = true;
            }
        }
        let size = pending.len() as u64;
        if stats.current_size != size {
            stats.current_size = size;
            stats.high_water_mark = stats.high_water_mark.max(size);
            healed = true;
        }
        stats.low_water_mark = size;

        if healed {
            tracing::warn!(
                next_counter = %stats.next_counter,
                size,
                "reconciled queue genesis after unclean shutdown"
            );
            if !read_only {
                store.update(&GENESIS_KEY, &stats.encode())?;
            }
        }

        tracing::info!(size, next_counter = %stats.next_counter, "opened queue");
        Ok(Self {
            store,
            pending,
            stats,
        })
    }

    /// Appends one item; returns the counter it was stored under.
    pub fn put(&mut self, value: &[u8]) -> Result<u128, QueueError> {
        let counter = self.stats.next_counter;
        self.put_batch(&[value])?;
        Ok(counter)
    }

    /// Appends a batch of items atomically with respect to recovery.
    ///
    /// Every item record is durably written before the genesis record is
    /// rewritten, so a crash mid-batch is healed on reopen rather than
    /// surfacing a genesis that references missing items.
    pub fn put_batch<V: AsRef<[u8]>>(&mut self, values: &[V]) -> Result<(), QueueError> {
        if values.is_empty() {
            return Ok(());
        }

        let mut stats = self.stats;
        for value in values {
            let counter = stats.next_counter;
            self.store.insert(&key_for(counter), value.as_ref())?;
            self.pending.insert(counter);
            stats.next_counter += 1;
            stats.total_put_count += 1;
            stats.current_size += 1;
        }
        stats.high_water_mark = stats.high_water_mark.max(stats.current_size);

        // Genesis last
        self.persist_stats(stats)?;
        tracing::debug!(count = values.len(), size = self.stats.current_size, "put batch");
        Ok(())
    }

    /// Removes and returns the oldest item, or `None` when empty.
    pub fn take(&mut self) -> Result<Option<Vec<u8>>, QueueError> {
        let Some(&counter) = self.pending.iter().next() else {
            return Ok(None);
        };
        let key = key_for(counter);
        let value = self.store.read(&key)?;
        self.store.delete(&key)?;
        self.pending.remove(&counter);

        let mut stats = self.stats;
        stats.total_take_count += 1;
        stats.current_size -= 1;
        stats.low_water_mark = stats.low_water_mark.min(stats.current_size);
        self.persist_stats(stats)?;
        Ok(Some(value))
    }

    /// Returns the oldest item without removing it.
    pub fn peek(&mut self) -> Result<Option<Vec<u8>>, QueueError> {
        let Some(&counter) = self.pending.iter().next() else {
            return Ok(None);
        };
        Ok(Some(self.store.read(&key_for(counter))?))
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Current queue-level counters.
    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Flushes the underlying store.
    pub fn fsync(&mut self) -> Result<(), QueueError> {
        self.store.fsync()?;
        Ok(())
    }

    /// Closes the underlying store. Idempotent.
    pub fn close(&mut self) -> Result<(), QueueError> {
        self.store.close()?;
        Ok(())
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }

    /// Rewrites the genesis record, then adopts the new counters.
    fn persist_stats(&mut self, stats: QueueStats) -> Result<(), QueueError> {
        self.store.update(&GENESIS_KEY, &stats.encode())?;
        self.stats = stats;
        Ok(())
    }
}

#[cfg(test)]
mod codec_tests {
    use super::*;

    #[test]
    fn stats_roundtrip() {
        let stats = QueueStats {
            next_counter: u128::from(u64::MAX) + 17,
            total_put_count: 1000,
            total_take_count: 900,
            current_size: 100,
            high_water_mark: 250,
            low_water_mark: 3,
        };
        assert_eq!(QueueStats::decode(&stats.encode()).unwrap(), stats);
    }

    #[test]
    fn truncated_stats_are_rejected() {
        let err = QueueStats::decode(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, QueueError::GenesisCorrupt { len: 20, .. }));
    }

    #[test]
    fn counter_keys_sort_like_counters() {
        let low = key_for(1);
        let mid = key_for(u128::from(u64::MAX));
        let high = key_for(u128::from(u64::MAX) + 1);
        assert!(low < mid && mid < high);
    }
}
