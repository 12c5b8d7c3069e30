//! # chert-queue: FIFO queue overlay on the chert record store
//!
//! Items are stored as ordinary records keyed by a 128-bit monotonically
//! increasing counter, serialised big-endian so byte order equals numeric
//! order. A distinguished **genesis record** at the all-zero key carries the
//! queue-level counters.
//!
//! # Crash Consistency
//!
//! Every mutation writes item records first and rewrites the genesis record
//! last. After a crash between the two, reopening scans the keys, finds
//! items the genesis does not account for, and reconciles the counters; no
//! item is ever lost or double-issued.
//!
//! # Quick Start
//!
//! ```ignore
//! use chert_queue::Queue;
//! use chert_store::StoreOptions;
//!
//! let mut queue = Queue::open("queue.db", StoreOptions::default())?;
//! queue.put(b"first")?;
//! queue.put(b"second")?;
//! assert_eq!(queue.take()?.as_deref(), Some(&b"first"[..]));
//! ```

mod error;
mod queue;

pub use error::QueueError;
pub use queue::{Queue, QueueStats};

#[cfg(test)]
mod tests;
