//! Queue error types.

use chert_store::StoreError;

/// Errors from the FIFO overlay.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Failure in the underlying record store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The genesis record does not decode.
    #[error("genesis record is {len} bytes, expected {expected}")]
    GenesisCorrupt { len: usize, expected: usize },

    /// The store holds a key that is not a 16-byte counter.
    #[error("queue store contains a foreign key of {len} bytes")]
    ForeignKey { len: usize },

    /// A read-only open found no genesis record to recover from.
    #[error("read-only queue file has no genesis record")]
    MissingGenesis,
}
