//! # chert-io: I/O backend abstraction for the chert record store
//!
//! This crate provides a uniform capability set over a single random-access
//! file, implemented by two concrete backends:
//!
//! - **[`DirectFile`]** (default): a positioned `std::fs::File` using
//!   `pread`/`pwrite`-style positional I/O
//! - **[`MappedFile`]**: a sequence of equal-sized `memmap2` chunks covering
//!   the whole file, republished as an immutable epoch on every resize
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │       chert-store        │
//! │ (uses StorageFile trait) │
//! └────────────┬─────────────┘
//!              │
//! ┌────────────┴─────────────┐
//! │         chert-io         │
//! │  ┌────────┐  ┌─────────┐ │
//! │  │ Direct │  │ Mapped  │ │
//! │  │  File  │  │  File   │ │
//! │  └────────┘  └─────────┘ │
//! └──────────────────────────┘
//! ```
//!
//! The store engine holds one [`FileBackend`] per instance; there is no
//! runtime backend registration.
//!
//! # Concurrency
//!
//! All operations take `&mut self`: the exclusive borrow is the
//! serialisation boundary. Callers that need to share a file across threads
//! must wrap the backend in their own lock.

mod direct;
mod error;
mod file;
mod mapped;

pub use direct::DirectFile;
pub use error::IoError;
pub use file::{Access, FileBackend, StorageFile};
pub use mapped::{DEFAULT_CHUNK_LENGTH, MappedFile};

#[cfg(test)]
mod tests;
