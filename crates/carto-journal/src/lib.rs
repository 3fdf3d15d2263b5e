//! Durability for carto: an append-only journal of store mutations.
//!
//! Every mutation the server accepts is framed, checksummed, and appended
//! to a single journal file before the reply goes out. On startup the file
//! is replayed front-to-back to rebuild the store.
//!
//! # Key Types
//!
//! - [`Journal`]: the append/recover/rewrite handle over one journal file
//! - [`JournalEntry`]: one logged mutation with its tid and timestamp
//! - [`SyncMode`]: fsync after every append, or periodically
//! - [`JournalError`]: everything that can go wrong on the durability path

pub mod error;
pub mod journal;

pub use error::{JournalError, Result};
pub use journal::{Journal, JournalEntry, SyncMode};
