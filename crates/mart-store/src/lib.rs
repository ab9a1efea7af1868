//! # mart-store
//!
//! SQLite-backed [`DurabilitySink`](mart_core::DurabilitySink) for mart.
//!
//! Every buffered message is one row keyed by `(channel, id)`, where `id` is
//! the message marker. Rows evicted from a channel's ring are deleted in the
//! same transaction that inserts their replacement, so the table mirrors the
//! in-memory buffers. At boot, [`SqliteSink::load`](mart_core::DurabilitySink::load)
//! purges expired rows and returns the rest for replay.

pub mod error;
pub mod sqlite;

pub use error::StoreError;
pub use sqlite::SqliteSink;
