//! Burrow - embeddable ordered key-value storage
//!
//! This crate provides a single-writer, ordered key-value store backed by a
//! skip-list index and a write-ahead message log, with log compaction and
//! schema migrations over persisted records.
//!
//! # Components
//!
//! - [`Memtable`]: the store facade wiring index, log, compaction and
//!   migrations together
//! - [`SkipList`]: probabilistic ordered in-memory index
//! - [`MessageLog`]: append-only length-framed record log with replay on open
//! - [`Codec`] / [`Base64JsonCodec`]: pluggable value serialization with a
//!   canonical base64-over-JSON default
//!
//! # Example
//!
//! ```rust,ignore
//! use burrow::{Memtable, MemtableConfig};
//!
//! let config = MemtableConfig::new().with_data_dir("./data");
//! let table: Memtable<u64, String> = Memtable::open("users", config)?;
//!
//! table.set(1, "eins".to_string())?;
//! assert_eq!(table.get(&1), Some("eins".to_string()));
//!
//! // Entries come back in key order, survive a close, and the log is
//! // compacted in the background as records are superseded.
//! for (key, value) in table.entries() {
//!     println!("{key}: {value}");
//! }
//! table.close()?;
//! ```

#![deny(missing_docs)]

pub mod codec;
pub mod error;
pub mod memtable;
pub mod skiplist;
pub mod wal;

pub use codec::{Base64Codec, Base64JsonCodec, Codec, JsonCodec};
pub use error::{Result, StoreError};
pub use memtable::{Memtable, MemtableConfig, Migration, MigrationObject, MigrationRecord};
pub use skiplist::SkipList;
pub use wal::MessageLog;
