//! Index Log Module
//!
//! Durability for key -> page-list assignments and the source of truth for
//! rebuilding in-memory state on open.
//!
//! ## Responsibilities
//! - Append one line per store, after the value's pages are written
//! - Replay the log on open to rebuild the trie and the free-page set
//! - Rewrite the log from a snapshot to drop superseded lines (compaction)
//!
//! ## File Format
//! ```text
//! index.log (newline-delimited JSON, one object per store)
//! {"key":"oha","size":4,"pages":[0],"crc":<crc32>}
//! {"key":"oha","size":3,"pages":[1],"crc":<crc32>}
//! ...
//! ```
//! `crc` covers key, size and pages. Legacy lines `key size p0 p1 ...` are
//! accepted on read but never written.
//!
//! ## Corruption Policy
//! A line that fails to parse is a torn write if nothing but blank lines
//! follows it: it is cut off and replay continues. Anywhere else it is
//! corruption and the open fails.

mod compactor;
mod entry;
mod reader;
mod recovery;
mod writer;

pub use compactor::LogCompactor;
pub use entry::LogEntry;
pub use reader::LogReader;
pub use recovery::{LogRecovery, RecoveryResult};
pub use writer::LogWriter;
