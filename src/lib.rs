//! # LodeKV
//!
//! An embedded, single-directory key-value store for one exclusive writer
//! process:
//! - Values live in fixed-size pages of a memory-mapped data file
//! - An append-only index log records key -> page-list assignments
//! - An in-memory trie indexes keys for lookups and ordered iteration
//! - Crash recovery by replaying the log on open
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                            Db                               │
//! │        store / fetch / range / size / optimize / close      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!      ┌────────────────┼─────────────────────┐
//!      │                │                     │
//!      ▼                ▼                     ▼
//! ┌──────────┐   ┌─────────────┐       ┌─────────────┐
//! │   Trie   │   │  Index Log  │       │ Page Store  │
//! │ (index)  │   │ (index.log) │       │  (data.db)  │
//! └──────────┘   └─────────────┘       └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use lodekv::Db;
//!
//! let db = Db::open_path("./my_db".as_ref())?;
//! db.store("greeting", b"hello")?;
//! assert_eq!(db.fetch("greeting")?, Some(b"hello".to_vec()));
//! db.close()?;
//! # Ok::<(), lodekv::LodeError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod trie;
pub mod page;
pub mod log;
pub mod db;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LodeError, Result};
pub use config::Config;
pub use db::{Db, DbStats, Pair};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LodeKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
