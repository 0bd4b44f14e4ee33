//! DB Module
//!
//! The store handle that coordinates the page store, the index log and the
//! trie.
//!
//! ## Responsibilities
//! - Acquire the directory exclusively and rebuild state from the log on open
//! - Store: pages first, then the log line, then the trie swap
//! - Fetch and ordered range over current values
//! - Compaction, explicit sync, and deterministic release on close/drop

use std::fmt;
use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, info, info_span, warn, Span};

use crate::config::Config;
use crate::error::{LodeError, Result};
use crate::log::{LogCompactor, LogEntry, LogRecovery, LogWriter};
use crate::page::{PageId, PageStore, Record};
use crate::trie::Trie;

/// An open store
///
/// ## Concurrency Model: Reader-Writer
///
/// - **Writes** (store/optimize): take `inner` for writing. They are the only
///   code paths that mutate the trie, so trie contents change in the same
///   order as the log.
///
/// - **Reads** (fetch, `Pair::fetch`): take `inner` for reading and resolve
///   the key in the trie *and* copy its pages under that lock. Readers run in
///   parallel; none can see pages a writer is in the middle of recycling.
///
/// - **Range**: walks the trie without the DB lock (each node is snapshotted
///   under its own lock). Order is always ascending; writes that land during
///   the walk may or may not be seen.
///
/// - **Size**: the trie's atomic count, no lock.
pub struct Db {
    /// Store configuration
    config: Config,

    /// Span entered by every operation on this handle
    span: Span,

    /// Key -> record index, mutated only under `inner`'s write lock
    trie: Trie<Record>,

    /// Page store and log writer
    inner: RwLock<Inner>,
}

struct Inner {
    pages: PageStore,
    log: LogWriter,
    /// Set once `close` has flushed and unlocked
    closed: bool,
}

impl Db {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const DATA_FILENAME: &'static str = "data.db";
    const LOG_FILENAME: &'static str = "index.log";

    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Create the data directory if missing
    /// 2. Open and exclusively lock the data file, sizing it if new, and map it
    /// 3. Replay the index log into the trie and the free-page set
    /// 4. Cut off a torn final log line, if any
    /// 5. Compact the log if replay found too much superseded history
    pub fn open(config: Config) -> Result<Self> {
        match config.dispatch.clone() {
            Some(dispatch) => {
                tracing::dispatcher::with_default(&dispatch, || Self::open_scoped(config))
            }
            None => Self::open_scoped(config),
        }
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    fn open_scoped(config: Config) -> Result<Self> {
        config.validate()?;

        let span = info_span!("lodekv", dir = %config.data_dir.display());
        let scope = span.clone();
        scope.in_scope(move || {
            let dir = config.data_dir.clone();
            fs::create_dir_all(&dir).map_err(|source| LodeError::Open {
                path: dir.clone(),
                source,
            })?;

            let mut pages = PageStore::open(
                &dir.join(Self::DATA_FILENAME),
                config.page_size,
                config.initial_data_size,
            )?
            .with_size_limit(config.max_data_size);
            let mut log = LogWriter::open(&dir.join(Self::LOG_FILENAME))?;

            let trie = Trie::new();
            let recovery =
                LogRecovery::replay(log.path(), &trie, pages.capacity(), pages.page_size())?;

            if recovery.torn_tail {
                log.truncate(recovery.valid_len)?;
            }
            log.ensure_trailing_newline()?;

            let needs_compaction = config.auto_compact && recovery.needs_compaction();
            info!(
                scanned = recovery.entries_scanned,
                keys = recovery.distinct_keys,
                free_pages = recovery.free_pages.len(),
                next_page = recovery.next_page,
                "rewind done"
            );
            pages.restore(recovery.next_page, recovery.free_pages);

            let db = Self {
                config,
                span,
                trie,
                inner: RwLock::new(Inner {
                    pages,
                    log,
                    closed: false,
                }),
            };

            if needs_compaction {
                let mut inner = db.inner.write();
                db.optimize_locked(&mut inner)?;
                drop(inner);
            }

            Ok(db)
        })
    }

    /// Run `f` inside this handle's span, with its dispatcher if it has one
    fn scoped<R>(&self, f: impl FnOnce() -> R) -> R {
        let _enter = self.span.enter();
        match &self.config.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Store `value` under `key`, replacing any previous value
    ///
    /// Steps:
    /// 1. Acquire the write lock
    /// 2. Allocate pages (reusing freed ones, growing the file if needed)
    /// 3. Copy the value into the pages
    /// 4. Append the log line
    /// 5. Swap the trie entry and free the replaced record's pages
    ///
    /// If step 3 or 4 fails the new pages go straight back to the free list
    /// and the previous value stays current.
    pub fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        self.scoped(|| {
            let mut inner = self.inner.write();
            let inner = &mut *inner;

            let pages = inner.pages.allocate_for(value.len())?;
            if let Err(e) = inner.pages.write(&pages, value) {
                inner.pages.free(&pages);
                return Err(e);
            }

            let record = Record::new(value.len() as u64, pages);
            if let Err(e) = inner.log.append(&LogEntry::new(key, &record)) {
                inner.pages.free(&record.pages);
                return Err(e);
            }

            debug!(key, size = record.size, pages = ?record.pages, "stored");
            if let Some(old) = self.trie.put(key.as_bytes(), record) {
                inner.pages.free(&old.pages);
            }
            Ok(())
        })
    }

    /// Get the value stored under `key`
    ///
    /// Returns `Ok(None)` if the key was never stored. A stored empty value
    /// comes back as `Ok(Some(vec![]))`.
    pub fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.scoped(|| {
            let inner = self.inner.read();
            match self.trie.get(key.as_bytes()) {
                Some(record) => inner.pages.read(record.size, &record.pages).map(Some),
                None => {
                    debug!(key, "not found");
                    Ok(None)
                }
            }
        })
    }

    /// Visit every key in ascending byte order
    ///
    /// `f` gets a `Pair` whose value is only copied out if `Pair::fetch` is
    /// called. Return `ControlFlow::Break(())` to stop early (the call still
    /// succeeds); an error from `f` stops the walk and is returned.
    pub fn range<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Pair<'_>) -> Result<ControlFlow<()>>,
    {
        self.scoped(|| {
            self.trie.range(|key, record| {
                let key = String::from_utf8(key.to_vec())
                    .map_err(|e| LodeError::Storage(format!("non UTF-8 key in index: {}", e)))?;
                f(Pair {
                    db: self,
                    key,
                    size: record.size,
                })
            })
        })
    }

    /// Number of live keys
    pub fn size(&self) -> usize {
        self.trie.count()
    }

    /// Rewrite the log with exactly one line per live key
    ///
    /// Holds the write lock throughout; readers and writers wait.
    pub fn optimize(&self) -> Result<()> {
        self.scoped(|| {
            let mut inner = self.inner.write();
            self.optimize_locked(&mut inner)
        })
    }

    fn optimize_locked(&self, inner: &mut Inner) -> Result<()> {
        let started = Instant::now();
        let before = inner.log.len();

        // The new log must not point at pages whose bytes are still in flight
        inner.pages.flush()?;

        let mut compactor = LogCompactor::create(inner.log.path())?;
        self.trie.range(|key, record| {
            let key = std::str::from_utf8(key)
                .map_err(|e| LodeError::Storage(format!("non UTF-8 key in index: {}", e)))?;
            compactor.push(&LogEntry::new(key, record))?;
            Ok::<_, LodeError>(ControlFlow::Continue(()))
        })?;
        let entries = compactor.entries();
        match compactor.commit() {
            Ok(log) => inner.log = log,
            Err(e) => {
                // The rename may have gone through; never keep appending to a
                // file that is no longer `index.log`
                let path = inner.log.path().to_path_buf();
                inner.log = LogWriter::open(&path)?;
                return Err(e);
            }
        }

        info!(
            entries,
            before_bytes = before,
            after_bytes = inner.log.len(),
            elapsed = ?started.elapsed(),
            "optimized log"
        );
        Ok(())
    }

    /// Flush mapped pages and the log to disk
    ///
    /// Stores are only guaranteed to survive a crash once this (or `close`)
    /// has returned.
    pub fn sync(&self) -> Result<()> {
        self.scoped(|| {
            let inner = self.inner.read();
            inner.pages.flush()?;
            inner.log.sync()
        })
    }

    /// Close the store: flush, release the directory lock, unmap
    pub fn close(self) -> Result<()> {
        self.scoped(|| {
            let mut inner = self.inner.write();
            inner.pages.flush()?;
            inner.log.sync()?;
            inner.pages.unlock()?;
            inner.closed = true;
            info!("closed");
            Ok(())
        })
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Snapshot of key and page accounting
    pub fn stats(&self) -> DbStats {
        let inner = self.inner.read();
        let pages = &inner.pages;
        DbStats {
            keys: self.trie.count(),
            free_pages: pages.free_pages().len(),
            next_page: pages.next_page(),
            capacity_pages: pages.capacity(),
            data_bytes: pages.mapped_len() as u64,
            log_bytes: inner.log.len(),
        }
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Path of the index log
    pub fn log_path(&self) -> PathBuf {
        self.config.data_dir.join(Self::LOG_FILENAME)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        let _enter = self.span.enter();
        let inner = self.inner.get_mut();
        if inner.closed {
            return;
        }
        if let Err(e) = inner.pages.flush().and_then(|_| inner.log.sync()) {
            warn!(error = %e, "flush on drop failed");
        }
        if let Err(e) = inner.pages.unlock() {
            warn!(error = %e, "unlock on drop failed");
        }
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Db({} at {})", self.stats(), self.config.data_dir.display())
    }
}

/// A key met during `Db::range`, with its value fetched on demand
pub struct Pair<'a> {
    db: &'a Db,
    key: String,
    size: u64,
}

impl<'a> Pair<'a> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Value size when the key was visited
    ///
    /// Not refreshed: if the key is stored again before `fetch` is called,
    /// `fetch` returns the new value and its length can differ from this.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Copy out the key's current value
    ///
    /// The key is looked up again under the read lock, so the pages read are
    /// always the ones the key owns right now.
    pub fn fetch(&self) -> Result<Vec<u8>> {
        self.db.fetch(&self.key)?.ok_or(LodeError::KeyNotFound)
    }
}

impl fmt::Debug for Pair<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pair")
            .field("key", &self.key)
            .field("size", &self.size)
            .finish()
    }
}

/// Key and page accounting of an open store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbStats {
    /// Live keys
    pub keys: usize,

    /// Pages below `next_page` waiting for reuse
    pub free_pages: usize,

    /// First page never handed out
    pub next_page: PageId,

    /// Pages the data file can hold
    pub capacity_pages: PageId,

    /// Size of the data file
    pub data_bytes: u64,

    /// Size of the index log
    pub log_bytes: u64,
}

impl DbStats {
    /// Pages at or above `next_page`
    pub fn unallocated_pages(&self) -> u64 {
        self.capacity_pages - self.next_page
    }

    /// Pages owned by live records
    pub fn used_pages(&self) -> u64 {
        self.next_page - self.free_pages as u64
    }
}

impl fmt::Display for DbStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{} keys, {}+{} free pages, {} bytes data}}",
            self.keys,
            self.free_pages,
            self.unallocated_pages(),
            self.data_bytes
        )
    }
}
