//! Log Recovery
//!
//! Rebuilds the trie and the free-page set by replaying the index log.

use std::path::Path;

use crate::error::{LodeError, Result};
use crate::page::{PageBitmap, PageId, Record};
use crate::trie::Trie;

use super::LogReader;

/// Replays the index log
pub struct LogRecovery;

/// Result of a replay
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    /// Entries read, superseded ones included
    pub entries_scanned: u64,

    /// Keys in the trie after replay
    pub distinct_keys: usize,

    /// First page no record references or ever referenced
    pub next_page: PageId,

    /// Pages below `next_page` that no live record uses, ascending
    pub free_pages: Vec<PageId>,

    /// Whether a torn final line was found
    pub torn_tail: bool,

    /// Length of the log up to the last good line
    pub valid_len: u64,
}

impl RecoveryResult {
    /// Whether superseded lines outweigh live ones enough to rewrite the log
    pub fn needs_compaction(&self) -> bool {
        self.entries_scanned > self.distinct_keys as u64 * 3 / 2 + 10
    }
}

impl LogRecovery {
    /// Replay the log at `path` into `trie`
    ///
    /// This will:
    /// 1. Read every entry in file order; the last one for a key wins
    /// 2. Track which pages live records use (superseded records release theirs)
    /// 3. Advance the allocation frontier past every page seen
    /// 4. Report every unused page below the frontier as free
    ///
    /// `page_count` is the capacity of the data file; an entry pointing past
    /// it, or whose page list doesn't match its size, is corruption.
    pub fn replay(
        path: &Path,
        trie: &Trie<Record>,
        page_count: PageId,
        page_size: usize,
    ) -> Result<RecoveryResult> {
        let mut reader = LogReader::open(path)?;
        let mut used = PageBitmap::new(page_count);
        let mut next_page: PageId = 0;
        let mut entries_scanned = 0u64;

        while let Some(entry) = reader.next_entry()? {
            entries_scanned += 1;
            let (key, record) = entry.into_parts();

            let corruption = |reason: String| LodeError::LogCorruption {
                path: path.to_path_buf(),
                line: reader.line(),
                reason,
            };

            if !record.is_consistent(page_size) {
                return Err(corruption(format!(
                    "key {:?}: {} pages for {} bytes",
                    key,
                    record.pages.len(),
                    record.size
                )));
            }
            if let Some(page) = record.pages.iter().find(|&&page| page >= page_count) {
                return Err(corruption(format!(
                    "key {:?}: page {} beyond data file ({} pages)",
                    key, page, page_count
                )));
            }

            for &page in &record.pages {
                if page >= next_page {
                    next_page = page + 1;
                }
            }

            if let Some(old) = trie.put(key.as_bytes(), record.clone()) {
                for &page in &old.pages {
                    used.clear(page);
                }
            }
            for &page in &record.pages {
                used.set(page);
            }
        }

        Ok(RecoveryResult {
            entries_scanned,
            distinct_keys: trie.count(),
            next_page,
            free_pages: used.unused_below(next_page).collect(),
            torn_tail: reader.torn_tail(),
            valid_len: reader.valid_len(),
        })
    }

    /// Replay into a scratch trie to check a log without opening the store
    pub fn verify(path: &Path, page_count: PageId, page_size: usize) -> Result<RecoveryResult> {
        let trie = Trie::new();
        Self::replay(path, &trie, page_count, page_size)
    }
}
