//! Page Store
//!
//! Allocates pages out of the mapped data file and copies bytes in and out.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use fs2::FileExt;
use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, info};

use crate::error::{LodeError, Result};

use super::{PageId, Record};

/// Page arena over an exclusively locked, memory-mapped file
///
/// ## Allocation
/// - Reuse a freed page if there is one
/// - Otherwise take `next`, doubling the file first when `next == max`
///
/// Freed pages are never coalesced; the free list is an unordered multiset.
pub struct PageStore {
    /// Path of the data file (for error messages)
    path: PathBuf,

    /// Data file; holds the advisory lock for the store's lifetime
    file: File,

    /// Mapping of the whole data file
    mmap: MmapMut,

    page_size: usize,

    /// First page never handed out
    next: PageId,

    /// Capacity in pages
    max: PageId,

    /// Pages below `next` that can be reused
    free: Vec<PageId>,

    /// Most pages `grow` may extend the file to
    limit: Option<PageId>,
}

impl PageStore {
    /// Open (or create) the data file, lock it, and map it
    ///
    /// A file smaller than one page is sized to `initial_size` first. Fails
    /// with `Locked` if another handle already holds the file.
    pub fn open(path: &Path, page_size: usize, initial_size: u64) -> Result<Self> {
        let open_err = |source| LodeError::Open {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(open_err)?;

        file.try_lock_exclusive().map_err(|e| {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                LodeError::Locked {
                    path: path.to_path_buf(),
                }
            } else {
                open_err(e)
            }
        })?;

        let mut len = file.metadata().map_err(open_err)?.len();
        if len < page_size as u64 {
            file.set_len(initial_size).map_err(open_err)?;
            len = initial_size;
        }

        // SAFETY: the file is exclusively locked for as long as this store
        // lives, and only `grow` resizes it (after which it remaps).
        let mmap = unsafe { MmapOptions::new().map_mut(&file) }.map_err(open_err)?;
        let max = len / page_size as u64;

        debug!(path = %path.display(), bytes = len, pages = max, "mapped data file");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
            page_size,
            next: 0,
            max,
            free: Vec::new(),
            limit: None,
        })
    }

    /// Cap how large `grow` may make the data file (in bytes)
    ///
    /// A file already larger than the cap is left as is; it just never grows.
    pub fn with_size_limit(mut self, bytes: Option<u64>) -> Self {
        self.limit = bytes.map(|bytes| bytes / self.page_size as u64);
        self
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Hand out one page, growing the file if needed
    pub fn allocate(&mut self) -> Result<PageId> {
        if let Some(page) = self.free.pop() {
            return Ok(page);
        }
        if self.next == self.max {
            self.grow()?;
        }
        let page = self.next;
        self.next += 1;
        Ok(page)
    }

    /// Allocate the pages needed to hold `len` bytes
    ///
    /// If growth fails partway, the pages already taken go back to the free
    /// list before the error is returned.
    pub fn allocate_for(&mut self, len: usize) -> Result<Vec<PageId>> {
        let count = Record::pages_for(len as u64, self.page_size);
        let mut pages = Vec::with_capacity(count);
        for _ in 0..count {
            match self.allocate() {
                Ok(page) => pages.push(page),
                Err(e) => {
                    self.free(&pages);
                    return Err(e);
                }
            }
        }
        Ok(pages)
    }

    /// Return pages for later reuse
    pub fn free(&mut self, pages: &[PageId]) {
        self.free.extend_from_slice(pages);
    }

    /// Double the capacity: extend the file, then remap it
    ///
    /// Growth stops at the size limit, if one is set. Capacity is only
    /// updated once both steps succeeded.
    pub fn grow(&mut self) -> Result<()> {
        let started = Instant::now();
        let mut pages = self.max.saturating_mul(2).max(1);
        if let Some(limit) = self.limit {
            pages = pages.min(limit);
        }
        if pages <= self.max {
            return Err(LodeError::Grow {
                pages: self.max.saturating_add(1),
                source: io::Error::other("data file size limit reached"),
            });
        }
        let bytes = pages.checked_mul(self.page_size as u64).ok_or_else(|| LodeError::Grow {
            pages,
            source: io::Error::other("data file size overflows u64"),
        })?;

        self.file
            .set_len(bytes)
            .map_err(|source| LodeError::Grow { pages, source })?;

        // SAFETY: see `open`; the old mapping is dropped on assignment.
        let mmap = unsafe { MmapOptions::new().map_mut(&self.file) }
            .map_err(|source| LodeError::Grow { pages, source })?;
        self.mmap = mmap;
        self.max = pages;

        info!(
            path = %self.path.display(),
            pages,
            bytes,
            elapsed = ?started.elapsed(),
            "grew data file"
        );
        Ok(())
    }

    /// Install the allocation state rebuilt by log replay
    pub fn restore(&mut self, next: PageId, free: Vec<PageId>) {
        self.next = next;
        self.free = free;
    }

    // =========================================================================
    // Data Access
    // =========================================================================

    /// Copy `bytes` into `pages`, one page-sized chunk per page
    pub fn write(&mut self, pages: &[PageId], bytes: &[u8]) -> Result<()> {
        if pages.len() != Record::pages_for(bytes.len() as u64, self.page_size) {
            return Err(LodeError::Storage(format!(
                "{} bytes don't fit exactly in {} pages of {} bytes",
                bytes.len(),
                pages.len(),
                self.page_size
            )));
        }

        for (&page, chunk) in pages.iter().zip(bytes.chunks(self.page_size)) {
            let start = self.offset(page)?;
            self.mmap[start..start + chunk.len()].copy_from_slice(chunk);
        }
        Ok(())
    }

    /// Copy `size` bytes out of `pages`
    ///
    /// The last page is only read up to `size`.
    pub fn read(&self, size: u64, pages: &[PageId]) -> Result<Vec<u8>> {
        if pages.len() != Record::pages_for(size, self.page_size) {
            return Err(LodeError::Storage(format!(
                "{} pages can't hold exactly {} bytes",
                pages.len(),
                size
            )));
        }

        let mut out = Vec::with_capacity(size as usize);
        let mut remaining = size as usize;
        for &page in pages {
            let start = self.offset(page)?;
            let take = remaining.min(self.page_size);
            out.extend_from_slice(&self.mmap[start..start + take]);
            remaining -= take;
        }
        Ok(out)
    }

    /// Flush mapped pages to disk (msync)
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Release the advisory lock on the data file
    pub fn unlock(&self) -> Result<()> {
        FileExt::unlock(&self.file)?;
        Ok(())
    }

    fn offset(&self, page: PageId) -> Result<usize> {
        if page >= self.max {
            return Err(LodeError::Storage(format!(
                "page {} out of range (capacity {} pages)",
                page, self.max
            )));
        }
        Ok(page as usize * self.page_size)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Capacity in pages
    pub fn capacity(&self) -> PageId {
        self.max
    }

    /// First page never handed out
    pub fn next_page(&self) -> PageId {
        self.next
    }

    /// Pages waiting for reuse
    pub fn free_pages(&self) -> &[PageId] {
        &self.free
    }

    pub fn mapped_len(&self) -> usize {
        self.mmap.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
