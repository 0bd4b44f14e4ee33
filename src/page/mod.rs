//! Page Module
//!
//! Fixed-size page arena over a memory-mapped data file.
//!
//! ## Responsibilities
//! - Hand out and reclaim page indices
//! - Grow the data file by doubling when pages run out
//! - Copy values into and out of the mapped pages
//!
//! ## File Layout
//! ```text
//! data.db
//! ┌──────────┬──────────┬──────────┬─────┬──────────────┐
//! │ page 0   │ page 1   │ page 2   │ ... │ page max - 1 │
//! └──────────┴──────────┴──────────┴─────┴──────────────┘
//!  offset of page p = p * page_size
//! ```
//!
//! Pages are always addressed by index, never by pointer, so a remap during
//! growth leaves every record valid.

mod bitmap;
mod store;

pub use bitmap::PageBitmap;
pub use store::PageStore;

/// Index of a page in the data file
pub type PageId = u64;

/// Where a value lives: its byte size and the ordered pages holding it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Value length in bytes
    pub size: u64,

    /// Pages in value order; only the last one may be partially used
    pub pages: Vec<PageId>,
}

impl Record {
    pub fn new(size: u64, pages: Vec<PageId>) -> Self {
        Self { size, pages }
    }

    /// Number of pages needed for `size` bytes
    pub fn pages_for(size: u64, page_size: usize) -> usize {
        size.div_ceil(page_size as u64) as usize
    }

    /// Whether the page list has exactly the length `size` requires
    pub fn is_consistent(&self, page_size: usize) -> bool {
        self.pages.len() == Self::pages_for(self.size, page_size)
    }
}
