//! Page usage bitmap used while replaying the log.

use super::PageId;

/// Fixed-size set of page indices
#[derive(Debug, Clone)]
pub struct PageBitmap {
    words: Vec<u64>,
    len: u64,
}

impl PageBitmap {
    /// Bitmap covering pages `0..len`, all clear
    pub fn new(len: u64) -> Self {
        Self {
            words: vec![0; len.div_ceil(64) as usize],
            len,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mark `page` as used. `page` must be below `len()`.
    pub fn set(&mut self, page: PageId) {
        debug_assert!(page < self.len);
        self.words[(page / 64) as usize] |= 1 << (page % 64);
    }

    /// Mark `page` as unused. `page` must be below `len()`.
    pub fn clear(&mut self, page: PageId) {
        debug_assert!(page < self.len);
        self.words[(page / 64) as usize] &= !(1 << (page % 64));
    }

    pub fn contains(&self, page: PageId) -> bool {
        page < self.len && self.words[(page / 64) as usize] & (1 << (page % 64)) != 0
    }

    /// Clear pages in `0..limit`, ascending
    pub fn unused_below(&self, limit: PageId) -> impl Iterator<Item = PageId> + '_ {
        (0..limit.min(self.len)).filter(move |&page| !self.contains(page))
    }
}
