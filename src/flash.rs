//! Page-level flash emulation: occupancy + validity bitmaps, a sequential
//! allocator, and block erase. No key/value bytes are ever stored here —
//! only page ids, page kinds, and the two membership sets NAND semantics
//! require.
use std::collections::HashSet;

use crate::{
    deps::log::debug,
    error::Error,
    metrics::PageKind,
};

pub type PageId = usize;
pub type BlockId = usize;

#[derive(Debug)]
pub struct Flash {
    total_pages:     usize,
    pages_per_block: usize,
    /// Physically written pages, regardless of logical liveness.
    occupied:        HashSet<PageId>,
    /// Logically live pages; always a subset of `occupied`.
    valid:           HashSet<PageId>,
    page_type:       std::collections::HashMap<PageId, PageKind>,
    /// Rolling cursor for the sequential allocator.
    cursor:          PageId,
}

impl Flash {
    pub fn new(
        total_pages: usize,
        pages_per_block: usize,
    ) -> Self {
        Flash {
            total_pages,
            pages_per_block: pages_per_block.max(1),
            occupied: HashSet::new(),
            valid: HashSet::new(),
            page_type: std::collections::HashMap::new(),
            cursor: 0,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn total_blocks(&self) -> usize {
        (self.total_pages / self.pages_per_block).max(1)
    }

    pub fn utilization(&self) -> f64 {
        self.occupied.len() as f64 / self.total_pages as f64
    }

    pub fn is_valid(
        &self,
        pid: PageId,
    ) -> bool {
        self.valid.contains(&pid)
    }

    /// Sequential search from the rolling cursor for a page id not in
    /// `occupied`; wraps at `total_pages`. NAND semantics forbid reusing an
    /// occupied-but-invalid page without an erase first, so this never
    /// returns one.
    pub fn allocate_page(&mut self) -> Result<PageId, Error> {
        for _ in 0..self.total_pages {
            let candidate = self.cursor;
            self.cursor = (self.cursor + 1) % self.total_pages;
            if !self.occupied.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(Error::FlashFull)
    }

    pub fn write_page(
        &mut self,
        pid: PageId,
        kind: PageKind,
    ) {
        self.occupied.insert(pid);
        self.valid.insert(pid);
        self.page_type.insert(pid, kind);
    }

    /// No side effect besides the read-counter increment the caller
    /// performs; this method exists to document the read as an explicit
    /// flash access, not to model latency itself.
    pub fn read_page(
        &self,
        _pid: PageId,
        _kind: PageKind,
    ) {
    }

    /// Removes a page from the `valid` set only; the page remains
    /// `occupied` (and therefore un-reusable) until its block is erased.
    pub fn free_page(
        &mut self,
        pid: PageId,
    ) {
        self.valid.remove(&pid);
    }

    fn block_range(
        &self,
        bid: BlockId,
    ) -> std::ops::Range<PageId> {
        let start = bid * self.pages_per_block;
        let end = (start + self.pages_per_block).min(self.total_pages);
        start..end
    }

    pub fn valid_pages_in_block(
        &self,
        bid: BlockId,
    ) -> Vec<(PageId, PageKind)> {
        self.block_range(bid)
            .filter(|pid| self.valid.contains(pid))
            .map(|pid| (pid, self.page_type.get(&pid).copied().unwrap_or_default()))
            .collect()
    }

    pub fn invalid_count_in_block(
        &self,
        bid: BlockId,
    ) -> usize {
        self.block_range(bid)
            .filter(|pid| self.occupied.contains(pid) && !self.valid.contains(pid))
            .count()
    }

    /// Empties both `occupied` and `valid` across the block's contiguous
    /// page range. The only operation that increments `flash_erases`.
    pub fn erase_block(
        &mut self,
        bid: BlockId,
    ) {
        debug!("erasing block {}", bid);
        for pid in self.block_range(bid) {
            self.occupied.remove(&pid);
            self.valid.remove(&pid);
            self.page_type.remove(&pid);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_never_returns_an_occupied_page() {
        let mut flash = Flash::new(4, 2);
        let a = flash.allocate_page().unwrap();
        flash.write_page(a, PageKind::Data);
        let b = flash.allocate_page().unwrap();
        assert_ne!(a, b);
        flash.write_page(b, PageKind::Data);
        let c = flash.allocate_page().unwrap();
        let d = flash.allocate_page().unwrap();
        assert_ne!(c, d);
    }

    #[test]
    fn allocation_fails_when_full() {
        let mut flash = Flash::new(2, 2);
        let a = flash.allocate_page().unwrap();
        flash.write_page(a, PageKind::Data);
        let b = flash.allocate_page().unwrap();
        flash.write_page(b, PageKind::Data);
        assert!(matches!(flash.allocate_page(), Err(Error::FlashFull)));
    }

    #[test]
    fn free_page_keeps_it_occupied_until_erase() {
        let mut flash = Flash::new(2, 2);
        let a = flash.allocate_page().unwrap();
        flash.write_page(a, PageKind::Data);
        flash.free_page(a);
        assert!(!flash.is_valid(a));
        assert!(matches!(flash.allocate_page(), Ok(p) if p != a) || flash.total_pages() == 1);

        flash.erase_block(0);
        let reused = flash.allocate_page().unwrap();
        assert_eq!(reused, a);
    }

    #[test]
    fn erase_block_resets_occupancy_and_counts_as_one_erase() {
        let mut flash = Flash::new(4, 2);
        let a = flash.allocate_page().unwrap();
        flash.write_page(a, PageKind::Data);
        flash.erase_block(0);
        assert_eq!(flash.invalid_count_in_block(0), 0);
        assert_eq!(flash.valid_pages_in_block(0).len(), 0);
    }
}
