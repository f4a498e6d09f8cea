//! Cached Mapping Table: a bounded LRU over regular (non-inline) mapping
//! entries. Cached entries are independent copies of the entries TPs own;
//! `update_data_page` is how the GC keeps them in sync after a data-page
//! relocation.
use std::collections::VecDeque;

use crate::{
    flash::PageId,
    mapping::{KeyHash, MappingEntry},
};

#[derive(Debug)]
pub struct Cmt {
    capacity: usize,
    /// Most-recently-used at the back, least-recently-used at the front.
    order:    VecDeque<KeyHash>,
    entries:  std::collections::HashMap<KeyHash, MappingEntry>,
}

impl Cmt {
    pub fn new(capacity: usize) -> Self {
        Cmt {
            capacity: capacity.max(1),
            order:    VecDeque::new(),
            entries:  std::collections::HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn touch(
        &mut self,
        key_hash: KeyHash,
    ) {
        if let Some(pos) = self.order.iter().position(|k| *k == key_hash) {
            self.order.remove(pos);
        }
        self.order.push_back(key_hash);
    }

    /// Moves `key_hash` to the MRU end and returns the cached entry, if any.
    pub fn lookup(
        &mut self,
        key_hash: KeyHash,
    ) -> Option<&MappingEntry> {
        if self.entries.contains_key(&key_hash) {
            self.touch(key_hash);
            self.entries.get(&key_hash)
        } else {
            None
        }
    }

    /// No-op for inline entries — the CMT never caches them. Evicts from the
    /// LRU end while at capacity, then places the entry at the MRU end.
    pub fn insert(
        &mut self,
        key_hash: KeyHash,
        entry: MappingEntry,
    ) {
        if entry.is_inline {
            return;
        }
        if !self.entries.contains_key(&key_hash) && self.entries.len() >= self.capacity {
            if let Some(victim) = self.order.pop_front() {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(key_hash, entry);
        self.touch(key_hash);
    }

    pub fn invalidate(
        &mut self,
        key_hash: KeyHash,
    ) {
        if self.entries.remove(&key_hash).is_some() {
            if let Some(pos) = self.order.iter().position(|k| *k == key_hash) {
                self.order.remove(pos);
            }
        }
    }

    /// Rewrites `data_page_id` for every cached regular entry pointing at
    /// `old`. Called by the GC during data-page relocation.
    pub fn update_data_page(
        &mut self,
        old: PageId,
        new: PageId,
    ) {
        let old = old as i64;
        let new = new as i64;
        for entry in self.entries.values_mut() {
            if !entry.is_inline && entry.data_page_id == old {
                entry.data_page_id = new;
            }
        }
    }
}
