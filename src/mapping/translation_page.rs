//! A flash-page-sized container of mapping frames.
use std::collections::BTreeMap;

use super::{KeyHash, MappingEntry};
use crate::flash::PageId;

/// Holds `key_hash -> MappingEntry` for the frames that live in one flash
/// page. A `BTreeMap` keeps iteration order stable (by `KeyHash`), which is
/// what makes `evict_one_inline`'s "first entry encountered" rule
/// deterministic and reproducible.
#[derive(Debug, Clone)]
pub struct TranslationPage {
    entries:        BTreeMap<KeyHash, MappingEntry>,
    used_frames:    usize,
    num_inline:     usize,
    total_frames:   usize,
    /// Set via `Flash::allocate_page` on materialization; no write is
    /// charged until the first PUT actually persists the page.
    flash_page_id:  Option<PageId>,
}

impl TranslationPage {
    pub fn new(total_frames: usize) -> Self {
        TranslationPage {
            entries: BTreeMap::new(),
            used_frames: 0,
            num_inline: 0,
            total_frames,
            flash_page_id: None,
        }
    }

    pub fn flash_page_id(&self) -> Option<PageId> {
        self.flash_page_id
    }

    pub fn set_flash_page_id(
        &mut self,
        pid: PageId,
    ) {
        self.flash_page_id = Some(pid);
    }

    pub fn used_frames(&self) -> usize {
        self.used_frames
    }

    pub fn num_inline(&self) -> usize {
        self.num_inline
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn free_frames(&self) -> usize {
        self.total_frames.saturating_sub(self.used_frames)
    }

    pub fn utilization(&self) -> f64 {
        self.used_frames as f64 / self.total_frames as f64
    }

    pub fn inline_ratio(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.num_inline as f64 / self.entries.len() as f64
        }
    }

    pub fn has_space(
        &self,
        frames: usize,
    ) -> bool {
        self.free_frames() >= frames
    }

    pub fn find(
        &self,
        key_hash: KeyHash,
    ) -> Option<&MappingEntry> {
        self.entries.get(&key_hash)
    }

    pub fn entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.values()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut MappingEntry> {
        self.entries.values_mut()
    }

    /// Replace-in-place if `key_hash` is already present, else insert fresh.
    /// `used_frames`/`num_inline` are updated as a single signed delta so the
    /// replace is atomic from an observer's viewpoint — there is no
    /// intermediate state where the old entry has been removed but the new
    /// one not yet accounted for.
    pub fn insert(
        &mut self,
        entry: MappingEntry,
    ) {
        let key_hash = entry.key_hash;
        let new_inline = entry.is_inline as i64;
        let new_frames = entry.frames_used as i64;

        let (old_inline, old_frames) = match self.entries.insert(key_hash, entry) {
            Some(old) => (old.is_inline as i64, old.frames_used as i64),
            None => (0, 0),
        };

        self.used_frames = (self.used_frames as i64 + new_frames - old_frames) as usize;
        self.num_inline = (self.num_inline as i64 + new_inline - old_inline) as usize;
    }

    pub fn remove(
        &mut self,
        key_hash: KeyHash,
    ) -> Option<MappingEntry> {
        let removed = self.entries.remove(&key_hash)?;
        self.used_frames -= removed.frames_used;
        if removed.is_inline {
            self.num_inline -= 1;
        }
        Some(removed)
    }

    /// Removes any one inline entry. Selection is unordered per the spec but
    /// must be deterministic given insertion order: this picks the first
    /// inline entry in `BTreeMap` key order.
    pub fn evict_one_inline(&mut self) -> Option<MappingEntry> {
        let victim = self.entries.values().find(|e| e.is_inline).map(|e| e.key_hash)?;
        self.remove(victim)
    }

    /// Same as [`Self::evict_one_inline`], but never picks `exclude` — used
    /// when making room for an overwrite of `exclude` itself, so the
    /// eviction can't target the very entry being replaced.
    pub fn evict_one_inline_excluding(
        &mut self,
        exclude: KeyHash,
    ) -> Option<MappingEntry> {
        let victim = self.entries.values().find(|e| e.is_inline && e.key_hash != exclude).map(|e| e.key_hash)?;
        self.remove(victim)
    }
}
