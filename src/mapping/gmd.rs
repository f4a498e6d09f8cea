//! Global Mapping Directory: a sparse map of translation pages over the
//! logical index space `[0, num_translation_pages)`, addressed by quadratic
//! probing over key hashes.
use std::collections::HashMap;

use super::{KeyHash, MappingEntry, TranslationPage};
use crate::{deps::log::debug, error::Error, flash::Flash};

pub type TpId = usize;

#[derive(Debug)]
pub struct Gmd {
    tps:              HashMap<TpId, TranslationPage>,
    num_translation_pages: usize,
    frames_per_tp:    usize,
    max_retry:        usize,
}

impl Gmd {
    pub fn new(
        num_translation_pages: usize,
        frames_per_tp: usize,
        max_retry: usize,
    ) -> Self {
        Gmd {
            tps: HashMap::new(),
            num_translation_pages,
            frames_per_tp,
            max_retry,
        }
    }

    /// `tp_id(k, r) = (k + r*r) mod N`.
    fn probe(
        &self,
        key_hash: KeyHash,
        r: usize,
    ) -> TpId {
        let n = self.num_translation_pages as u128;
        let k = key_hash.value() as u128;
        let r2 = (r as u128) * (r as u128);
        ((k + r2) % n) as TpId
    }

    pub fn tp(
        &self,
        tp_id: TpId,
    ) -> Option<&TranslationPage> {
        self.tps.get(&tp_id)
    }

    pub fn tp_mut(
        &mut self,
        tp_id: TpId,
    ) -> Option<&mut TranslationPage> {
        self.tps.get_mut(&tp_id)
    }

    /// The TP the first probe candidate (`r=0`) would land on, if
    /// materialized. Used to read ambient utilization/inline-ratio context
    /// before a placement decision is made, without committing to it.
    pub fn peek_primary_tp(
        &self,
        key_hash: KeyHash,
    ) -> Option<&TranslationPage> {
        let tp_id = self.probe(key_hash, 0);
        self.tps.get(&tp_id)
    }

    pub fn tps(&self) -> impl Iterator<Item = (&TpId, &TranslationPage)> {
        self.tps.iter()
    }

    pub fn tps_mut(&mut self) -> impl Iterator<Item = (&TpId, &mut TranslationPage)> {
        self.tps.iter_mut()
    }

    /// Materializes a TP at `tp_id` if absent, allocating its flash page id
    /// but charging no write until the first PUT persists it.
    fn materialize(
        &mut self,
        tp_id: TpId,
        flash: &mut Flash,
    ) -> Result<&mut TranslationPage, Error> {
        if !self.tps.contains_key(&tp_id) {
            let mut tp = TranslationPage::new(self.frames_per_tp);
            let flash_page_id = flash.allocate_page()?;
            tp.set_flash_page_id(flash_page_id);
            self.tps.insert(tp_id, tp);
        }
        Ok(self.tps.get_mut(&tp_id).expect("just materialized"))
    }

    /// Probes for `key_hash`, returning the first TP whose `find` hits.
    /// Stops early on an unmaterialized slot: no later probe could have
    /// placed an entry past a slot this same sequence skipped.
    pub fn find_entry(
        &self,
        key_hash: KeyHash,
    ) -> Option<(TpId, &MappingEntry)> {
        for r in 0..self.max_retry {
            let tp_id = self.probe(key_hash, r);
            let tp = self.tps.get(&tp_id)?;
            if let Some(entry) = tp.find(key_hash) {
                return Some((tp_id, entry));
            }
        }
        None
    }

    /// Same probe sequence as `find_entry`; materializes TPs as it goes and
    /// returns the first one that either already contains `key_hash`
    /// (overwrite path) or has room for `frames`.
    pub fn find_tp_for_insert(
        &mut self,
        key_hash: KeyHash,
        frames: usize,
        flash: &mut Flash,
    ) -> Result<Option<TpId>, Error> {
        for r in 0..self.max_retry {
            let tp_id = self.probe(key_hash, r);
            let tp = self.materialize(tp_id, flash)?;
            if tp.find(key_hash).is_some() || tp.has_space(frames) {
                return Ok(Some(tp_id));
            }
        }
        debug!(
            "quadratic probing exhausted {} retries for key_hash={:?} without finding space for {} frames",
            self.max_retry, key_hash, frames
        );
        Ok(None)
    }

    /// Finds the one TP whose persisted flash page id is `old` and rebinds
    /// it to `new`. Used by the GC's translation-page relocator.
    pub fn rebind_flash_page(
        &mut self,
        old: crate::flash::PageId,
        new: crate::flash::PageId,
    ) {
        if let Some(tp) = self.tps.values_mut().find(|tp| tp.flash_page_id() == Some(old)) {
            tp.set_flash_page_id(new);
        }
    }

    /// Rewrites `data_page_id` on every regular entry across all TPs whose
    /// `data_page_id == old`. Used by the GC's data-page relocator.
    pub fn rebind_data_page(
        &mut self,
        old: crate::flash::PageId,
        new: crate::flash::PageId,
    ) {
        let old = old as i64;
        let new = new as i64;
        for tp in self.tps.values_mut() {
            for entry in tp.entries_mut() {
                if !entry.is_inline && entry.data_page_id == old {
                    entry.data_page_id = new;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::compute_frames;

    fn flash() -> Flash {
        Flash::new(1024, 64)
    }

    #[test]
    fn probe_sequence_is_consistent_between_lookup_and_insert() {
        let mut gmd = Gmd::new(16, 512, 8);
        let mut flash = flash();
        let kh = KeyHash::new(3);
        let frames = compute_frames(12 + 8 + 4, 32);
        let tp_id = gmd.find_tp_for_insert(kh, frames, &mut flash).unwrap().unwrap();
        gmd.tps.get_mut(&tp_id).unwrap().insert(MappingEntry::inline(kh, 8, 4, 32));

        let (found_tp, entry) = gmd.find_entry(kh).unwrap();
        assert_eq!(found_tp, tp_id);
        assert_eq!(entry.key_hash, kh);
    }

    #[test]
    fn find_entry_returns_none_for_absent_key() {
        let gmd = Gmd::new(16, 512, 8);
        assert!(gmd.find_entry(KeyHash::new(99)).is_none());
    }

    #[test]
    fn rebind_data_page_updates_every_matching_regular_entry() {
        let mut gmd = Gmd::new(16, 512, 8);
        let mut flash = flash();
        let kh = KeyHash::new(5);
        let tp_id = gmd.find_tp_for_insert(kh, 1, &mut flash).unwrap().unwrap();
        gmd.tps.get_mut(&tp_id).unwrap().insert(MappingEntry::regular(kh, 8, 100, 7));

        gmd.rebind_data_page(7, 42);
        let (_, entry) = gmd.find_entry(kh).unwrap();
        assert_eq!(entry.data_page_id, 42);
    }
}
