//! Hash to mapping-entry bookkeeping: [`KeyHash`], [`MappingEntry`], the
//! translation page container, and the quadratic-probed directory over it.
pub mod gmd;
pub mod translation_page;

pub use gmd::Gmd;
pub use translation_page::TranslationPage;

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::{
    deps::{derive_more, serde},
    fmt::Hex,
};

/// Sentinel `data_page_id` for an inline entry.
pub const INLINE_SENTINEL: i64 = -1;

/// Additional bytes an inline entry's payload carries ahead of the raw
/// key/value bytes: 8 B hash + 2 B key length + 2 B value length.
pub const INLINE_HEADER_BYTES: usize = 12;

/// Unsigned key hash truncated to `hash_bits` low-order bits.
#[derive(
    Copy,
    Clone,
    PartialOrd,
    PartialEq,
    Ord,
    Eq,
    Hash,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct KeyHash(u64);

impl KeyHash {
    pub const fn new(value: u64) -> Self {
        KeyHash(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Hashes `key` with the process's default hasher and masks to
    /// `hash_bits` low-order bits.
    pub fn of(
        key: &[u8],
        hash_bits: u32,
    ) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        let mask = (1u64 << hash_bits) - 1;
        KeyHash(hasher.finish() & mask)
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_tuple("KeyHash").field(&Hex(&self.0)).finish()
    }
}


/// `max(1, ceil(total / entry_size))`.
pub const fn compute_frames(
    total: usize,
    entry_size: usize,
) -> usize {
    let frames = (total + entry_size - 1) / entry_size;
    if frames == 0 {
        1
    } else {
        frames
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MappingEntry {
    pub key_hash:     KeyHash,
    pub key_size:     usize,
    pub value_size:   usize,
    pub is_inline:    bool,
    pub data_page_id: i64,
    pub frames_used:  usize,
}

impl MappingEntry {
    pub fn regular(
        key_hash: KeyHash,
        key_size: usize,
        value_size: usize,
        data_page_id: crate::flash::PageId,
    ) -> Self {
        MappingEntry {
            key_hash,
            key_size,
            value_size,
            is_inline: false,
            data_page_id: data_page_id as i64,
            frames_used: 1,
        }
    }

    pub fn inline(
        key_hash: KeyHash,
        key_size: usize,
        value_size: usize,
        entry_size: usize,
    ) -> Self {
        let frames_used = compute_frames(INLINE_HEADER_BYTES + key_size + value_size, entry_size);
        MappingEntry {
            key_hash,
            key_size,
            value_size,
            is_inline: true,
            data_page_id: INLINE_SENTINEL,
            frames_used,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_respects_mask() {
        let h = KeyHash::of(b"some key", 10);
        assert!(h.value() < (1 << 10));
    }

    #[test]
    fn inline_entry_invariants() {
        let e = MappingEntry::inline(KeyHash::new(1), 8, 4, 32);
        assert!(e.is_inline);
        assert_eq!(e.data_page_id, INLINE_SENTINEL);
        assert_eq!(e.frames_used, compute_frames(12 + 8 + 4, 32));
    }

    #[test]
    fn regular_entry_always_uses_one_frame() {
        let e = MappingEntry::regular(KeyHash::new(1), 8, 4096, 7);
        assert!(!e.is_inline);
        assert_eq!(e.frames_used, 1);
        assert_eq!(e.data_page_id, 7);
    }
}
