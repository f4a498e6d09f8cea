use std::collections::BTreeMap;

use super::{InlineContext, InliningPolicy};
use crate::mapping::INLINE_HEADER_BYTES;

/// Profiles a static inline threshold over a warmup window of `W` PUTs, then
/// holds it fixed. Before the warmup completes, `should_inline` is always
/// false — there is no threshold to compare against yet.
#[derive(Debug, Clone)]
pub struct KvpackS {
    entry_size:      usize,
    warmup:          u64,
    step:            u64,
    freq:            BTreeMap<usize, u64>,
    threshold_bytes: Option<usize>,
}

impl KvpackS {
    pub fn new(
        entry_size: usize,
        warmup: u64,
    ) -> Self {
        KvpackS {
            entry_size,
            warmup,
            step: 0,
            freq: BTreeMap::new(),
            threshold_bytes: None,
        }
    }

    fn frames_for(
        &self,
        ctx: &InlineContext,
    ) -> usize {
        crate::mapping::compute_frames(INLINE_HEADER_BYTES + ctx.key_size + ctx.value_size, self.entry_size)
    }

    /// argmax over recorded frame sizes by frequency; ties broken by the
    /// smallest frame count, so the result is deterministic.
    fn popular_frames(&self) -> Option<usize> {
        self.freq
            .iter()
            .max_by(|(a_frames, a_count), (b_frames, b_count)| {
                a_count.cmp(b_count).then_with(|| b_frames.cmp(a_frames))
            })
            .map(|(frames, _)| *frames)
    }
}

impl InliningPolicy for KvpackS {
    fn should_inline(
        &mut self,
        ctx: &InlineContext,
    ) -> bool {
        match self.threshold_bytes {
            Some(threshold) => INLINE_HEADER_BYTES + ctx.key_size + ctx.value_size <= threshold,
            None => false,
        }
    }

    fn update(
        &mut self,
        ctx: &InlineContext,
    ) {
        if self.threshold_bytes.is_some() {
            return;
        }
        let frames = self.frames_for(ctx);
        *self.freq.entry(frames).or_insert(0) += 1;
        self.step += 1;

        if self.step >= self.warmup {
            let popular = self.popular_frames().unwrap_or(1);
            self.threshold_bytes = Some(popular * self.entry_size);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(value_size: usize) -> InlineContext {
        InlineContext {
            key_size: 8,
            value_size,
            tp_utilization: 0.0,
            tp_inline_ratio: 0.0,
            cmt_hit_rate: 0.0,
            epoch: 0,
        }
    }

    #[test]
    fn no_inline_before_warmup_completes() {
        let mut p = KvpackS::new(32, 10);
        for _ in 0..5 {
            p.update(&ctx(4));
            assert!(!p.should_inline(&ctx(4)));
        }
    }

    #[test]
    fn threshold_locks_in_at_warmup_and_follows_popular_size() {
        let mut p = KvpackS::new(32, 4);
        for _ in 0..4 {
            p.update(&ctx(4));
        }
        assert!(p.threshold_bytes.is_some());
        assert!(p.should_inline(&ctx(4)));
    }
}
