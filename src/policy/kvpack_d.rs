use std::collections::BTreeMap;

use super::{InlineContext, InliningPolicy};
use crate::mapping::INLINE_HEADER_BYTES;

/// Same static-threshold profiling as [`super::KvpackS`] until the warmup
/// window completes, then keeps re-evaluating every `interval` PUTs. The
/// threshold only ever moves up: a recomputed value below the current
/// threshold is ignored, and the frequency table resets after each
/// recomputation regardless of whether it moved the threshold.
#[derive(Debug, Clone)]
pub struct KvpackD {
    entry_size:      usize,
    warmup:          u64,
    interval:        u64,
    step:            u64,
    freq:            BTreeMap<usize, u64>,
    threshold_bytes: Option<usize>,
    initialized:     bool,
}

impl KvpackD {
    pub fn new(
        entry_size: usize,
        warmup: u64,
        interval: u64,
    ) -> Self {
        KvpackD {
            entry_size,
            warmup,
            interval: interval.max(1),
            step: 0,
            freq: BTreeMap::new(),
            threshold_bytes: None,
            initialized: false,
        }
    }

    fn frames_for(
        &self,
        ctx: &InlineContext,
    ) -> usize {
        crate::mapping::compute_frames(INLINE_HEADER_BYTES + ctx.key_size + ctx.value_size, self.entry_size)
    }

    fn popular_frames(&self) -> Option<usize> {
        self.freq
            .iter()
            .max_by(|(a_frames, a_count), (b_frames, b_count)| {
                a_count.cmp(b_count).then_with(|| b_frames.cmp(a_frames))
            })
            .map(|(frames, _)| *frames)
    }
}

impl InliningPolicy for KvpackD {
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
        let frames = self.frames_for(ctx);
        *self.freq.entry(frames).or_insert(0) += 1;
        self.step += 1;

        if !self.initialized {
            if self.step >= self.warmup {
                let popular = self.popular_frames().unwrap_or(1);
                self.threshold_bytes = Some(popular * self.entry_size);
                self.initialized = true;
                self.step = 0;
                self.freq.clear();
            }
            return;
        }

        if self.step >= self.interval {
            if let Some(popular) = self.popular_frames() {
                let candidate = popular * self.entry_size;
                let current = self.threshold_bytes.unwrap_or(0);
                if candidate > current {
                    self.threshold_bytes = Some(candidate);
                }
            }
            self.step = 0;
            self.freq.clear();
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
    fn threshold_never_decreases_across_reevaluations() {
        let mut p = KvpackD::new(32, 4, 4);
        for _ in 0..4 {
            p.update(&ctx(4));
        }
        let after_warmup = p.threshold_bytes.unwrap();

        // Feed smaller values; recomputation must not lower the threshold.
        for _ in 0..4 {
            p.update(&ctx(0));
        }
        assert!(p.threshold_bytes.unwrap() >= after_warmup);
    }

    #[test]
    fn threshold_rises_when_a_larger_size_becomes_popular() {
        let mut p = KvpackD::new(32, 4, 4);
        for _ in 0..4 {
            p.update(&ctx(4));
        }
        let after_warmup = p.threshold_bytes.unwrap();

        for _ in 0..4 {
            p.update(&ctx(200));
        }
        assert!(p.threshold_bytes.unwrap() > after_warmup);
    }
}
