use crate::deps::rand::{rngs::StdRng, Rng, SeedableRng};

use super::{InlineContext, InliningPolicy};
use crate::mapping::INLINE_HEADER_BYTES;

#[derive(Debug, Clone, Copy, Default)]
struct Arm {
    sum:   f64,
    count: u64,
}

impl Arm {
    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

const INLINE_ARM: usize = 0;
const REGULAR_ARM: usize = 1;

/// ε-greedy contextual bandit. Context is the entry's frame count, binned
/// into `num_bins` buckets. Each bin tracks an independent `{inline,
/// regular}` arm pair; ε decays multiplicatively every PUT.
#[derive(Debug)]
pub struct MlBandit {
    entry_size: usize,
    num_bins:   usize,
    warmup:     u64,
    epsilon:    f64,
    decay:      f64,
    floor:      f64,
    put_count:  u64,
    arms:       Vec<[Arm; 2]>,
    rng:        StdRng,
}

impl MlBandit {
    pub fn new(
        entry_size: usize,
        num_bins: usize,
        warmup: u64,
        epsilon0: f64,
        decay: f64,
        floor: f64,
        seed: u64,
    ) -> Self {
        let num_bins = num_bins.max(1);
        MlBandit {
            entry_size,
            num_bins,
            warmup,
            epsilon: epsilon0,
            decay,
            floor,
            put_count: 0,
            arms: vec![[Arm::default(); 2]; num_bins],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn bin(
        &self,
        ctx: &InlineContext,
    ) -> usize {
        let frames =
            crate::mapping::compute_frames(INLINE_HEADER_BYTES + ctx.key_size + ctx.value_size, self.entry_size);
        frames.min(self.num_bins) - 1
    }
}

impl InliningPolicy for MlBandit {
    fn should_inline(
        &mut self,
        ctx: &InlineContext,
    ) -> bool {
        if self.put_count < self.warmup {
            return self.rng.gen_bool(0.5);
        }

        if self.rng.gen_bool(self.epsilon.clamp(0.0, 1.0)) {
            return self.rng.gen_bool(0.5);
        }

        let bin = self.bin(ctx);
        let [inline_arm, regular_arm] = self.arms[bin];
        if inline_arm.count == 0 && regular_arm.count == 0 {
            return self.rng.gen_bool(0.5);
        }
        inline_arm.mean() > regular_arm.mean()
    }

    fn update(
        &mut self,
        _ctx: &InlineContext,
    ) {
        self.put_count += 1;
        self.epsilon = (self.epsilon * self.decay).max(self.floor);
    }

    fn feedback(
        &mut self,
        ctx: &InlineContext,
        was_inline: bool,
        flash_reads: u64,
    ) {
        let bin = self.bin(ctx);
        let arm = if was_inline { INLINE_ARM } else { REGULAR_ARM };
        let reward = -(flash_reads as f64);
        self.arms[bin][arm].sum += reward;
        self.arms[bin][arm].count += 1;
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
    fn random_during_warmup_is_deterministic_for_a_fixed_seed() {
        let mut a = MlBandit::new(32, 8, 4, 0.2, 0.999, 0.01, 42);
        let mut b = MlBandit::new(32, 8, 4, 0.2, 0.999, 0.01, 42);
        let seq_a: Vec<_> = (0..8).map(|_| a.should_inline(&ctx(4))).collect();
        let seq_b: Vec<_> = (0..8).map(|_| b.should_inline(&ctx(4))).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn epsilon_decays_toward_the_floor() {
        let mut p = MlBandit::new(32, 8, 0, 0.2, 0.5, 0.01, 42);
        for _ in 0..50 {
            p.update(&ctx(4));
        }
        assert!(p.epsilon >= 0.01);
        assert!(p.epsilon < 0.2);
    }

    #[test]
    fn feedback_updates_the_chosen_arm_in_the_right_bin() {
        let mut p = MlBandit::new(32, 8, 0, 0.0, 1.0, 0.01, 42);
        let c = ctx(4);
        let bin = p.bin(&c);
        p.feedback(&c, true, 1);
        assert_eq!(p.arms[bin][INLINE_ARM].count, 1);
        assert_eq!(p.arms[bin][INLINE_ARM].sum, -1.0);
    }
}
