use std::collections::VecDeque;

use crate::deps::rand::{rngs::StdRng, Rng, SeedableRng};

use super::{InlineContext, InliningPolicy};

const NUM_FEATURES: usize = 3;

fn features(
    ctx: &InlineContext,
    entry_size: usize,
) -> [f64; NUM_FEATURES] {
    let entry_size = entry_size as f64;
    [
        ctx.value_size as f64 / entry_size,
        (ctx.key_size + ctx.value_size + 12) as f64 / (16.0 * entry_size),
        1.0 - ctx.cmt_hit_rate,
    ]
}

fn dot(
    w: &[f64; NUM_FEATURES],
    f: &[f64; NUM_FEATURES],
) -> f64 {
    w.iter().zip(f.iter()).map(|(a, b)| a * b).sum()
}

/// Online linear regression over a three-feature context. Before `warmup`
/// feedbacks are seen, `should_inline` flips a fair (seeded) coin instead of
/// consulting the model. After warmup, and periodically every
/// `retrain_interval` feedbacks thereafter, the model is (re)trained by SGD
/// over the most recent `retrain_interval` buffered examples.
#[derive(Debug)]
pub struct MlLinear {
    entry_size:       usize,
    warmup:           u64,
    lr:               f64,
    retrain_interval: u64,
    bias:             f64,
    weights:          [f64; NUM_FEATURES],
    trained:          bool,
    feedback_count:   u64,
    buffer:           VecDeque<([f64; NUM_FEATURES], f64)>,
    rng:              StdRng,
}

impl MlLinear {
    pub fn new(
        entry_size: usize,
        warmup: u64,
        lr: f64,
        retrain_interval: u64,
        seed: u64,
    ) -> Self {
        MlLinear {
            entry_size,
            warmup,
            lr,
            retrain_interval: retrain_interval.max(1),
            bias: 0.0,
            weights: [0.0; NUM_FEATURES],
            trained: false,
            feedback_count: 0,
            buffer: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sgd_step(
        &mut self,
        f: &[f64; NUM_FEATURES],
        reward: f64,
    ) {
        let error = reward - (self.bias + dot(&self.weights, f));
        self.bias += self.lr * error;
        for (w, fi) in self.weights.iter_mut().zip(f.iter()) {
            *w += self.lr * error * fi;
        }
    }

    fn reward(
        was_inline: bool,
        flash_reads: u64,
    ) -> f64 {
        match (was_inline, flash_reads <= 1) {
            (true, true) => 1.0,
            (true, false) => -0.5,
            (false, _) if flash_reads >= 2 => -1.0,
            (false, _) => 0.5,
        }
    }
}

impl InliningPolicy for MlLinear {
    fn should_inline(
        &mut self,
        ctx: &InlineContext,
    ) -> bool {
        if !self.trained {
            return self.rng.gen_bool(0.5);
        }
        let f = features(ctx, self.entry_size);
        self.bias + dot(&self.weights, &f) > 0.0
    }

    fn update(
        &mut self,
        _ctx: &InlineContext,
    ) {
    }

    fn feedback(
        &mut self,
        ctx: &InlineContext,
        was_inline: bool,
        flash_reads: u64,
    ) {
        let f = features(ctx, self.entry_size);
        let reward = Self::reward(was_inline, flash_reads);

        self.buffer.push_back((f, reward));
        while self.buffer.len() as u64 > self.retrain_interval {
            self.buffer.pop_front();
        }
        self.feedback_count += 1;

        if !self.trained {
            if self.feedback_count >= self.warmup {
                let examples: Vec<_> = self.buffer.iter().cloned().collect();
                for (f, r) in &examples {
                    self.sgd_step(f, *r);
                }
                self.trained = true;
            }
            return;
        }

        self.sgd_step(&f, reward);

        if self.feedback_count % self.retrain_interval == 0 {
            let examples: Vec<_> = self.buffer.iter().cloned().collect();
            for (f, r) in &examples {
                self.sgd_step(f, *r);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> InlineContext {
        InlineContext {
            key_size: 8,
            value_size: 4,
            tp_utilization: 0.0,
            tp_inline_ratio: 0.0,
            cmt_hit_rate: 0.5,
            epoch: 0,
        }
    }

    #[test]
    fn random_before_warmup_is_deterministic_for_a_fixed_seed() {
        let mut a = MlLinear::new(32, 4, 0.01, 4, 42);
        let mut b = MlLinear::new(32, 4, 0.01, 4, 42);
        let seq_a: Vec<_> = (0..8).map(|_| a.should_inline(&ctx())).collect();
        let seq_b: Vec<_> = (0..8).map(|_| b.should_inline(&ctx())).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn trains_after_warmup_feedbacks() {
        let mut p = MlLinear::new(32, 4, 0.1, 4, 42);
        for _ in 0..4 {
            p.feedback(&ctx(), true, 1);
        }
        assert!(p.trained);
    }
}
