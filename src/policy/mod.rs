//! Inlining policies: five variants sharing one capability set. `feedback`
//! defaults to a no-op so the baseline and threshold policies, which never
//! need it, don't have to implement it.
mod baseline;
mod kvpack_d;
mod kvpack_s;
mod ml_bandit;
mod ml_linear;

pub use baseline::Baseline;
pub use kvpack_d::KvpackD;
pub use kvpack_s::KvpackS;
pub use ml_bandit::MlBandit;
pub use ml_linear::MlLinear;

use crate::{config::Config, error::Error};

/// Per-PUT (and post-GET) context a policy reasons over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InlineContext {
    pub key_size:       usize,
    pub value_size:     usize,
    pub tp_utilization: f64,
    pub tp_inline_ratio: f64,
    pub cmt_hit_rate:   f64,
    pub epoch:          u64,
}

pub trait InliningPolicy {
    fn should_inline(
        &mut self,
        ctx: &InlineContext,
    ) -> bool;

    fn update(
        &mut self,
        ctx: &InlineContext,
    );

    /// Called on every GET that reached flash, after the request completes.
    /// Optional: policies that don't learn from reads leave this as a no-op.
    fn feedback(
        &mut self,
        _ctx: &InlineContext,
        _was_inline: bool,
        _flash_reads: u64,
    ) {
    }
}

/// Constructs the configured policy, or `Error::UnknownMode` for anything
/// the factory doesn't recognize — raised at construction, never mid-run.
pub fn make_policy(config: &Config) -> Result<Box<dyn InliningPolicy>, Error> {
    use crate::config::InlineMode;

    let entry_size = config.mapping.entry_size;
    Ok(match config.inlining.mode {
        InlineMode::Baseline => Box::new(Baseline::new(config.mapping.ppa_size)),
        InlineMode::KvpackS => Box::new(KvpackS::new(entry_size, config.inlining.profiler_warmup)),
        InlineMode::KvpackD => Box::new(KvpackD::new(
            entry_size,
            config.inlining.profiler_warmup,
            config.inlining.profiler_interval,
        )),
        InlineMode::MlLinear => Box::new(MlLinear::new(
            entry_size,
            config.inlining.ml_linear_warmup,
            config.inlining.ml_linear_lr,
            config.inlining.ml_linear_retrain_interval,
            config.inlining.rng_seed,
        )),
        InlineMode::MlBandit => Box::new(MlBandit::new(
            entry_size,
            config.inlining.ml_bandit_num_bins,
            config.inlining.ml_bandit_warmup,
            config.inlining.ml_bandit_epsilon0,
            config.inlining.ml_bandit_epsilon_decay,
            config.inlining.ml_bandit_epsilon_floor,
            config.inlining.rng_seed,
        )),
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_mode_errors_at_construction() {
        use std::str::FromStr;
        assert!(crate::config::InlineMode::from_str("bogus").is_err());
    }
}
