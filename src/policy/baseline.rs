use super::{InlineContext, InliningPolicy};

/// `should_inline ≡ value_size ≤ ppa_size`. No learning, no feedback.
#[derive(Debug, Clone, Copy)]
pub struct Baseline {
    ppa_size: usize,
}

impl Baseline {
    pub fn new(ppa_size: usize) -> Self {
        Baseline { ppa_size }
    }
}

impl InliningPolicy for Baseline {
    fn should_inline(
        &mut self,
        ctx: &InlineContext,
    ) -> bool {
        ctx.value_size <= self.ppa_size
    }

    fn update(
        &mut self,
        _ctx: &InlineContext,
    ) {
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
    fn boundary_at_ppa_size() {
        let mut p = Baseline::new(8);
        assert!(p.should_inline(&ctx(8)));
        assert!(!p.should_inline(&ctx(9)));
    }
}
