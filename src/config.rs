//! Configuration groups for the emulator, mirroring the option table of the
//! external interface: `flash`, `mapping`, `cmt`, `inlining`. Building one of
//! these from CLI flags, a config file, or the environment is a driver's job;
//! this module only owns the defaults and the derived sizes computed from
//! them.
use crate::deps::serde;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FlashConfig {
    pub page_size:       usize,
    pub pages_per_block: usize,
    pub read_latency_us: f64,
    pub capacity_bytes:  u64,
    pub gc_threshold:    f64,
}

impl Default for FlashConfig {
    fn default() -> Self {
        FlashConfig {
            page_size:       16384,
            pages_per_block: 256,
            read_latency_us: 45.0,
            capacity_bytes:  256 * 1024 * 1024,
            gc_threshold:    0.85,
        }
    }
}


#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MappingConfig {
    pub entry_size:     usize,
    pub hash_bits:       u32,
    pub max_retry:       usize,
    pub ppa_size:        usize,
    pub data_alignment:  usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        MappingConfig {
            entry_size:    32,
            hash_bits:     27,
            max_retry:     8,
            ppa_size:      8,
            data_alignment: 512,
        }
    }
}


#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CmtConfig {
    pub budget_ratio:    f64,
    pub read_write_ratio: f64,
}

impl Default for CmtConfig {
    fn default() -> Self {
        CmtConfig {
            budget_ratio:     0.005,
            read_write_ratio: 1.0,
        }
    }
}


#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InlineMode {
    Baseline,
    KvpackS,
    KvpackD,
    MlLinear,
    MlBandit,
}

impl std::str::FromStr for InlineMode {
    type Err = crate::error::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "baseline" => Ok(InlineMode::Baseline),
            "kvpack_s" => Ok(InlineMode::KvpackS),
            "kvpack_d" => Ok(InlineMode::KvpackD),
            "ml_linear" => Ok(InlineMode::MlLinear),
            "ml_bandit" => Ok(InlineMode::MlBandit),
            other => Err(crate::error::Error::UnknownMode { mode: other.to_string() }),
        }
    }
}


#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InliningConfig {
    pub mode:                       InlineMode,
    pub profiler_warmup:            u64,
    pub profiler_interval:          u64,
    pub ml_linear_warmup:           u64,
    pub ml_linear_lr:               f64,
    pub ml_linear_retrain_interval: u64,
    pub ml_bandit_warmup:           u64,
    pub ml_bandit_num_bins:         usize,
    pub ml_bandit_epsilon0:         f64,
    pub ml_bandit_epsilon_decay:    f64,
    pub ml_bandit_epsilon_floor:    f64,
    pub rng_seed:                   u64,
}

impl Default for InliningConfig {
    fn default() -> Self {
        InliningConfig {
            mode:                       InlineMode::KvpackS,
            profiler_warmup:            1_000_000,
            profiler_interval:          100_000,
            ml_linear_warmup:           1_000,
            ml_linear_lr:               0.01,
            ml_linear_retrain_interval: 1_000,
            ml_bandit_warmup:           1_000,
            ml_bandit_num_bins:         8,
            ml_bandit_epsilon0:         0.2,
            ml_bandit_epsilon_decay:    0.999,
            ml_bandit_epsilon_floor:    0.01,
            rng_seed:                   42,
        }
    }
}


#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub flash:    FlashConfig,
    pub mapping:  MappingConfig,
    pub cmt:      CmtConfig,
    pub inlining: InliningConfig,
}

impl Config {
    /// Frames available per translation page: `page_size / entry_size`.
    pub const fn frames_per_tp(&self) -> usize {
        self.flash.page_size / self.mapping.entry_size
    }

    /// Size of the logical GMD index space.
    pub fn num_translation_pages(&self) -> usize {
        let frames_per_tp = self.frames_per_tp().max(1);
        ((self.flash.capacity_bytes as usize / self.mapping.data_alignment) / frames_per_tp).max(1)
    }

    pub const fn hash_mask(&self) -> u64 {
        (1u64 << self.mapping.hash_bits) - 1
    }

    pub fn total_flash_pages(&self) -> usize {
        (self.flash.capacity_bytes as usize / self.flash.page_size).max(1)
    }

    pub fn total_blocks(&self) -> usize {
        (self.total_flash_pages() / self.flash.pages_per_block.max(1)).max(1)
    }

    /// CMT capacity in entries: `budget_ratio * capacity_bytes / entry_size`.
    pub fn cmt_capacity(&self) -> usize {
        let bytes = self.cmt.budget_ratio * self.flash.capacity_bytes as f64;
        ((bytes / self.mapping.entry_size as f64) as usize).max(1)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_sizes_match_documented_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.frames_per_tp(), 512);
        assert_eq!(cfg.hash_mask(), (1u64 << 27) - 1);
        assert_eq!(cfg.total_flash_pages(), 256 * 1024 * 1024 / 16384);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        use std::str::FromStr;
        assert!(InlineMode::from_str("not_a_mode").is_err());
        assert_eq!(InlineMode::from_str("kvpack_d").unwrap(), InlineMode::KvpackD);
    }
}
