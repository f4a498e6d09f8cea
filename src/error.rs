use crate::deps::thiserror;


#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The flash allocator made a full revolution of the page id space without
    /// finding an unoccupied page. The orchestrator is expected to force a GC
    /// round and retry once before this propagates to a caller.
    #[error("flash device has no free page after a full revolution of the allocator")]
    FlashFull,

    /// The policy factory was asked to construct a mode it doesn't recognize.
    /// Raised at construction time, never mid-run.
    #[error(
        "unknown inlining policy mode {mode:?}, expected one of: baseline, kvpack_s, kvpack_d, ml_linear, ml_bandit"
    )]
    UnknownMode { mode: String },
}
