#![allow(warnings)]

pub(crate) mod deps {
    pub use derive_more;
    pub use log;
    pub use rand;
    pub use serde;
    pub use thiserror;
}

mod fmt;

pub mod cmt;
pub mod config;
pub mod error;
pub mod flash;
pub mod gc;
pub mod kvssd;
pub mod mapping;
pub mod metrics;
pub mod policy;

pub use config::Config;
pub use error::Error;
pub use kvssd::KvSsd;
pub use mapping::{KeyHash, MappingEntry};
pub use metrics::Metrics;
