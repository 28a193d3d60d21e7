//! File-system-backed memoizing cache for OpenGenomeBrowser
//!
//! This crate memoizes expensive, deterministic computations (alignments,
//! similarity scores, dendrograms) on disk:
//! - Content keys derived from canonically encoded call arguments
//! - One directory per cached function, one subdirectory per key
//! - At most one concurrent computation per key on a local filesystem
//! - Oldest-first eviction bounded per function
//!
//! # Layout
//!
//! ```text
//! <cache_root>/<function>/<positional_sha256>:<keyword_sha256>/
//!     result.json
//!     timestamp.txt
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ogb_cache::{CacheConfig, CacheCoordinator, FunctionId};
//! use std::path::Path;
//!
//! # fn main() -> ogb_cache::Result<()> {
//! let cache = CacheCoordinator::new(&CacheConfig::from_env()?)?;
//! let function = FunctionId::new("plugins.square")?;
//! let squared: u64 = cache.memoize(&function, &[12u64], &(), |_: &Path| {
//!     Ok::<_, std::io::Error>(144)
//! })?;
//! # Ok(())
//! # }
//! ```

#![expect(
    clippy::missing_errors_doc,
    reason = "Error conditions are documented on the Error enum"
)]

mod config;
mod coordinator;
mod error;
mod eviction;
mod key;
mod store;

pub use config::{
    CACHE_DIR_ENV, CacheConfig, DEFAULT_MAX_ENTRIES, DEFAULT_RETRY_WAIT, default_cache_root,
};
pub use coordinator::{CacheCoordinator, CacheOptions};
pub use error::{ArgumentKind, Error, Result};
pub use eviction::{ABANDONED_CLAIM_AGE, EvictionPolicy, EvictionReport};
pub use key::{ContentKey, FunctionId, KEY_SEPARATOR};
pub use store::{CacheEntry, CacheStats, CacheStore, FunctionStats, RESULT_FILE, TIMESTAMP_FILE};
