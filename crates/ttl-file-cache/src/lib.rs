//! Disk-backed cache with per-entry TTL expiration
//!
//! Each value is spilled to its own file in a private working directory while
//! a small in-memory index tracks deadlines. Reads refresh an entry's
//! deadline (sliding TTL), and a background cleaner periodically evicts
//! entries nobody has touched.
//!
//! ```ignore
//! use ttl_file_cache::{CacheOptions, FileCache};
//!
//! let cache = FileCache::new(CacheOptions::from_env())?;
//! cache.start();
//!
//! cache.put("tile:15:12754", &bytes).await?;
//! let bytes = cache.get("tile:15:12754").await?;
//!
//! cache.stop().await;
//! ```

mod cache;
mod cleaner;
pub mod error;
pub mod options;
pub mod types;

pub use cache::FileCache;
pub use error::{FileCacheError, Result};
pub use options::CacheOptions;
pub use types::CacheStats;
