//! Stampede-safe result cache.
//!
//! - [`store`]: backing store contract, in-process store, fallback wrapper
//! - [`key`]: stable key construction
//! - [`metrics`]: hit/miss/error counters
//! - [`stampede`]: single-flight `get_or_compute`

pub mod key;
pub mod metrics;
pub mod stampede;
pub mod store;

pub use key::{build_key, canonicalize, lock_key, params_hash, VOLATILE_FIELDS};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use stampede::StampedeCache;
pub use store::{CacheError, CacheStore, MemoryStore, ResilientStore};
