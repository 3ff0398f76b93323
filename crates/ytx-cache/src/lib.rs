//! Content-addressed cache for the ytx pipeline.
//!
//! This crate provides:
//! - Deterministic keys derived from input content (`CacheKey`)
//! - Two namespaces with independent TTLs: raw transcripts and derived
//!   model output
//! - Crash-safe file storage (write to temp, then rename)
//! - Per-namespace statistics and clearing

pub mod codec;
pub mod config;
pub mod error;
pub mod key;
pub mod store;

pub use codec::ENTRY_FORMAT_VERSION;
pub use config::{CacheConfig, DEFAULT_DERIVED_TTL, DEFAULT_RAW_TTL};
pub use error::{CacheError, CacheResult};
pub use key::{normalize_content, CacheKey, Namespace};
pub use store::{ContentCache, NamespaceStats};
