//! Cache configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::key::Namespace;

/// Default TTL for raw entries (transcripts): 7 days.
pub const DEFAULT_RAW_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Default TTL for derived entries (model output): 30 days.
pub const DEFAULT_DERIVED_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false, every read misses and every write is skipped
    pub enabled: bool,
    /// Root directory; each namespace gets a subdirectory
    pub cache_dir: PathBuf,
    /// TTL for the raw namespace
    pub raw_ttl: Duration,
    /// TTL for the derived namespace
    pub derived_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from("./.cache"),
            raw_ttl: DEFAULT_RAW_TTL,
            derived_ttl: DEFAULT_DERIVED_TTL,
        }
    }
}

impl CacheConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("ENABLE_CACHE")
                .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(true),
            cache_dir: std::env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./.cache")),
            raw_ttl: std::env::var("CACHE_RAW_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RAW_TTL),
            derived_ttl: std::env::var("CACHE_DERIVED_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DERIVED_TTL),
        }
    }

    /// Create an enabled config rooted at `cache_dir` with default TTLs.
    pub fn at(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, namespace: Namespace, ttl: Duration) -> Self {
        match namespace {
            Namespace::Raw => self.raw_ttl = ttl,
            Namespace::Derived => self.derived_ttl = ttl,
        }
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn ttl(&self, namespace: Namespace) -> Duration {
        match namespace {
            Namespace::Raw => self.raw_ttl,
            Namespace::Derived => self.derived_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls_differ_per_namespace() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl(Namespace::Raw), DEFAULT_RAW_TTL);
        assert_eq!(config.ttl(Namespace::Derived), DEFAULT_DERIVED_TTL);
        assert!(config.ttl(Namespace::Derived) > config.ttl(Namespace::Raw));
    }

    #[test]
    fn test_with_ttl_only_touches_one_namespace() {
        let config = CacheConfig::at("/tmp/x").with_ttl(Namespace::Raw, Duration::from_secs(5));
        assert_eq!(config.raw_ttl, Duration::from_secs(5));
        assert_eq!(config.derived_ttl, DEFAULT_DERIVED_TTL);
        assert!(config.enabled);
        assert!(!config.disabled().enabled);
    }
}
