//! File-backed content-addressed cache.
//!
//! Layout: `{cache_dir}/{namespace}/{digest}.json.gz`, one file per key.
//! Writes go to a uniquely named temp file in the same directory and are
//! renamed into place, so a reader sees either the previous entry or the new
//! one, never a partial file. Concurrent writers to one key resolve as
//! last-writer-wins.
//!
//! Expiry is lazy: an expired entry reads as a miss but stays on disk until it
//! is overwritten or cleared.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::{decode_entry, encode_entry};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::key::{CacheKey, Namespace};

const ENTRY_EXTENSION: &str = "json.gz";

/// Per-namespace statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceStats {
    pub entry_count: usize,
    /// Total bytes on disk
    pub total_size: u64,
    /// Age of the oldest readable entry
    pub oldest_entry_age: Option<Duration>,
    /// Entries still on disk whose TTL has elapsed
    pub expired_count: usize,
}

/// Content-addressed cache with independent TTLs per namespace.
#[derive(Debug, Clone)]
pub struct ContentCache {
    config: CacheConfig,
}

impl ContentCache {
    /// Open the cache, creating namespace directories when enabled.
    pub async fn open(config: CacheConfig) -> CacheResult<Self> {
        if config.enabled {
            for namespace in Namespace::ALL {
                let dir = config.cache_dir.join(namespace.as_str());
                tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                    CacheError::persistence(format!(
                        "Failed to create cache directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }
        info!(
            enabled = config.enabled,
            dir = %config.cache_dir.display(),
            raw_ttl_secs = config.raw_ttl.as_secs(),
            derived_ttl_secs = config.derived_ttl.as_secs(),
            "Content cache opened"
        );
        Ok(Self { config })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn ttl(&self, namespace: Namespace) -> Duration {
        self.config.ttl(namespace)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn namespace_dir(&self, namespace: Namespace) -> PathBuf {
        self.config.cache_dir.join(namespace.as_str())
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.namespace_dir(key.namespace())
            .join(format!("{}.{}", key.digest(), ENTRY_EXTENSION))
    }

    /// Look up a payload. Missing, expired and unreadable entries all return
    /// `None`.
    pub async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        if !self.config.enabled {
            return None;
        }

        let path = self.entry_path(key);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) => {
                debug!(key = %key, error = %e, "Cache miss (not found)");
                return None;
            }
        };

        let Some(entry) = decode_entry(&data) else {
            debug!(key = %key, "Cache miss (corrupt entry)");
            return None;
        };

        if is_expired(entry.stored_at, self.ttl(key.namespace()), Utc::now()) {
            debug!(key = %key, stored_at = %entry.stored_at, "Cache miss (expired)");
            return None;
        }

        debug!(key = %key, bytes = entry.payload.len(), "Cache hit");
        Some(entry.payload)
    }

    /// Store a payload, replacing any previous entry for the key.
    pub async fn put(&self, key: &CacheKey, payload: &[u8]) -> CacheResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let path = self.entry_path(key);
        let encoded = encode_entry(payload, Utc::now())?;
        write_atomic(&path, &encoded).await?;

        debug!(
            key = %key,
            bytes = payload.len(),
            stored_size = encoded.len(),
            "Cache entry stored"
        );
        Ok(())
    }

    /// Look up and deserialize a JSON payload. A payload that does not
    /// deserialize as `T` is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let payload = self.get(key).await?;
        match serde_json::from_slice(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached payload has unexpected shape, treating as miss");
                None
            }
        }
    }

    pub async fn put_json<T: Serialize>(&self, key: &CacheKey, value: &T) -> CacheResult<()> {
        let payload = serde_json::to_vec(value)?;
        self.put(key, &payload).await
    }

    /// Gather statistics for one namespace.
    pub async fn stats(&self, namespace: Namespace) -> CacheResult<NamespaceStats> {
        let mut stats = NamespaceStats::default();
        if !self.config.enabled {
            return Ok(stats);
        }

        let ttl = self.ttl(namespace);
        let now = Utc::now();
        let mut oldest: Option<DateTime<Utc>> = None;

        for path in self.entry_files(namespace).await? {
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                // Removed by a concurrent clear.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            stats.entry_count += 1;
            stats.total_size += data.len() as u64;

            if let Some(entry) = decode_entry(&data) {
                if is_expired(entry.stored_at, ttl, now) {
                    stats.expired_count += 1;
                }
                oldest = Some(oldest.map_or(entry.stored_at, |o| o.min(entry.stored_at)));
            }
        }

        stats.oldest_entry_age = oldest.map(|stored_at| age(stored_at, now));
        Ok(stats)
    }

    /// Delete every entry in `namespace`, or in all namespaces when `None`.
    ///
    /// Returns the number of entries removed.
    pub async fn clear(&self, namespace: Option<Namespace>) -> CacheResult<usize> {
        if !self.config.enabled {
            return Ok(0);
        }

        let namespaces = match namespace {
            Some(ns) => vec![ns],
            None => Namespace::ALL.to_vec(),
        };

        let mut removed = 0;
        for ns in namespaces {
            for path in self.entry_files(ns).await? {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            info!(namespace = %ns, "Cache namespace cleared");
        }
        Ok(removed)
    }

    async fn entry_files(&self, namespace: Namespace) -> CacheResult<Vec<PathBuf>> {
        let dir = self.namespace_dir(namespace);
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_entry = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(ENTRY_EXTENSION));
            if is_entry {
                files.push(path);
            }
        }
        Ok(files)
    }
}

fn age(stored_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    // Entries stamped in the future (clock skew) count as brand new.
    (now - stored_at).to_std().unwrap_or(Duration::ZERO)
}

/// An entry is valid only while `now - stored_at < ttl`.
fn is_expired(stored_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    age(stored_at, now) >= ttl
}

/// Write `data` to a temp file next to `path`, then rename it over `path`.
async fn write_atomic(path: &Path, data: &[u8]) -> CacheResult<()> {
    let tmp = path.with_extension(format!("tmp-{:016x}", rand::random::<u64>()));

    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(CacheError::persistence(format!(
            "Failed to write {}: {}",
            tmp.display(),
            e
        )));
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(CacheError::persistence(format!(
            "Failed to move entry into place at {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_cache(dir: &TempDir) -> ContentCache {
        ContentCache::open(CacheConfig::at(dir.path())).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_after_put_returns_exact_payload() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        let key = CacheKey::raw("https://youtu.be/dQw4w9WgXcQ");

        cache.put(&key, b"transcript bytes").await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), b"transcript bytes");
    }

    #[tokio::test]
    async fn test_miss_on_unknown_key() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        assert!(cache.get(&CacheKey::raw("nothing")).await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        let key = CacheKey::derived("p", "content", "model");

        cache.put(&key, b"first").await.unwrap();
        cache.put(&key, b"second").await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), b"second");
        assert_eq!(cache.stats(Namespace::Derived).await.unwrap().entry_count, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent_but_stays_on_disk() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::at(dir.path()).with_ttl(Namespace::Raw, Duration::from_millis(50));
        let cache = ContentCache::open(config).await.unwrap();
        let key = CacheKey::raw("https://youtu.be/dQw4w9WgXcQ");

        cache.put(&key, b"payload").await.unwrap();
        assert!(cache.get(&key).await.is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get(&key).await.is_none());

        let stats = cache.stats(Namespace::Raw).await.unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.expired_count, 1);
        assert!(cache.entry_path(&key).exists());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_always_expired() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::at(dir.path()).with_ttl(Namespace::Derived, Duration::ZERO);
        let cache = ContentCache::open(config).await.unwrap();
        let key = CacheKey::derived("p", "c", "m");

        cache.put(&key, b"x").await.unwrap();
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_namespaces_have_independent_ttls() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::at(dir.path()).with_ttl(Namespace::Raw, Duration::ZERO);
        let cache = ContentCache::open(config).await.unwrap();
        let raw = CacheKey::raw("https://youtu.be/dQw4w9WgXcQ");
        let derived = CacheKey::derived("p", "c", "m");

        cache.put(&raw, b"raw").await.unwrap();
        cache.put(&derived, b"derived").await.unwrap();
        assert!(cache.get(&raw).await.is_none());
        assert_eq!(cache.get(&derived).await.unwrap(), b"derived");
    }

    #[tokio::test]
    async fn test_model_sensitive_derived_entries() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        let flash = CacheKey::derived("p", "same content", "gemini-2.5-flash");
        let pro = CacheKey::derived("p", "same content", "gemini-2.5-pro");

        cache.put(&flash, b"flash output").await.unwrap();
        assert!(cache.get(&pro).await.is_none());

        cache.put(&pro, b"pro output").await.unwrap();
        assert_eq!(cache.get(&flash).await.unwrap(), b"flash output");
        assert_eq!(cache.get(&pro).await.unwrap(), b"pro output");
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        let key = CacheKey::raw("https://youtu.be/dQw4w9WgXcQ");

        tokio::fs::write(cache.entry_path(&key), b"garbage").await.unwrap();
        assert!(cache.get(&key).await.is_none());

        // A fresh put repairs it.
        cache.put(&key, b"good").await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), b"good");
    }

    #[tokio::test]
    async fn test_put_reports_persistence_failure() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        tokio::fs::remove_dir_all(dir.path().join("derived")).await.unwrap();

        let err = cache
            .put(&CacheKey::derived("p", "c", "m"), b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        let key = CacheKey::derived("p", "c", "m");

        cache.put_json(&key, &vec!["a".to_string(), "b".to_string()]).await.unwrap();
        let value: Vec<String> = cache.get_json(&key).await.unwrap();
        assert_eq!(value, vec!["a", "b"]);

        let wrong_shape: Option<u64> = cache.get_json(&key).await;
        assert!(wrong_shape.is_none());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;

        cache.put(&CacheKey::raw("a"), b"1").await.unwrap();
        cache.put(&CacheKey::raw("b"), b"22").await.unwrap();
        cache.put(&CacheKey::derived("p", "c", "m"), b"333").await.unwrap();

        let raw = cache.stats(Namespace::Raw).await.unwrap();
        assert_eq!(raw.entry_count, 2);
        assert!(raw.total_size > 0);
        assert!(raw.oldest_entry_age.is_some());
        assert_eq!(raw.expired_count, 0);

        assert_eq!(cache.clear(Some(Namespace::Raw)).await.unwrap(), 2);
        assert_eq!(cache.stats(Namespace::Raw).await.unwrap().entry_count, 0);
        assert_eq!(cache.stats(Namespace::Derived).await.unwrap().entry_count, 1);

        assert_eq!(cache.clear(None).await.unwrap(), 1);
        assert_eq!(cache.stats(Namespace::Derived).await.unwrap(), NamespaceStats::default());
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::open(CacheConfig::at(dir.path()).disabled())
            .await
            .unwrap();
        let key = CacheKey::raw("a");

        cache.put(&key, b"x").await.unwrap();
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.stats(Namespace::Raw).await.unwrap().entry_count, 0);
        assert!(!dir.path().join("raw").exists());
    }

    #[tokio::test]
    async fn test_concurrent_puts_same_key_last_writer_wins() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        let key = CacheKey::derived("p", "c", "m");

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let cache = cache.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move { cache.put(&key, &[i; 16]).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let payload = cache.get(&key).await.unwrap();
        assert_eq!(payload.len(), 16);
        assert!(payload.iter().all(|b| *b == payload[0]));
        assert_eq!(cache.stats(Namespace::Derived).await.unwrap().entry_count, 1);
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let ttl = Duration::from_secs(10);
        assert!(!is_expired(now - chrono::Duration::seconds(9), ttl, now));
        assert!(is_expired(now - chrono::Duration::seconds(10), ttl, now));
        assert!(!is_expired(now + chrono::Duration::seconds(5), ttl, now));
    }
}
