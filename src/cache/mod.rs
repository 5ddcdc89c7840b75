//! In-process cache of minified assets
//!
//! Minified bundles are also persisted on disk; this moka cache spares the
//! file read on every request. Entries are keyed by `kind/set/version`.

use axum::body::Bytes;
use moka::future::Cache;
use std::time::Duration;

use crate::config::AssetKind;

/// Default maximum number of cached bundles
const DEFAULT_MAX_CAPACITY: u64 = 256;

/// Default TTL for cached bundles (1 hour)
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache of minified asset bundles
#[derive(Clone)]
pub struct AssetCache {
    cache: Cache<String, Bytes>,
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCache")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl Default for AssetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();

        Self { cache }
    }

    /// Cache key of a bundle
    pub fn key(kind: AssetKind, set: &str, version: &str) -> String {
        format!("{}/{}/{}", kind, set, version)
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: String, content: Bytes) {
        self.cache.insert(key, content).await;
    }

    /// Drop every cached bundle of a kind
    pub fn invalidate_kind(&self, kind: AssetKind) -> anyhow::Result<()> {
        let prefix = format!("{}/", kind);
        self.cache
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
            .map_err(|e| anyhow::anyhow!("Failed to invalidate {} assets: {}", kind, e))?;
        Ok(())
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(AssetCache::key(AssetKind::Css, "main", "1.2"), "css/main/1.2");
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = AssetCache::new();
        let key = AssetCache::key(AssetKind::Js, "app", "latest");

        assert!(cache.get(&key).await.is_none());
        cache.insert(key.clone(), Bytes::from_static(b"a=1;")).await;
        assert_eq!(cache.get(&key).await.unwrap(), Bytes::from_static(b"a=1;"));
    }

    #[tokio::test]
    async fn test_invalidate_kind() {
        let cache = AssetCache::new();
        let css = AssetCache::key(AssetKind::Css, "main", "latest");
        let js = AssetCache::key(AssetKind::Js, "main", "latest");
        cache.insert(css.clone(), Bytes::from_static(b"a{}")).await;
        cache.insert(js.clone(), Bytes::from_static(b"a=1")).await;

        cache.invalidate_kind(AssetKind::Css).unwrap();
        assert!(cache.get(&css).await.is_none());
        assert!(cache.get(&js).await.is_some());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = AssetCache::with_capacity_and_ttl(10, Duration::from_millis(50));
        cache.insert("css/a/1".to_string(), Bytes::from_static(b"x")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get("css/a/1").await.is_none());
    }
}
