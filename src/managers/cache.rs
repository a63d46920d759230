//! Manager-level entity cache.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use moka::future::Cache;
use sha2::{Digest, Sha256};

/// Sliding expiration applied to every entry.
const TIME_TO_IDLE: Duration = Duration::from_secs(60);

/// Upper bound on cached entries per manager.
const MAX_CAPACITY: u64 = 1_024;

/// Content-addressed cache shared by the read paths of a manager.
///
/// Keys are fingerprints of the finder arguments, so distinct finders never
/// collide even when they resolve the same entity. Thread-safe; shared
/// across concurrent transactions.
#[derive(Debug, Clone)]
pub(crate) struct EntityCache<T: Clone + Send + Sync + 'static> {
    inner: Cache<String, T>,
}

impl<T: Clone + Send + Sync + 'static> EntityCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Cache::builder()
                .time_to_idle(TIME_TO_IDLE)
                .max_capacity(MAX_CAPACITY)
                .build(),
        }
    }

    pub(crate) async fn get(&self, key: &str) -> Option<T> {
        self.inner.get(key).await
    }

    pub(crate) async fn insert(&self, key: String, value: T) {
        self.inner.insert(key, value).await;
    }

    pub(crate) async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub(crate) fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

/// Fingerprint of a finder invocation: entity kind, finder name, arguments.
pub(crate) fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // Separator prevents ambiguity between ("ab","c") and ("a","bc").
        hasher.update([0x1f]);
    }
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprints_are_argument_sensitive() {
        assert_ne!(fingerprint(&["a", "bc"]), fingerprint(&["ab", "c"]));
        assert_ne!(
            fingerprint(&["token", "by_id", "x"]),
            fingerprint(&["token", "by_reference_id", "x"])
        );
        assert_eq!(fingerprint(&["a", "b"]), fingerprint(&["a", "b"]));
    }

    #[tokio::test]
    async fn invalidation_removes_entries() {
        let cache: EntityCache<String> = EntityCache::new();
        cache.insert("k".to_string(), "v".to_string()).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        cache.invalidate("k").await;
        assert!(cache.get("k").await.is_none());
    }
}
