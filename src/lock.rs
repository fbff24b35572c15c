//! TTL advisory locking over [`LockStore`].
//!
//! A lock is held iff its `expires_at` lies in the future. Expiry is the
//! only crash-recovery mechanism: a holder that dies without releasing
//! blocks nothing once the TTL passes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use crate::store::LockStore;

pub struct LockManager {
    store: Arc<dyn LockStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Tries to win the named lock for `ttl` from now.
    ///
    /// `Ok(false)` is live contention. `Err` is a lock-store failure and
    /// callers must treat it as "do not run", never as "assume free".
    pub async fn acquire(&self, name: &str, ttl: Duration) -> Result<bool> {
        let now_ms = Utc::now().timestamp_millis();
        // Saturate oversized TTLs; a wrapped expiry would read as already
        // expired and hand the lock out twice.
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_ms = now_ms.saturating_add(ttl_ms);
        let acquired = self.store.try_acquire(name, now_ms, expires_ms).await?;
        if acquired {
            tracing::debug!(target: "lock", name, ttl_secs = ttl.as_secs(), "lock acquired");
        } else {
            tracing::info!(target: "lock", name, "lock already held");
        }
        Ok(acquired)
    }

    /// Best-effort release. A failure is logged and swallowed; the TTL
    /// bounds how long the stale row can block the next run.
    pub async fn release(&self, name: &str) {
        if let Err(err) = self.store.release(name).await {
            tracing::warn!(target: "lock", name, "lock release failed, expiry will reclaim it: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use crate::store::{LockRow, SqliteStore};

    struct ExplodingLockStore;

    #[async_trait]
    impl LockStore for ExplodingLockStore {
        async fn try_acquire(&self, _name: &str, _now_ms: i64, _expires_ms: i64) -> Result<bool> {
            Err(anyhow!("disk on fire"))
        }

        async fn release(&self, _name: &str) -> Result<()> {
            Err(anyhow!("disk still on fire"))
        }

        async fn get(&self, _name: &str) -> Result<Option<LockRow>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn second_acquire_loses_while_ttl_is_live() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let manager = LockManager::new(store);

        assert!(manager.acquire("ingest", Duration::from_secs(60)).await.unwrap());
        assert!(!manager.acquire("ingest", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn zero_ttl_lock_is_immediately_reclaimable() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let manager = LockManager::new(store);

        assert!(manager.acquire("ingest", Duration::ZERO).await.unwrap());
        assert!(manager.acquire("ingest", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn oversized_ttl_saturates_and_still_excludes() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let manager = LockManager::new(store);

        assert!(manager.acquire("ingest", Duration::MAX).await.unwrap());
        assert!(
            !manager.acquire("ingest", Duration::from_secs(60)).await.unwrap(),
            "an oversized ttl must pin the expiry to the far future, not wrap past it"
        );
    }

    #[tokio::test]
    async fn release_frees_the_lock_for_the_next_caller() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let manager = LockManager::new(store);

        assert!(manager.acquire("ingest", Duration::from_secs(60)).await.unwrap());
        manager.release("ingest").await;
        assert!(manager.acquire("ingest", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_propagates_store_failure() {
        let manager = LockManager::new(Arc::new(ExplodingLockStore));
        assert!(manager.acquire("ingest", Duration::from_secs(60)).await.is_err());
    }

    #[tokio::test]
    async fn release_swallows_store_failure() {
        let manager = LockManager::new(Arc::new(ExplodingLockStore));
        // Must not panic or propagate; expiry is the fallback.
        manager.release("ingest").await;
    }
}
