// src/storage/lock.rs
//! Best-effort mutual exclusion over the shared database file, built on a
//! store that only offers create/read/delete. The marker object's presence
//! means the file is checked out for writing; a marker older than the
//! staleness threshold is presumed abandoned and reclaimed by the next
//! acquirer. The store has no compare-and-swap, so acquisition re-reads the
//! marker after writing it and backs off when another owner won the race.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::object_store::ObjectStore;
use crate::config::LockSettings;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock not acquired after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("lock storage error: {0}")]
    Store(anyhow::Error),
}

/// Marker payload stored in the bucket while the database is checked out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMarker {
    pub locked_at: i64,
    pub process_id: u32,
    pub owner: Uuid,
}

impl LockMarker {
    fn new(owner: Uuid) -> Self {
        Self {
            locked_at: Utc::now().timestamp(),
            process_id: std::process::id(),
            owner,
        }
    }

    fn age(&self) -> Duration {
        let secs = Utc::now().timestamp().saturating_sub(self.locked_at);
        Duration::from_secs(secs.max(0) as u64)
    }

    fn is_stale(&self, threshold: Duration) -> bool {
        self.age() > threshold
    }
}

/// Proof of acquisition. Holders pass it back to [`LockManager::release`]
/// when the protected operation completes.
#[derive(Debug)]
pub struct LockHandle {
    owner: Uuid,
}

impl LockHandle {
    pub fn owner(&self) -> Uuid {
        self.owner
    }
}

#[derive(Debug, Clone)]
pub struct LockConfig {
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub stale_after: Duration,
}

impl From<&LockSettings> for LockConfig {
    fn from(settings: &LockSettings) -> Self {
        Self {
            retry_attempts: settings.retry_attempts,
            retry_delay: settings.retry_delay(),
            stale_after: settings.stale_after(),
        }
    }
}

pub struct LockManager {
    store: Arc<dyn ObjectStore>,
    key: String,
    config: LockConfig,
}

impl LockManager {
    pub fn new(store: Arc<dyn ObjectStore>, key: String, config: LockConfig) -> Self {
        Self { store, key, config }
    }

    /// Attempt to take the lock, retrying up to the configured budget.
    ///
    /// A corrupt or stale marker is removed and the attempt retried without
    /// sleeping; a fresh marker held by someone else costs one retry delay.
    pub async fn acquire(&self) -> Result<LockHandle, LockError> {
        let owner = Uuid::new_v4();

        for attempt in 1..=self.config.retry_attempts {
            match self.store.get(&self.key).await.map_err(LockError::Store)? {
                Some(bytes) => match serde_json::from_slice::<LockMarker>(&bytes) {
                    Ok(marker) if marker.is_stale(self.config.stale_after) => {
                        warn!(
                            "Reclaiming stale lock {} held by pid {} for {}s",
                            self.key,
                            marker.process_id,
                            marker.age().as_secs()
                        );
                        self.store.delete(&self.key).await.map_err(LockError::Store)?;
                        continue;
                    }
                    Ok(_) => {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                    Err(e) => {
                        warn!("Removing unreadable lock marker {}: {}", self.key, e);
                        self.store.delete(&self.key).await.map_err(LockError::Store)?;
                        continue;
                    }
                },
                None => {
                    let marker = LockMarker::new(owner);
                    let payload = serde_json::to_vec(&marker)
                        .map_err(|e| LockError::Store(e.into()))?;
                    self.store
                        .put(&self.key, &payload)
                        .await
                        .map_err(LockError::Store)?;

                    // The absence check and the write are separate store
                    // calls; confirm we are still the owner before
                    // proceeding.
                    if self.confirm_owner(owner).await? {
                        info!(
                            "Acquired lock {} on attempt {} (owner {})",
                            self.key, attempt, owner
                        );
                        return Ok(LockHandle { owner });
                    }

                    warn!("Lost lock race on {}, backing off", self.key);
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }

        Err(LockError::Exhausted {
            attempts: self.config.retry_attempts,
        })
    }

    async fn confirm_owner(&self, owner: Uuid) -> Result<bool, LockError> {
        let bytes = match self.store.get(&self.key).await.map_err(LockError::Store)? {
            Some(bytes) => bytes,
            None => return Ok(false),
        };

        match serde_json::from_slice::<LockMarker>(&bytes) {
            Ok(marker) => Ok(marker.owner == owner),
            Err(_) => Ok(false),
        }
    }

    /// Release the lock taken by `handle`. Deleting an already-absent marker
    /// is a success.
    pub async fn release(&self, handle: LockHandle) -> Result<()> {
        self.store.delete(&self.key).await?;
        info!("Released lock {} (owner {})", self.key, handle.owner);
        Ok(())
    }

    /// Remove the marker regardless of who holds it. Used by the unlock
    /// command to recover from a crashed holder without waiting out the
    /// staleness window.
    pub async fn force_release(&self) -> Result<()> {
        self.store.delete(&self.key).await?;
        info!("Force-released lock {}", self.key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::object_store::LocalStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    fn manager(store: Arc<dyn ObjectStore>, attempts: u32, delay_ms: u64) -> LockManager {
        LockManager::new(
            store,
            "test.lock".to_string(),
            LockConfig {
                retry_attempts: attempts,
                retry_delay: Duration::from_millis(delay_ms),
                stale_after: Duration::from_secs(300),
            },
        )
    }

    fn local_store(dir: &tempfile::TempDir) -> Arc<dyn ObjectStore> {
        Arc::new(LocalStore::new(dir.path().to_path_buf()))
    }

    #[tokio::test]
    async fn test_acquire_creates_marker_release_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = local_store(&dir);
        let mgr = manager(store.clone(), 3, 50);

        let handle = mgr.acquire().await.unwrap();
        let bytes = store.get("test.lock").await.unwrap().unwrap();
        let marker: LockMarker = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(marker.owner, handle.owner());
        assert_eq!(marker.process_id, std::process::id());

        mgr.release(handle).await.unwrap();
        assert!(!store.exists("test.lock").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(local_store(&dir), 3, 50);

        // No marker exists at all
        mgr.force_release().await.unwrap();
        mgr.force_release().await.unwrap();
    }

    #[tokio::test]
    async fn test_held_lock_blocks_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let store = local_store(&dir);
        let holder = manager(store.clone(), 3, 50);
        let contender = manager(store.clone(), 3, 100);

        let handle = holder.acquire().await.unwrap();

        let started = Instant::now();
        let result = contender.acquire().await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(LockError::Exhausted { attempts: 3 })));
        assert!(elapsed >= Duration::from_millis(250), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);

        holder.release(handle).await.unwrap();
        let handle = contender.acquire().await.unwrap();
        contender.release(handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_exhausted_with_single_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let store = local_store(&dir);
        let holder = manager(store.clone(), 1, 50);
        let contender = manager(store, 1, 50);

        let _handle = holder.acquire().await.unwrap();
        let result = contender.acquire().await;
        assert!(matches!(result, Err(LockError::Exhausted { attempts: 1 })));
    }

    #[tokio::test]
    async fn test_stale_marker_is_reclaimed_within_one_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = local_store(&dir);

        let stale = LockMarker {
            locked_at: Utc::now().timestamp() - 400,
            process_id: 99999,
            owner: Uuid::new_v4(),
        };
        store
            .put("test.lock", &serde_json::to_vec(&stale).unwrap())
            .await
            .unwrap();

        // Long retry delay: success must not need to wait it out
        let mgr = manager(store.clone(), 3, 2000);
        let started = Instant::now();
        let handle = mgr.acquire().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        let bytes = store.get("test.lock").await.unwrap().unwrap();
        let marker: LockMarker = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(marker.owner, handle.owner());
    }

    #[tokio::test]
    async fn test_corrupt_marker_self_heals() {
        let dir = tempfile::tempdir().unwrap();
        let store = local_store(&dir);
        store.put("test.lock", b"not json at all").await.unwrap();

        let mgr = manager(store.clone(), 3, 2000);
        let started = Instant::now();
        mgr.acquire().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    /// Store that hands the marker to a competing owner right after every
    /// write, exercising the post-write confirmation read.
    struct RacingStore {
        inner: LocalStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl ObjectStore for RacingStore {
        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
            self.inner.put(key, data).await?;
            if !self.raced.swap(true, Ordering::SeqCst) {
                let rival = LockMarker::new(Uuid::new_v4());
                self.inner
                    .put(key, &serde_json::to_vec(&rival).unwrap())
                    .await?;
            }
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list(prefix).await
        }
    }

    #[tokio::test]
    async fn test_lost_creation_race_backs_off() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(RacingStore {
            inner: LocalStore::new(dir.path().to_path_buf()),
            raced: AtomicBool::new(false),
        });

        let mgr = manager(store, 1, 50);
        let result = mgr.acquire().await;
        assert!(matches!(result, Err(LockError::Exhausted { attempts: 1 })));
    }
}
