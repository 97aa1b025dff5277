// src/storage/sync.rs
//! Synchronization of the local SQLite working copy with its remote object.
//! All database access goes through the scoped sessions here: they take the
//! lock, pull the remote copy, run the caller's operations in a transaction
//! and either commit-and-push or roll back, releasing the lock on every exit
//! path. Raw pull/push are deliberately not public; bypassing the lock is
//! how torn reads happen.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{info, warn};

use super::lock::{LockConfig, LockManager};
use super::object_store::ObjectStore;
use crate::config::EnvironmentConfig;

pub type SessionFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

pub struct SyncManager {
    store: Arc<dyn ObjectStore>,
    lock: LockManager,
    database_object: String,
    local_path: PathBuf,
}

impl SyncManager {
    pub fn new(store: Arc<dyn ObjectStore>, config: &EnvironmentConfig) -> Self {
        let lock = LockManager::new(
            store.clone(),
            config.remote.lock_object.clone(),
            LockConfig::from(&config.lock),
        );

        Self {
            store,
            lock,
            database_object: config.remote.database_object.clone(),
            local_path: config.database_path.clone(),
        }
    }

    /// Run `op` inside a locked read-modify-write cycle: acquire, pull,
    /// transact, commit, push, release. On error the transaction rolls back
    /// and the remote copy is left untouched; the lock is released either
    /// way. A holder that dies without releasing is reclaimed by the next
    /// acquirer once the marker goes stale.
    pub async fn with_session<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> SessionFuture<'c, T>,
    {
        let handle = self.lock.acquire().await?;
        let result = self.run_locked_write(op).await;
        let released = self.lock.release(handle).await;

        let value = result?;
        released?;
        Ok(value)
    }

    /// Read-only variant: acquire, pull, run, release. Nothing is pushed, so
    /// the remote copy cannot be affected by the caller's queries.
    pub async fn with_read_session<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> SessionFuture<'c, T>,
    {
        let handle = self.lock.acquire().await?;
        let result = self.run_locked_read(op).await;
        let released = self.lock.release(handle).await;

        let value = result?;
        released?;
        Ok(value)
    }

    /// Remove the lock marker regardless of holder. Recovery tool for a
    /// crashed process when waiting out the staleness window is not
    /// acceptable.
    pub async fn force_unlock(&self) -> Result<()> {
        self.lock.force_release().await
    }

    async fn run_locked_write<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> SessionFuture<'c, T>,
    {
        self.pull().await?;

        let mut conn = self.open_local().await?;
        let mut tx = conn
            .begin()
            .await
            .context("Failed to begin local transaction")?;

        match op(&mut *tx).await {
            Ok(value) => {
                tx.commit()
                    .await
                    .context("Failed to commit local transaction")?;
                conn.close()
                    .await
                    .context("Failed to close local database")?;
                self.push().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback after failed session also failed: {}", rollback_err);
                }
                let _ = conn.close().await;
                Err(e)
            }
        }
    }

    async fn run_locked_read<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> SessionFuture<'c, T>,
    {
        self.pull().await?;

        let mut conn = self.open_local().await?;
        let result = op(&mut conn).await;
        let _ = conn.close().await;
        result
    }

    async fn open_local(&self) -> Result<SqliteConnection> {
        // The working copy must stay a single self-contained file for
        // whole-file upload; WAL would leave committed rows in a sidecar.
        let options = SqliteConnectOptions::new()
            .filename(&self.local_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);

        options
            .connect()
            .await
            .with_context(|| format!("Failed to open {}", self.local_path.display()))
    }

    /// Download the remote copy over the local working file. A missing
    /// remote object means a fresh store; the local file is left as-is.
    async fn pull(&self) -> Result<()> {
        match self.store.get(&self.database_object).await? {
            Some(bytes) => {
                if let Some(parent) = self.local_path.parent() {
                    tokio::fs::create_dir_all(parent).await.with_context(|| {
                        format!("Failed to create {}", parent.display())
                    })?;
                }
                tokio::fs::write(&self.local_path, &bytes)
                    .await
                    .with_context(|| {
                        format!("Failed to write {}", self.local_path.display())
                    })?;
                info!(
                    "Pulled {} ({} bytes) to {}",
                    self.database_object,
                    bytes.len(),
                    self.local_path.display()
                );
            }
            None => {
                info!(
                    "No remote copy of {} yet, keeping local file",
                    self.database_object
                );
            }
        }
        Ok(())
    }

    /// Upload the local working file over the remote copy. Last writer wins.
    async fn push(&self) -> Result<()> {
        let bytes = tokio::fs::read(&self.local_path)
            .await
            .with_context(|| format!("Failed to read {}", self.local_path.display()))?;

        self.store.put(&self.database_object, &bytes).await?;
        info!(
            "Pushed {} ({} bytes) from {}",
            self.database_object,
            bytes.len(),
            self.local_path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LockSettings, RemoteConfig};
    use crate::storage::object_store::LocalStore;

    fn test_config(dir: &std::path::Path, db_file: &str) -> EnvironmentConfig {
        EnvironmentConfig {
            data_path: dir.join("data"),
            output_path: dir.join("out"),
            site_path: dir.join("site"),
            database_path: dir.join(db_file),
            profile_path: dir.join("profile.toml"),
            remote: RemoteConfig {
                bucket: "test".to_string(),
                credentials_path: dir.join("sa.json"),
                database_object: "shared.db".to_string(),
                lock_object: "shared.lock".to_string(),
            },
            lock: LockSettings {
                retry_attempts: 3,
                retry_delay_ms: 50,
                stale_after_secs: 300,
            },
        }
    }

    fn managers(dir: &tempfile::TempDir) -> (Arc<dyn ObjectStore>, SyncManager, SyncManager) {
        let store: Arc<dyn ObjectStore> =
            Arc::new(LocalStore::new(dir.path().join("bucket")));
        let a = SyncManager::new(store.clone(), &test_config(dir.path(), "a.db"));
        let b = SyncManager::new(store.clone(), &test_config(dir.path(), "b.db"));
        (store, a, b)
    }

    #[tokio::test]
    async fn test_push_pull_round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, a, b) = managers(&dir);

        tokio::fs::write(&a.local_path, b"sqlite bytes here")
            .await
            .unwrap();
        a.push().await.unwrap();
        b.pull().await.unwrap();

        let original = tokio::fs::read(&a.local_path).await.unwrap();
        let copied = tokio::fs::read(&b.local_path).await.unwrap();
        assert_eq!(original, copied);
    }

    #[tokio::test]
    async fn test_committed_session_is_visible_from_second_replica() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, a, b) = managers(&dir);

        a.with_session(|conn| {
            Box::pin(async move {
                sqlx::query("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)")
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("INSERT INTO kv (k, v) VALUES ('status', 'applied')")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap();

        let value: String = b
            .with_read_session(|conn| {
                Box::pin(async move {
                    let row: (String,) =
                        sqlx::query_as("SELECT v FROM kv WHERE k = 'status'")
                            .fetch_one(&mut *conn)
                            .await?;
                    Ok(row.0)
                })
            })
            .await
            .unwrap();

        assert_eq!(value, "applied");
    }

    #[tokio::test]
    async fn test_failed_session_leaves_remote_untouched_and_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let (store, a, _b) = managers(&dir);

        a.with_session(|conn| {
            Box::pin(async move {
                sqlx::query("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap();

        let before = store.get("shared.db").await.unwrap().unwrap();

        let result: Result<()> = a
            .with_session(|conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO kv (k, v) VALUES ('doomed', 'row')")
                        .execute(&mut *conn)
                        .await?;
                    anyhow::bail!("caller blew up")
                })
            })
            .await;
        assert!(result.is_err());

        let after = store.get("shared.db").await.unwrap().unwrap();
        assert_eq!(before, after);
        assert!(!store.exists("shared.lock").await.unwrap());

        // The rolled-back row must not exist on a fresh pull either
        let count: i64 = a
            .with_read_session(|conn| {
                Box::pin(async move {
                    let row: (i64,) =
                        sqlx::query_as("SELECT COUNT(*) FROM kv WHERE k = 'doomed'")
                            .fetch_one(&mut *conn)
                            .await?;
                    Ok(row.0)
                })
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_session_fails_hard_when_lock_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let (store, a, _b) = managers(&dir);

        // Simulate another process holding a fresh lock
        let marker = serde_json::json!({
            "locked_at": chrono::Utc::now().timestamp(),
            "process_id": 4242,
            "owner": uuid::Uuid::new_v4(),
        });
        store
            .put("shared.lock", marker.to_string().as_bytes())
            .await
            .unwrap();

        let result: Result<()> = a
            .with_session(|_conn| Box::pin(async move { Ok(()) }))
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("not acquired"), "{}", err);
    }
}
