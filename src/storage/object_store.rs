// src/storage/object_store.rs
//! Object store abstraction over the remote bucket holding the shared
//! database copy and the lock marker. Backends: GCS over its JSON API,
//! and a plain directory for tests and offline use.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{info, warn};

use super::gcs_auth::GcsTokenProvider;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Returns None when the object does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

const GCS_API_BASE: &str = "https://storage.googleapis.com/storage/v1/b";
const GCS_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1/b";

pub struct GcsStore {
    client: Client,
    bucket: String,
    tokens: GcsTokenProvider,
}

impl GcsStore {
    pub fn new(bucket: String, tokens: GcsTokenProvider) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            bucket,
            tokens,
        })
    }

    /// Object URL with the name percent-encoded as a single path segment.
    fn object_url(&self, key: &str, media: bool) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}/o", GCS_API_BASE, self.bucket))
            .context("Invalid GCS object URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("GCS URL cannot be a base"))?
            .push(key);
        if media {
            url.query_pairs_mut().append_pair("alt", "media");
        }
        Ok(url)
    }

    fn upload_url(&self, key: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}/o", GCS_UPLOAD_BASE, self.bucket))
            .context("Invalid GCS upload URL")?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(self.object_url(key, false)?)
            .bearer_auth(&token)
            .send()
            .await
            .with_context(|| format!("Failed to stat gs://{}/{}", self.bucket, key))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("GCS stat failed with status {}: {}", status, body)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(self.object_url(key, true)?)
            .bearer_auth(&token)
            .send()
            .await
            .with_context(|| format!("Failed to download gs://{}/{}", self.bucket, key))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .context("Failed to read GCS object body")?;
                Ok(Some(bytes.to_vec()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("GCS download failed with status {}: {}", status, body)
            }
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(self.upload_url(key)?)
            .bearer_auth(&token)
            .header("Content-Type", "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await
            .with_context(|| format!("Failed to upload gs://{}/{}", self.bucket, key))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GCS upload failed with status {}: {}", status, body);
        }

        info!("Uploaded gs://{}/{} ({} bytes)", self.bucket, key, data.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .delete(self.object_url(key, false)?)
            .bearer_auth(&token)
            .send()
            .await
            .with_context(|| format!("Failed to delete gs://{}/{}", self.bucket, key))?;

        match response.status() {
            // Deleting a missing object is not an error for callers
            StatusCode::NOT_FOUND => {
                warn!("Delete of missing object gs://{}/{}", self.bucket, key);
                Ok(())
            }
            status if status.is_success() => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("GCS delete failed with status {}: {}", status, body)
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let token = self.tokens.access_token().await?;
        let mut url = Url::parse(&format!("{}/{}/o", GCS_API_BASE, self.bucket))
            .context("Invalid GCS list URL")?;
        url.query_pairs_mut().append_pair("prefix", prefix);

        let response = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .with_context(|| format!("Failed to list gs://{}/{}*", self.bucket, prefix))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GCS list failed with status {}: {}", status, body);
        }

        let listing: ListResponse = response
            .json()
            .await
            .context("Failed to parse GCS list response")?;

        Ok(listing.items.into_iter().map(|o| o.name).collect())
    }
}

/// Directory-backed store. Object keys map to file names; slashes in keys
/// become subdirectories.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::metadata(self.object_path(key)).await.is_ok())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.object_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read object {}", key)),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write object {}", key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.object_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete object {}", key)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();

        if !self.root.exists() {
            return Ok(names);
        }

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to read {}", self.root.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if entry.path().is_file() && name.starts_with(prefix) {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());

        assert!(!store.exists("a.db").await.unwrap());
        assert!(store.get("a.db").await.unwrap().is_none());

        store.put("a.db", b"payload").await.unwrap();
        assert!(store.exists("a.db").await.unwrap());
        assert_eq!(store.get("a.db").await.unwrap().unwrap(), b"payload");

        store.put("a.lock", b"{}").await.unwrap();
        let names = store.list("a.").await.unwrap();
        assert_eq!(names, vec!["a.db".to_string(), "a.lock".to_string()]);

        store.delete("a.db").await.unwrap();
        assert!(!store.exists("a.db").await.unwrap());
        // Deleting a missing object is fine
        store.delete("a.db").await.unwrap();
    }
}
