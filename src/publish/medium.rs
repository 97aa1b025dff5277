// src/publish/medium.rs
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::env;
use tracing::info;

const MEDIUM_API_BASE: &str = "https://api.medium.com/v1";

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: UserData,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
pub struct PostedArticle {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    data: PostedArticle,
}

pub struct MediumClient {
    client: Client,
    token: String,
}

impl MediumClient {
    pub fn new() -> Result<Self> {
        let token = env::var("MEDIUM_TOKEN")
            .context("MEDIUM_TOKEN environment variable not set")?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, token })
    }

    /// Create a markdown draft on the authenticated user's account.
    pub async fn post_draft(
        &self,
        title: &str,
        markdown: &str,
        tags: &[String],
    ) -> Result<PostedArticle> {
        let user = self.current_user().await?;

        let payload = json!({
            "title": title,
            "contentFormat": "markdown",
            "content": markdown,
            "tags": tags,
            "publishStatus": "draft",
        });

        let response = self
            .client
            .post(format!("{}/users/{}/posts", MEDIUM_API_BASE, user.id))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .context("Failed to create Medium post")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Medium post failed with status {}: {}", status, body);
        }

        let posted: PostResponse = response
            .json()
            .await
            .context("Failed to parse Medium post response")?;

        info!(
            "Created Medium draft '{}' for @{}",
            title, user.username
        );
        Ok(posted.data)
    }

    async fn current_user(&self) -> Result<UserData> {
        let response = self
            .client
            .get(format!("{}/me", MEDIUM_API_BASE))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to fetch Medium user")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Medium user lookup failed with status {}: {}", status, body);
        }

        let user: UserResponse = response
            .json()
            .await
            .context("Failed to parse Medium user response")?;

        Ok(user.data)
    }
}
