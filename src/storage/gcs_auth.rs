// src/storage/gcs_auth.rs
//! Service-account authentication for the GCS backend: RS256 JWT bearer
//! grant exchanged for a cached access token.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::info;

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

// Tokens are valid for an hour; refresh a minute early.
const EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct GcsTokenProvider {
    client: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl GcsTokenProvider {
    pub fn from_key_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!("Failed to read service account key: {}", path.display())
        })?;

        let key: ServiceAccountKey = serde_json::from_str(&content)
            .context("Failed to parse service account key JSON")?;

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("Invalid private key in service account file")?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            key,
            encoding_key,
            cached: Mutex::new(None),
        })
    }

    /// Current access token, refreshed through the JWT bearer grant when
    /// missing or near expiry.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(EXPIRY_SLACK_SECS) {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.request_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn request_token(&self) -> Result<CachedToken> {
        let now = Utc::now();
        let claims = Claims {
            iss: self.key.client_email.clone(),
            scope: STORAGE_SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(60)).timestamp(),
        };

        let assertion = encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )
        .context("Failed to sign service account JWT")?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("Failed to reach token endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Token exchange failed with status {}: {}", status, body);
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        info!(
            "Obtained GCS access token for {} (expires in {}s)",
            self.key.client_email, token.expires_in
        );

        Ok(CachedToken {
            token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}
