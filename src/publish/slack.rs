// src/publish/slack.rs
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use std::env;
use tracing::info;

use crate::db::Job;
use crate::llm::FitReport;

pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new() -> Result<Self> {
        let webhook_url = env::var("SLACK_WEBHOOK_URL")
            .context("SLACK_WEBHOOK_URL environment variable not set")?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            webhook_url,
        })
    }

    pub async fn notify_match(&self, job: &Job, report: &FitReport) -> Result<()> {
        let text = format!(
            ":dart: *{}* at *{}* scored {:.1}/10\n{}\n{}",
            job.title, job.company, report.score, report.summary, job.url
        );
        self.post(&text).await
    }

    pub async fn notify_status_change(&self, job: &Job, status: &str) -> Result<()> {
        let text = format!(
            ":memo: {} at {} moved to *{}*",
            job.title, job.company, status
        );
        self.post(&text).await
    }

    async fn post(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .context("Failed to send Slack notification")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack webhook returned {}: {}", status, body);
        }

        info!("Posted Slack notification");
        Ok(())
    }
}
