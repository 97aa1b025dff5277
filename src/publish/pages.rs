// src/publish/pages.rs
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::process::Command;
use tracing::{info, warn};

use crate::db::models::ApplicationOverview;

/// Writes the public search-log pages into a Jekyll site directory and
/// optionally commits them.
pub struct PagesPublisher {
    site_dir: PathBuf,
}

impl PagesPublisher {
    pub fn new(site_dir: PathBuf) -> Self {
        Self { site_dir }
    }

    /// Render the application pipeline to `_posts/` as a dated markdown
    /// post. Returns the path written.
    pub async fn write_pipeline_post(
        &self,
        applications: &[ApplicationOverview],
    ) -> Result<PathBuf> {
        let posts_dir = self.site_dir.join("_posts");
        crate::utils::ensure_directory(&posts_dir).await?;

        let today = Utc::now().format("%Y-%m-%d");
        let path = posts_dir.join(format!("{}-pipeline.md", today));

        let mut content = format!(
            "---\nlayout: post\ntitle: \"Job search pipeline\"\ndate: {}\n---\n\n",
            today
        );
        content.push_str("| Company | Role | Status | Score |\n");
        content.push_str("|---------|------|--------|-------|\n");

        for app in applications {
            let score = app
                .fit_score
                .map(|s| format!("{:.1}", s))
                .unwrap_or_else(|| "-".to_string());
            content.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                app.company, app.title, app.status, score
            ));
        }

        crate::utils::write_file_content(&path, &content).await?;
        info!("Wrote pipeline post: {}", path.display());
        Ok(path)
    }

    /// Commit and push the site directory if it is a git checkout. A site
    /// directory without git is left for manual publishing.
    pub fn publish(&self) -> Result<()> {
        if !self.site_dir.join(".git").exists() {
            warn!(
                "{} is not a git checkout, skipping push",
                self.site_dir.display()
            );
            return Ok(());
        }

        let message = format!("Update pipeline {}", Utc::now().format("%Y-%m-%d %H:%M"));

        for args in [
            vec!["add", "-A"],
            vec!["commit", "-m", message.as_str()],
            vec!["push"],
        ] {
            let status = Command::new("git")
                .args(&args)
                .current_dir(&self.site_dir)
                .status()
                .context("Failed to execute git")?;

            if !status.success() {
                anyhow::bail!("git {} failed in {}", args.join(" "), self.site_dir.display());
            }
        }

        info!("Pushed site update from {}", self.site_dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_pipeline_post_contains_rows() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = PagesPublisher::new(dir.path().to_path_buf());

        let apps = vec![ApplicationOverview {
            id: 1,
            job_id: 1,
            status: "applied".to_string(),
            updated_at: Utc::now(),
            title: "Storage Engineer".to_string(),
            company: "Acme".to_string(),
            fit_score: Some(8.0),
        }];

        let path = publisher.write_pipeline_post(&apps).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("| Acme | Storage Engineer | applied | 8.0 |"));
        assert!(content.starts_with("---\nlayout: post"));
    }
}
