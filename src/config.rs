// src/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub data_path: PathBuf,
    pub output_path: PathBuf,
    pub site_path: PathBuf,
    pub database_path: PathBuf,
    pub profile_path: PathBuf,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub lock: LockSettings,
}

/// Remote object store holding the shared database copy and the lock marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub bucket: String,
    pub credentials_path: PathBuf,
    #[serde(default = "default_database_object")]
    pub database_object: String,
    #[serde(default = "default_lock_object")]
    pub lock_object: String,
}

/// Lock tuning. Defaults: 50 tries at 500ms between contended tries,
/// markers older than 300s are reclaimed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl LockSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

fn default_database_object() -> String {
    "jobpilot.db".to_string()
}

fn default_lock_object() -> String {
    "jobpilot.lock".to_string()
}

fn default_retry_attempts() -> u32 {
    50
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_stale_after_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    local: EnvironmentConfig,
    production: EnvironmentConfig,
}

impl EnvironmentConfig {
    /// Load configuration based on environment
    pub fn load() -> Result<Self> {
        let environment = Self::get_environment();
        info!("Loading configuration for environment: {}", environment);

        Self::load_from_file(&environment)
    }

    fn get_environment() -> String {
        std::env::var("JOBPILOT_ENV")
            .or_else(|_| std::env::var("ENVIRONMENT"))
            .or_else(|_| std::env::var("ENV"))
            .unwrap_or_else(|_| "local".to_string())
    }

    fn load_from_file(environment: &str) -> Result<Self> {
        let config_path = PathBuf::from("config.yaml");
        if !config_path.exists() {
            anyhow::bail!(
                "config.yaml not found in current directory. Cannot start without configuration."
            );
        }

        let config_content =
            std::fs::read_to_string(&config_path).context("Failed to read config.yaml")?;

        let config_file: ConfigFile =
            serde_yaml::from_str(&config_content).context("Failed to parse config.yaml")?;

        let env_config = match environment {
            "production" => config_file.production,
            _ => config_file.local,
        };

        Ok(env_config)
    }

    /// Ensure all required directories exist
    pub async fn ensure_directories(&self) -> Result<()> {
        crate::utils::ensure_directory(&self.data_path).await?;
        crate::utils::ensure_directory(&self.output_path).await?;
        crate::utils::ensure_directory(&self.site_path).await?;

        if let Some(db_parent) = self.database_path.parent() {
            crate::utils::ensure_directory(db_parent).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_config_defaults() {
        let yaml = "bucket: jobs-sync\ncredentials_path: secrets/sa.json\n";
        let remote: RemoteConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(remote.database_object, "jobpilot.db");
        assert_eq!(remote.lock_object, "jobpilot.lock");
    }

    #[test]
    fn test_lock_settings_defaults() {
        let lock = LockSettings::default();
        assert_eq!(lock.retry_attempts, 50);
        assert_eq!(lock.retry_delay(), Duration::from_millis(500));
        assert_eq!(lock.stale_after(), Duration::from_secs(300));
    }
}
