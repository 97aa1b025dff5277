// src/db/models.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub url: String,
    pub source: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub fit_score: Option<f64>,
    pub fit_summary: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// A scraped posting before it has a database row.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub url: String,
    pub source: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Discovered,
    Analyzed,
    Applied,
    Interview,
    Offer,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Analyzed => "analyzed",
            Self::Applied => "applied",
            Self::Interview => "interview",
            Self::Offer => "offer",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "discovered" => Ok(Self::Discovered),
            "analyzed" => Ok(Self::Analyzed),
            "applied" => Ok(Self::Applied),
            "interview" => Ok(Self::Interview),
            "offer" => Ok(Self::Offer),
            "rejected" => Ok(Self::Rejected),
            other => anyhow::bail!(
                "Unknown status: {}. Use discovered, analyzed, applied, interview, offer or rejected",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Application {
    pub id: i64,
    pub job_id: i64,
    pub status: String,
    pub applied_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Application joined with the columns of its job that listings need.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApplicationOverview {
    pub id: i64,
    pub job_id: i64,
    pub status: String,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub company: String,
    pub fit_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Skill {
    pub id: i64,
    pub category: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Experience {
    pub id: i64,
    pub company: String,
    pub role: String,
    pub started: String,
    pub ended: Option<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecruiterContact {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub company: String,
    pub linkedin_url: Option<String>,
    pub notes: Option<String>,
    pub last_contacted_at: Option<DateTime<Utc>>,
}

/// Contact row as imported from CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocumentRecord {
    pub id: i64,
    pub job_id: i64,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ApplicationStatus::Discovered,
            ApplicationStatus::Analyzed,
            ApplicationStatus::Applied,
            ApplicationStatus::Interview,
            ApplicationStatus::Offer,
            ApplicationStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<ApplicationStatus>().unwrap(), status);
        }
        assert!("filed".parse::<ApplicationStatus>().is_err());
    }
}
