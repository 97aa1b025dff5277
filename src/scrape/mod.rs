// src/scrape/mod.rs
use serde::{Deserialize, Serialize};

pub mod job_scraper;

pub use job_scraper::JobScraper;

/// Content extracted from a single posting page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub url: String,
    pub source: JobSource,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Linkedin,
    Glassdoor,
    Other,
}

impl JobSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linkedin => "linkedin",
            Self::Glassdoor => "glassdoor",
            Self::Other => "other",
        }
    }

    pub fn from_url(url: &str) -> Self {
        if url.contains("linkedin.com") {
            Self::Linkedin
        } else if url.contains("glassdoor.") {
            Self::Glassdoor
        } else {
            Self::Other
        }
    }
}

/// Keyword/location query for the listing search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keywords: String,
    pub location: String,
    pub limit: usize,
}
