// src/profile.rs
//! Candidate profile loaded from a TOML file. The profile drives the LLM
//! prompts and seeds the skills/experiences tables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub name: String,
    pub email: String,
    pub headline: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub skills: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "experience")]
    pub experiences: Vec<ExperienceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub company: String,
    pub role: String,
    pub started: String,
    #[serde(default)]
    pub ended: Option<String>,
    #[serde(default)]
    pub summary: String,
}

impl CandidateProfile {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = crate::utils::read_file_content(path).await?;
        let profile: CandidateProfile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse profile: {}", path.display()))?;

        if profile.name.trim().is_empty() {
            anyhow::bail!("Profile has no name: {}", path.display());
        }

        Ok(profile)
    }

    /// Skills flattened to (category, name) pairs for the database.
    pub fn flat_skills(&self) -> Vec<(String, String)> {
        self.skills
            .iter()
            .flat_map(|(category, names)| {
                names
                    .iter()
                    .map(move |name| (category.clone(), name.clone()))
            })
            .collect()
    }

    /// Render the profile as the candidate block used in prompts.
    pub fn prompt_block(&self) -> String {
        let mut block = String::new();
        let _ = writeln!(block, "Name: {}", self.name);
        let _ = writeln!(block, "Headline: {}", self.headline);
        if !self.location.is_empty() {
            let _ = writeln!(block, "Location: {}", self.location);
        }

        if !self.skills.is_empty() {
            let _ = writeln!(block, "\nSkills:");
            for (category, names) in &self.skills {
                let _ = writeln!(block, "- {}: {}", category, names.join(", "));
            }
        }

        if !self.experiences.is_empty() {
            let _ = writeln!(block, "\nExperience:");
            for exp in &self.experiences {
                let period = match &exp.ended {
                    Some(ended) => format!("{} to {}", exp.started, ended),
                    None => format!("{} to present", exp.started),
                };
                let _ = writeln!(block, "- {} at {} ({})", exp.role, exp.company, period);
                if !exp.summary.is_empty() {
                    let _ = writeln!(block, "  {}", exp.summary);
                }
            }
        }

        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name = "Jordan Doe"
email = "jordan@example.com"
headline = "Senior Backend Engineer"
location = "Lyon, France"
links = ["https://github.com/jordan"]

[skills]
languages = ["Rust", "SQL"]
cloud = ["GCP"]

[[experience]]
company = "Acme"
role = "Backend Engineer"
started = "2021-03"
ended = "2024-06"
summary = "Built the billing pipeline."

[[experience]]
company = "Startup"
role = "Engineer"
started = "2024-07"
"#;

    #[test]
    fn test_parse_and_flatten() {
        let profile: CandidateProfile = toml::from_str(SAMPLE).unwrap();
        assert_eq!(profile.name, "Jordan Doe");
        assert_eq!(profile.experiences.len(), 2);
        assert_eq!(profile.experiences[1].ended, None);

        let skills = profile.flat_skills();
        assert!(skills.contains(&("languages".to_string(), "Rust".to_string())));
        assert_eq!(skills.len(), 3);
    }

    #[test]
    fn test_prompt_block_mentions_open_ended_role() {
        let profile: CandidateProfile = toml::from_str(SAMPLE).unwrap();
        let block = profile.prompt_block();
        assert!(block.contains("Engineer at Startup (2024-07 to present)"));
        assert!(block.contains("- languages: Rust, SQL"));
    }
}
