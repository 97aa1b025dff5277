// src/llm/mod.rs
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{error, info, warn};

pub mod prompts;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const MAX_OUTPUT_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Structured fit report the model is asked to return for a posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    pub score: f64,
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub talking_points: Vec<String>,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new() -> Result<Self> {
        let api_key =
            env::var("GEMINI_API_KEY").context("GEMINI_API_KEY environment variable not set")?;

        let model = env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    /// Score a posting against the candidate profile.
    pub async fn analyze_fit(
        &self,
        profile_block: &str,
        posting: &crate::scrape::JobPosting,
    ) -> Result<FitReport> {
        let prompt = prompts::fit_analysis_prompt(profile_block, posting);
        let text = self.generate(&prompt).await?;
        parse_fit_report(&text)
    }

    /// Tailored resume body in Typst markup for the posting.
    pub async fn tailor_resume(
        &self,
        profile_block: &str,
        posting: &crate::scrape::JobPosting,
        report: &FitReport,
    ) -> Result<String> {
        let prompt = prompts::resume_prompt(profile_block, posting, report);
        self.generate(&prompt).await
    }

    pub async fn draft_cover_letter(
        &self,
        profile_block: &str,
        posting: &crate::scrape::JobPosting,
        report: &FitReport,
    ) -> Result<String> {
        let prompt = prompts::cover_letter_prompt(profile_block, posting, report);
        self.generate(&prompt).await
    }

    /// Raw completion with bounded retry on rate limits and server errors.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.4,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            info!("Calling Gemini {} (attempt {})", self.model, attempt);

            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .context("Failed to send request to Gemini")?;

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                if attempt >= MAX_RETRIES {
                    anyhow::bail!("Gemini still failing after {} attempts: {}", attempt, status);
                }
                let delay = std::time::Duration::from_secs(2u64.pow(attempt));
                warn!("Gemini returned {}, retrying in {:?}", status, delay);
                tokio::time::sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                error!("Gemini error {}: {}", status, error_text);
                anyhow::bail!("Gemini returned error {}: {}", status, error_text);
            }

            let body: GenerateResponse = response
                .json()
                .await
                .context("Failed to parse Gemini response")?;

            let text = body
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content.parts.into_iter().next())
                .map(|p| p.text)
                .context("Gemini returned no candidates")?;

            return Ok(text);
        }
    }
}

/// Parse the model's fit report, tolerating markdown code fences around the
/// JSON body.
pub fn parse_fit_report(text: &str) -> Result<FitReport> {
    let stripped = strip_code_fences(text);
    let report: FitReport = serde_json::from_str(stripped.trim())
        .with_context(|| format!("Model did not return valid fit JSON: {}", stripped))?;

    if !(0.0..=10.0).contains(&report.score) {
        anyhow::bail!("Fit score out of range: {}", report.score);
    }

    Ok(report)
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    trimmed
        .lines()
        .skip(1)
        .take_while(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fit_report_plain() {
        let text = r#"{"score": 7.5, "summary": "Good match", "strengths": ["Rust"], "gaps": [], "talking_points": ["storage work"]}"#;
        let report = parse_fit_report(text).unwrap();
        assert_eq!(report.score, 7.5);
        assert_eq!(report.strengths, vec!["Rust"]);
    }

    #[test]
    fn test_parse_fit_report_fenced() {
        let text = "```json\n{\"score\": 4, \"summary\": \"Partial match\"}\n```";
        let report = parse_fit_report(text).unwrap();
        assert_eq!(report.score, 4.0);
        assert!(report.strengths.is_empty());
    }

    #[test]
    fn test_parse_fit_report_rejects_bad_score() {
        let text = r#"{"score": 42, "summary": "overflow"}"#;
        assert!(parse_fit_report(text).is_err());
    }

    #[test]
    fn test_parse_fit_report_rejects_prose() {
        assert!(parse_fit_report("I think this job fits quite well.").is_err());
    }
}
