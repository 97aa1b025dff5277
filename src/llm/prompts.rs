// src/llm/prompts.rs
use crate::scrape::JobPosting;

use super::FitReport;

// Postings can be arbitrarily long; keep the prompt within a sane budget.
const DESCRIPTION_BUDGET: usize = 6000;

pub fn fit_analysis_prompt(profile_block: &str, posting: &JobPosting) -> String {
    format!(
        r#"You are a career advisor analyzing job fit.

JOB POSTING:
Title: {}
Company: {}
Location: {}

{}

CANDIDATE:
{}

TASK: Analyze how well the candidate aligns with this posting. Respond with a
single JSON object and nothing else, using exactly these keys:
{{
  "score": <number from 1 to 10>,
  "summary": "<two sentences on overall fit>",
  "strengths": ["<aspect of the background that matches>", ...],
  "gaps": ["<requirement the candidate does not clearly meet>", ...],
  "talking_points": ["<specific point to emphasize in an interview>", ...]
}}"#,
        posting.title,
        posting.company,
        posting.location,
        crate::utils::truncate_text(&posting.description, DESCRIPTION_BUDGET),
        profile_block
    )
}

pub fn resume_prompt(profile_block: &str, posting: &JobPosting, report: &FitReport) -> String {
    format!(
        r#"Write the body of a one-page resume tailored to the posting below.

POSTING: {} at {}
KEY STRENGTHS TO EMPHASIZE: {}

CANDIDATE:
{}

Rules:
- Output Typst markup only: use = for section headings and - for bullets.
- Reorder and reword the candidate's real experience to foreground what the
  posting asks for. Never invent employers, titles or dates.
- Sections: Summary, Experience, Skills."#,
        posting.title,
        posting.company,
        report.strengths.join("; "),
        profile_block
    )
}

pub fn cover_letter_prompt(
    profile_block: &str,
    posting: &JobPosting,
    report: &FitReport,
) -> String {
    format!(
        r#"Write a cover letter for the posting below. Three short paragraphs,
no salutation placeholders, plain text only.

POSTING: {} at {} ({})
FIT SUMMARY: {}
TALKING POINTS: {}

CANDIDATE:
{}"#,
        posting.title,
        posting.company,
        posting.location,
        report.summary,
        report.talking_points.join("; "),
        profile_block
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::JobSource;

    fn posting() -> JobPosting {
        JobPosting {
            url: "https://example.com/1".to_string(),
            source: JobSource::Other,
            title: "Storage Engineer".to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            description: "x".repeat(10_000),
        }
    }

    #[test]
    fn test_fit_prompt_truncates_description() {
        let prompt = fit_analysis_prompt("Name: Jordan", &posting());
        assert!(prompt.len() < 8_000);
        assert!(prompt.contains("Storage Engineer"));
        assert!(prompt.contains("\"score\""));
    }
}
