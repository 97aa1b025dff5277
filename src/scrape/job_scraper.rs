// src/scrape/job_scraper.rs
use super::{JobPosting, JobSource, SearchQuery};
use anyhow::{Context, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{info, warn};

const SEARCH_PAGE_SIZE: usize = 25;

pub struct JobScraper {
    client: Client,
}

impl JobScraper {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Fetch a posting page and extract its content.
    pub async fn fetch_posting(&self, url: &str) -> Result<JobPosting> {
        info!("Fetching job posting: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch job posting")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let html = response
            .text()
            .await
            .context("Failed to read response body")?;

        let posting = self
            .extract_posting(url, &html)
            .context("Failed to extract job content from page")?;

        info!(
            "Extracted posting: {} at {}",
            posting.title, posting.company
        );
        Ok(posting)
    }

    /// LinkedIn guest search: returns posting URLs for a keyword/location
    /// query, paging until `limit` is reached or a page comes back empty.
    pub async fn search_linkedin(&self, query: &SearchQuery) -> Result<Vec<String>> {
        let mut urls = Vec::new();
        let mut start = 0usize;

        while urls.len() < query.limit {
            let start_param = start.to_string();
            let response = self
                .client
                .get("https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search")
                .query(&[
                    ("keywords", query.keywords.as_str()),
                    ("location", query.location.as_str()),
                    ("start", start_param.as_str()),
                ])
                .send()
                .await
                .context("Failed to fetch search results")?;

            if !response.status().is_success() {
                anyhow::bail!("Search returned HTTP {}", response.status());
            }

            let html = response
                .text()
                .await
                .context("Failed to read search results")?;

            let page_urls = parse_search_cards(&html);
            if page_urls.is_empty() {
                break;
            }

            for url in page_urls {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }

            start += SEARCH_PAGE_SIZE;
        }

        urls.truncate(query.limit);
        info!(
            "Search '{}' in '{}' yielded {} postings",
            query.keywords,
            query.location,
            urls.len()
        );
        Ok(urls)
    }

    fn extract_posting(&self, url: &str, html: &str) -> Option<JobPosting> {
        let document = Html::parse_document(html);
        let source = JobSource::from_url(url);

        let content = match source {
            JobSource::Linkedin => parse_linkedin(&document),
            JobSource::Glassdoor => parse_glassdoor(&document),
            JobSource::Other => None,
        }
        .or_else(|| parse_generic(&document))?;

        Some(JobPosting {
            url: url.to_string(),
            source,
            title: content.0,
            company: content.1,
            location: content.2,
            description: content.3,
        })
    }
}

type Extracted = (String, String, String, String);

fn parse_linkedin(document: &Html) -> Option<Extracted> {
    let title_selectors = [
        "h1.top-card-layout__title",
        ".job-details-jobs-unified-top-card__job-title",
        "h1[data-test-id='job-title']",
        ".jobs-unified-top-card__job-title",
    ];

    let company_selectors = [
        ".job-details-jobs-unified-top-card__company-name",
        ".top-card-layout__card .top-card-layout__second-subline",
        "a[data-test-id='job-poster-name']",
        ".jobs-unified-top-card__company-name",
    ];

    let description_selectors = [
        ".jobs-box__html-content",
        ".jobs-description__container",
        ".jobs-description-content__text",
        ".show-more-less-html__markup",
        "[data-test-id='job-description']",
    ];

    let location_selectors = [
        ".job-details-jobs-unified-top-card__bullet",
        ".top-card-layout__card .top-card-layout__first-subline",
        "[data-test-id='job-location']",
        ".jobs-unified-top-card__bullet",
    ];

    let title = find_text_by_selectors(document, &title_selectors)?;
    let company = find_text_by_selectors(document, &company_selectors)?;
    let description = find_text_by_selectors(document, &description_selectors)?;
    let location = find_text_by_selectors(document, &location_selectors).unwrap_or_default();

    Some((title, company, location, description))
}

fn parse_glassdoor(document: &Html) -> Option<Extracted> {
    let title_selectors = [
        "h1[data-test='job-title']",
        ".JobDetails_jobTitle__Rw_gn",
        "[class*='jobTitle']",
    ];

    let company_selectors = [
        "[data-test='employer-name']",
        ".EmployerProfile_employerName__Xemli",
        "[class*='employerName']",
    ];

    let description_selectors = [
        "[data-test='jobDescriptionText']",
        ".JobDetails_jobDescription__uW_fK",
        "[class*='jobDescription']",
    ];

    let location_selectors = [
        "[data-test='location']",
        ".JobDetails_location__mSg5h",
        "[class*='location']",
    ];

    let title = find_text_by_selectors(document, &title_selectors)?;
    let company = find_text_by_selectors(document, &company_selectors)?;
    let description = find_text_by_selectors(document, &description_selectors)?;
    let location = find_text_by_selectors(document, &location_selectors).unwrap_or_default();

    Some((title, company, location, description))
}

fn parse_generic(document: &Html) -> Option<Extracted> {
    warn!("Falling back to generic job parsing");

    let title_selectors = [
        "h1",
        "[class*='title']",
        "[class*='job-title']",
        "[class*='position']",
    ];

    let company_selectors = [
        "[class*='company']",
        "[class*='employer']",
        "[class*='organization']",
    ];

    let description_selectors = [
        "[class*='description']",
        "[class*='content']",
        "[class*='details']",
        "main",
        "article",
    ];

    let title = find_text_by_selectors(document, &title_selectors)?;
    let company = find_text_by_selectors(document, &company_selectors).unwrap_or_default();
    let description = find_text_by_selectors(document, &description_selectors)?;

    Some((title, company, String::new(), description))
}

/// Posting URLs from a LinkedIn guest search results fragment.
fn parse_search_cards(html: &str) -> Vec<String> {
    let document = Html::parse_fragment(html);
    let mut urls = Vec::new();

    if let Ok(selector) = Selector::parse("a.base-card__full-link, a[href*='/jobs/view/']") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                // Strip tracking query parameters
                let clean = href.split('?').next().unwrap_or(href).to_string();
                if clean.contains("/jobs/view/") && !urls.contains(&clean) {
                    urls.push(clean);
                }
            }
        }
    }

    urls
}

fn find_text_by_selectors(document: &Html, selectors: &[&str]) -> Option<String> {
    for selector_str in selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let text = clean_text(&element.text().collect::<Vec<_>>().join(" "));
                if !text.is_empty() && text.len() > 5 {
                    return Some(text);
                }
            }
        }
    }
    None
}

fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINKEDIN_PAGE: &str = r#"
        <html><body>
            <h1 class="top-card-layout__title">Senior Rust Engineer</h1>
            <div class="top-card-layout__card">
                <div class="top-card-layout__first-subline">Lyon, France</div>
                <div class="top-card-layout__second-subline">Acme Systems</div>
            </div>
            <div class="show-more-less-html__markup">
                Build and operate storage services.
                Work with Rust and SQLite.
            </div>
        </body></html>
    "#;

    const SEARCH_FRAGMENT: &str = r#"
        <ul>
            <li><a class="base-card__full-link" href="https://www.linkedin.com/jobs/view/123?refId=abc">Job A</a></li>
            <li><a class="base-card__full-link" href="https://www.linkedin.com/jobs/view/456?refId=def">Job B</a></li>
            <li><a class="base-card__full-link" href="https://www.linkedin.com/jobs/view/123?refId=xyz">Job A again</a></li>
        </ul>
    "#;

    #[test]
    fn test_parse_linkedin_page() {
        let document = Html::parse_document(LINKEDIN_PAGE);
        let (title, company, location, description) = parse_linkedin(&document).unwrap();
        assert_eq!(title, "Senior Rust Engineer");
        assert_eq!(company, "Acme Systems");
        assert_eq!(location, "Lyon, France");
        assert!(description.contains("storage services. Work with Rust"));
    }

    #[test]
    fn test_parse_search_cards_dedups_and_strips_tracking() {
        let urls = parse_search_cards(SEARCH_FRAGMENT);
        assert_eq!(
            urls,
            vec![
                "https://www.linkedin.com/jobs/view/123".to_string(),
                "https://www.linkedin.com/jobs/view/456".to_string(),
            ]
        );
    }

    #[test]
    fn test_generic_fallback() {
        let html = r#"
            <html><body>
                <h1>Platform Engineer</h1>
                <div class="company-header">Globex</div>
                <div class="job-description">Run the platform team tooling.</div>
            </body></html>
        "#;
        let document = Html::parse_document(html);
        let (title, company, _location, description) = parse_generic(&document).unwrap();
        assert_eq!(title, "Platform Engineer");
        assert_eq!(company, "Globex");
        assert!(description.contains("platform team tooling"));
    }

    #[test]
    fn test_source_from_url() {
        assert_eq!(
            JobSource::from_url("https://www.linkedin.com/jobs/view/1"),
            JobSource::Linkedin
        );
        assert_eq!(
            JobSource::from_url("https://www.glassdoor.com/job-listing/x"),
            JobSource::Glassdoor
        );
        assert_eq!(JobSource::from_url("https://jobs.acme.dev/1"), JobSource::Other);
    }
}
