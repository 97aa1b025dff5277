// src/cli.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EnvironmentConfig;
use crate::db::models::{ApplicationStatus, NewContact, NewJob};
use crate::db::repository::{
    ApplicationRepository, ContactRepository, DocumentRepository, JobRepository,
    ProfileRepository,
};
use crate::generate::DocumentGenerator;
use crate::llm::{FitReport, GeminiClient};
use crate::profile::CandidateProfile;
use crate::publish::{MediumClient, PagesPublisher, SlackNotifier};
use crate::scrape::{JobScraper, SearchQuery};
use crate::storage::{ObjectStore, SyncManager};
use crate::web::{start_web_server, AppContext};

#[derive(Parser)]
#[command(name = "jobpilot")]
#[command(about = "Personal job-search automation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand)]
pub enum CliCommand {
    /// Search for postings, score them against the profile and store matches
    Scan {
        #[arg(long)]
        keywords: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value_t = 25)]
        limit: usize,
        /// Send a Slack notification for scores at or above this value
        #[arg(long, default_value_t = 7.0)]
        notify_above: f64,
    },
    /// Scrape and score a single posting URL
    Analyze { url: String },
    /// Generate tailored documents for a stored job
    Generate {
        job_id: i64,
        /// resume, cover-letter or both
        #[arg(long, default_value = "both")]
        kind: String,
    },
    /// Update an application's status
    Track {
        job_id: i64,
        status: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Recruiter contact management
    Contacts {
        #[command(subcommand)]
        command: ContactsCommand,
    },
    /// Seed the skills and experiences tables from the profile file
    ProfileSync,
    /// Publishing commands
    Publish {
        #[command(subcommand)]
        command: PublishCommand,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    /// Run the HTTP API server
    Serve {
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}

#[derive(Subcommand)]
pub enum ContactsCommand {
    /// Import contacts from a CSV file (name, email, company, ...)
    Import { csv_file: PathBuf },
    /// List all contacts
    List,
}

#[derive(Subcommand)]
pub enum PublishCommand {
    /// Export the application pipeline to the GitHub Pages site directory
    Pages {
        /// Also git commit and push the site
        #[arg(long)]
        push: bool,
    },
    /// Create a Medium draft from a markdown file
    Medium {
        title: String,
        file: PathBuf,
        #[arg(long)]
        tags: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum DbCommand {
    /// Create the schema in the shared database
    Init,
    /// Force-remove the lock marker left by a crashed process
    Unlock,
}

pub async fn handle_command(
    cli: Cli,
    config: EnvironmentConfig,
    store: Arc<dyn ObjectStore>,
) -> Result<()> {
    let sync = SyncManager::new(store, &config);

    match cli.command {
        CliCommand::Scan {
            keywords,
            location,
            limit,
            notify_above,
        } => {
            let query = SearchQuery {
                keywords,
                location,
                limit,
            };
            scan(&sync, &config, &query, notify_above).await
        }

        CliCommand::Analyze { url } => analyze_one(&sync, &config, &url).await,

        CliCommand::Generate { job_id, kind } => {
            generate_documents(&sync, &config, job_id, &kind).await
        }

        CliCommand::Track {
            job_id,
            status,
            notes,
        } => {
            let status: ApplicationStatus = status.parse()?;
            track(&sync, job_id, status, notes.as_deref()).await
        }

        CliCommand::Contacts { command } => match command {
            ContactsCommand::Import { csv_file } => import_contacts(&sync, &csv_file).await,
            ContactsCommand::List => list_contacts(&sync).await,
        },

        CliCommand::ProfileSync => sync_profile(&sync, &config).await,

        CliCommand::Publish { command } => match command {
            PublishCommand::Pages { push } => publish_pages(&sync, &config, push).await,
            PublishCommand::Medium { title, file, tags } => {
                let markdown = crate::utils::read_file_content(&file).await?;
                let client = MediumClient::new()?;
                let article = client.post_draft(&title, &markdown, &tags).await?;
                println!("Draft created: {}", article.url);
                Ok(())
            }
        },

        CliCommand::Db { command } => match command {
            DbCommand::Init => {
                sync.with_session(|conn| {
                    Box::pin(async move { crate::db::migrate(&mut *conn).await })
                })
                .await?;
                println!("Schema created and pushed");
                Ok(())
            }
            DbCommand::Unlock => {
                sync.force_unlock().await?;
                println!("Lock marker removed");
                Ok(())
            }
        },

        CliCommand::Serve { port } => {
            let ctx = AppContext {
                config,
                sync: Arc::new(sync),
                scraper: JobScraper::new()?,
            };
            start_web_server(ctx, port).await
        }
    }
}

async fn scan(
    sync: &SyncManager,
    config: &EnvironmentConfig,
    query: &SearchQuery,
    notify_above: f64,
) -> Result<()> {
    let scraper = JobScraper::new()?;
    let llm = GeminiClient::new()?;
    let profile = CandidateProfile::load(&config.profile_path).await?;
    let profile_block = profile.prompt_block();

    let urls = scraper.search_linkedin(query).await?;
    if urls.is_empty() {
        println!("No postings found for '{}'", query.keywords);
        return Ok(());
    }

    let mut scored = Vec::new();
    for url in &urls {
        let posting = match scraper.fetch_posting(url).await {
            Ok(posting) => posting,
            Err(e) => {
                warn!("Skipping {}: {:#}", url, e);
                continue;
            }
        };

        match llm.analyze_fit(&profile_block, &posting).await {
            Ok(report) => scored.push((posting, report)),
            Err(e) => warn!("Analysis failed for {}: {:#}", url, e),
        }
    }

    info!("Scored {} of {} postings", scored.len(), urls.len());

    let stored = store_scored(sync, scored).await?;

    let notifier = SlackNotifier::new().ok();
    for (job, report) in &stored {
        println!(
            "{:>5.1}  {} at {}  (job {})",
            report.score, job.title, job.company, job.id
        );
        if report.score >= notify_above {
            if let Some(notifier) = &notifier {
                if let Err(e) = notifier.notify_match(job, report).await {
                    warn!("Slack notification failed: {:#}", e);
                }
            }
        }
    }

    Ok(())
}

async fn analyze_one(sync: &SyncManager, config: &EnvironmentConfig, url: &str) -> Result<()> {
    let scraper = JobScraper::new()?;
    let llm = GeminiClient::new()?;
    let profile = CandidateProfile::load(&config.profile_path).await?;

    let posting = scraper.fetch_posting(url).await?;
    let report = llm.analyze_fit(&profile.prompt_block(), &posting).await?;

    let stored = store_scored(sync, vec![(posting, report)]).await?;
    let (job, report) = &stored[0];

    println!("{} at {}: score {:.1}/10", job.title, job.company, report.score);
    println!("\n{}", report.summary);
    if !report.strengths.is_empty() {
        println!("\nStrengths:");
        for s in &report.strengths {
            println!("  - {}", s);
        }
    }
    if !report.gaps.is_empty() {
        println!("\nGaps:");
        for g in &report.gaps {
            println!("  - {}", g);
        }
    }
    println!("\nStored as job {}", job.id);

    Ok(())
}

/// Store scored postings in one locked session.
async fn store_scored(
    sync: &SyncManager,
    scored: Vec<(crate::scrape::JobPosting, FitReport)>,
) -> Result<Vec<(crate::db::Job, FitReport)>> {
    sync.with_session(move |conn| {
        Box::pin(async move {
            crate::db::migrate(&mut *conn).await?;

            let mut stored = Vec::with_capacity(scored.len());
            for (posting, report) in scored {
                let new_job = NewJob {
                    url: posting.url.clone(),
                    source: posting.source.as_str().to_string(),
                    title: posting.title.clone(),
                    company: posting.company.clone(),
                    location: posting.location.clone(),
                    description: posting.description.clone(),
                };

                let job = {
                    let mut jobs = JobRepository::new(&mut *conn);
                    let job = jobs.upsert(&new_job).await?;
                    jobs.set_fit(job.id, report.score, &report.summary).await?;
                    jobs.find_by_id(job.id)
                        .await?
                        .context("Job row disappeared after upsert")?
                };

                let mut apps = ApplicationRepository::new(&mut *conn);
                apps.ensure_for_job(job.id).await?;
                apps.update_status(job.id, ApplicationStatus::Analyzed, None)
                    .await?;

                stored.push((job, report));
            }

            Ok(stored)
        })
    })
    .await
}

async fn generate_documents(
    sync: &SyncManager,
    config: &EnvironmentConfig,
    job_id: i64,
    kind: &str,
) -> Result<()> {
    if !["resume", "cover-letter", "both"].contains(&kind) {
        anyhow::bail!("Unknown kind: {}. Use resume, cover-letter or both", kind);
    }

    let job = sync
        .with_read_session(move |conn| {
            Box::pin(async move {
                let mut jobs = JobRepository::new(&mut *conn);
                jobs.find_by_id(job_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("No job with id {}", job_id))
            })
        })
        .await?;

    let report = match (&job.fit_score, &job.fit_summary) {
        (Some(score), Some(summary)) => FitReport {
            score: *score,
            summary: summary.clone(),
            strengths: Vec::new(),
            gaps: Vec::new(),
            talking_points: Vec::new(),
        },
        _ => anyhow::bail!("Job {} has no fit analysis yet, run analyze first", job_id),
    };

    let profile = CandidateProfile::load(&config.profile_path).await?;
    let profile_block = profile.prompt_block();
    let llm = GeminiClient::new()?;
    let generator = DocumentGenerator::new(config.output_path.clone());

    let posting = crate::scrape::JobPosting {
        url: job.url.clone(),
        source: crate::scrape::JobSource::from_url(&job.url),
        title: job.title.clone(),
        company: job.company.clone(),
        location: job.location.clone(),
        description: job.description.clone(),
    };

    let mut resume_path = None;
    let mut letter_path = None;

    if kind == "resume" || kind == "both" {
        let body = llm.tailor_resume(&profile_block, &posting, &report).await?;
        let path = generator
            .render_resume(&profile.name, &job.company, &body)
            .await?;
        println!("Resume: {}", path.display());
        resume_path = Some(path);
    }

    if kind == "cover-letter" || kind == "both" {
        let body = llm
            .draft_cover_letter(&profile_block, &posting, &report)
            .await?;
        let path = generator
            .render_cover_letter(&profile.name, &job.company, &body)
            .await?;
        println!("Cover letter: {}", path.display());
        letter_path = Some(path);
    }

    sync.with_session(move |conn| {
        Box::pin(async move {
            let mut docs = DocumentRepository::new(&mut *conn);
            if let Some(path) = &resume_path {
                docs.record_resume(job_id, &path.display().to_string()).await?;
            }
            if let Some(path) = &letter_path {
                docs.record_cover_letter(job_id, &path.display().to_string())
                    .await?;
            }
            Ok(())
        })
    })
    .await
}

async fn track(
    sync: &SyncManager,
    job_id: i64,
    status: ApplicationStatus,
    notes: Option<&str>,
) -> Result<()> {
    let notes = notes.map(|s| s.to_string());

    let job = sync
        .with_session(move |conn| {
            Box::pin(async move {
                let updated = {
                    let mut apps = ApplicationRepository::new(&mut *conn);
                    apps.update_status(job_id, status, notes.as_deref()).await?
                };
                if !updated {
                    anyhow::bail!("No application found for job {}", job_id);
                }

                let mut jobs = JobRepository::new(&mut *conn);
                jobs.find_by_id(job_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("No job with id {}", job_id))
            })
        })
        .await?;

    println!("{} at {} → {}", job.title, job.company, status);

    if let Ok(notifier) = SlackNotifier::new() {
        if let Err(e) = notifier.notify_status_change(&job, status.as_str()).await {
            warn!("Slack notification failed: {:#}", e);
        }
    }

    Ok(())
}

async fn import_contacts(sync: &SyncManager, csv_file: &PathBuf) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_file)
        .with_context(|| format!("Failed to open {}", csv_file.display()))?;

    let mut contacts = Vec::new();
    for record in reader.deserialize::<NewContact>() {
        contacts.push(record.context("Invalid contact row")?);
    }

    let total = contacts.len();
    let imported = sync
        .with_session(move |conn| {
            Box::pin(async move {
                crate::db::migrate(&mut *conn).await?;
                let mut repo = ContactRepository::new(&mut *conn);
                let mut imported = 0usize;
                for contact in &contacts {
                    if repo.import(contact).await? {
                        imported += 1;
                    }
                }
                Ok(imported)
            })
        })
        .await?;

    println!("Imported {} of {} contacts", imported, total);
    Ok(())
}

async fn list_contacts(sync: &SyncManager) -> Result<()> {
    let contacts = sync
        .with_read_session(|conn| {
            Box::pin(async move {
                crate::db::migrate(&mut *conn).await?;
                let mut repo = ContactRepository::new(&mut *conn);
                repo.list().await
            })
        })
        .await?;

    if contacts.is_empty() {
        println!("No contacts");
        return Ok(());
    }

    for contact in contacts {
        let contacted = contact
            .last_contacted_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}  <{}>  {}  last contacted: {}",
            contact.name, contact.email, contact.company, contacted
        );
    }

    Ok(())
}

async fn sync_profile(sync: &SyncManager, config: &EnvironmentConfig) -> Result<()> {
    let profile = CandidateProfile::load(&config.profile_path).await?;
    let skills = profile.flat_skills();
    let experiences = profile.experiences.clone();

    let (n_skills, n_exp) = sync
        .with_session(move |conn| {
            Box::pin(async move {
                crate::db::migrate(&mut *conn).await?;
                let n_skills = {
                    let mut repo = ProfileRepository::new(&mut *conn);
                    repo.replace_skills(&skills).await?
                };
                let mut repo = ProfileRepository::new(&mut *conn);
                let n_exp = repo.replace_experiences(&experiences).await?;
                Ok((n_skills, n_exp))
            })
        })
        .await?;

    println!("Synced {} skills and {} experiences", n_skills, n_exp);
    Ok(())
}

async fn publish_pages(sync: &SyncManager, config: &EnvironmentConfig, push: bool) -> Result<()> {
    let applications = sync
        .with_read_session(|conn| {
            Box::pin(async move {
                crate::db::migrate(&mut *conn).await?;
                let mut repo = ApplicationRepository::new(&mut *conn);
                repo.list_overview().await
            })
        })
        .await?;

    let publisher = PagesPublisher::new(config.site_path.clone());
    let path = publisher.write_pipeline_post(&applications).await?;
    println!("Wrote {}", path.display());

    if push {
        publisher.publish()?;
    }

    Ok(())
}
