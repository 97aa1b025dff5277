// src/db/mod.rs
use anyhow::Result;
use sqlx::SqliteConnection;
use tracing::info;

pub mod models;
pub mod repository;

pub use models::{
    Application, ApplicationStatus, DocumentRecord, Experience, Job, NewContact, NewJob,
    RecruiterContact, Skill,
};
pub use repository::{
    ApplicationRepository, ContactRepository, DocumentRepository, JobRepository,
    ProfileRepository,
};

/// Run database migrations. Statements are idempotent so this is safe to run
/// at the start of any session.
pub async fn migrate(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            source TEXT NOT NULL,
            title TEXT NOT NULL,
            company TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            fit_score REAL,
            fit_summary TEXT,
            scraped_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS applications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL UNIQUE REFERENCES jobs(id),
            status TEXT NOT NULL DEFAULT 'discovered',
            applied_at TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            notes TEXT
        );
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS skills (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE (category, name)
        );
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS experiences (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company TEXT NOT NULL,
            role TEXT NOT NULL,
            started TEXT NOT NULL,
            ended TEXT,
            summary TEXT NOT NULL DEFAULT ''
        );
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recruiter_contacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            company TEXT NOT NULL DEFAULT '',
            linkedin_url TEXT,
            notes TEXT,
            last_contacted_at TEXT
        );
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resumes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL REFERENCES jobs(id),
            path TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cover_letters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL REFERENCES jobs(id),
            path TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_url ON jobs(url);")
        .execute(&mut *conn)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);")
        .execute(&mut *conn)
        .await?;

    info!("Database migrations completed");
    Ok(())
}
