// src/db/repository.rs
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::info;

use super::models::{
    Application, ApplicationOverview, ApplicationStatus, DocumentRecord, Experience, Job,
    NewContact, NewJob, RecruiterContact, Skill,
};

pub struct JobRepository<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> JobRepository<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Insert a scraped posting, or refresh its content if the URL is
    /// already known. Returns the stored row.
    pub async fn upsert(&mut self, job: &NewJob) -> Result<Job> {
        sqlx::query(
            r#"
            INSERT INTO jobs (url, source, title, company, location, description, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                company = excluded.company,
                location = excluded.location,
                description = excluded.description,
                scraped_at = excluded.scraped_at
            "#,
        )
        .bind(&job.url)
        .bind(&job.source)
        .bind(&job.title)
        .bind(&job.company)
        .bind(&job.location)
        .bind(&job.description)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await
        .context("Failed to upsert job")?;

        self.find_by_url(&job.url)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Job vanished after upsert: {}", job.url))
    }

    pub async fn set_fit(&mut self, job_id: i64, score: f64, summary: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET fit_score = ?, fit_summary = ? WHERE id = ?")
            .bind(score)
            .bind(summary)
            .bind(job_id)
            .execute(&mut *self.conn)
            .await
            .context("Failed to store fit analysis")?;

        info!("Stored fit score {:.1} for job {}", score, job_id);
        Ok(())
    }

    pub async fn find_by_id(&mut self, id: i64) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(job)
    }

    pub async fn find_by_url(&mut self, url: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE url = ?")
            .bind(url)
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(job)
    }

    pub async fn list_recent(&mut self, limit: i64) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs ORDER BY scraped_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(jobs)
    }

    /// Scored jobs at or above a threshold, best first.
    pub async fn list_matches(&mut self, min_score: f64) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE fit_score IS NOT NULL AND fit_score >= ?
            ORDER BY fit_score DESC
            "#,
        )
        .bind(min_score)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(jobs)
    }
}

pub struct ApplicationRepository<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> ApplicationRepository<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Every tracked job has exactly one application row; create it lazily.
    pub async fn ensure_for_job(&mut self, job_id: i64) -> Result<Application> {
        sqlx::query(
            r#"
            INSERT INTO applications (job_id, status, updated_at)
            VALUES (?, 'discovered', ?)
            ON CONFLICT(job_id) DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await
        .context("Failed to create application row")?;

        let application = sqlx::query_as::<_, Application>(
            "SELECT * FROM applications WHERE job_id = ?",
        )
        .bind(job_id)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(application)
    }

    pub async fn update_status(
        &mut self,
        job_id: i64,
        status: ApplicationStatus,
        notes: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now();
        let applied_at = match status {
            ApplicationStatus::Applied => Some(now),
            _ => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE applications
            SET status = ?,
                applied_at = COALESCE(?, applied_at),
                notes = COALESCE(?, notes),
                updated_at = ?
            WHERE job_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(applied_at)
        .bind(notes)
        .bind(now)
        .bind(job_id)
        .execute(&mut *self.conn)
        .await
        .context("Failed to update application status")?;

        let updated = result.rows_affected() > 0;
        if updated {
            info!("Application for job {} moved to {}", job_id, status);
        }

        Ok(updated)
    }

    pub async fn list_overview(&mut self) -> Result<Vec<ApplicationOverview>> {
        let rows = sqlx::query_as::<_, ApplicationOverview>(
            r#"
            SELECT a.id, a.job_id, a.status, a.updated_at,
                   j.title, j.company, j.fit_score
            FROM applications a
            JOIN jobs j ON j.id = a.job_id
            ORDER BY a.updated_at DESC
            "#,
        )
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows)
    }
}

pub struct ContactRepository<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> ContactRepository<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Insert a contact, ignoring rows whose email is already known.
    /// Returns true when a new row was created.
    pub async fn import(&mut self, contact: &NewContact) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO recruiter_contacts (name, email, company, linkedin_url, notes)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(email) DO NOTHING
            "#,
        )
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.company)
        .bind(&contact.linkedin_url)
        .bind(&contact.notes)
        .execute(&mut *self.conn)
        .await
        .context("Failed to import contact")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list(&mut self) -> Result<Vec<RecruiterContact>> {
        let contacts = sqlx::query_as::<_, RecruiterContact>(
            "SELECT * FROM recruiter_contacts ORDER BY name ASC",
        )
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(contacts)
    }

    pub async fn mark_contacted(&mut self, email: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE recruiter_contacts SET last_contacted_at = ? WHERE email = ?",
        )
        .bind(Utc::now())
        .bind(email)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Skills and experience rows mirroring the candidate profile file.
pub struct ProfileRepository<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> ProfileRepository<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn replace_skills(&mut self, skills: &[(String, String)]) -> Result<usize> {
        sqlx::query("DELETE FROM skills")
            .execute(&mut *self.conn)
            .await?;

        for (category, name) in skills {
            sqlx::query("INSERT INTO skills (category, name) VALUES (?, ?)")
                .bind(category)
                .bind(name)
                .execute(&mut *self.conn)
                .await
                .with_context(|| format!("Failed to insert skill {}/{}", category, name))?;
        }

        Ok(skills.len())
    }

    pub async fn replace_experiences(
        &mut self,
        experiences: &[crate::profile::ExperienceEntry],
    ) -> Result<usize> {
        sqlx::query("DELETE FROM experiences")
            .execute(&mut *self.conn)
            .await?;

        for exp in experiences {
            sqlx::query(
                r#"
                INSERT INTO experiences (company, role, started, ended, summary)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&exp.company)
            .bind(&exp.role)
            .bind(&exp.started)
            .bind(&exp.ended)
            .bind(&exp.summary)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("Failed to insert experience at {}", exp.company))?;
        }

        Ok(experiences.len())
    }

    pub async fn list_skills(&mut self) -> Result<Vec<Skill>> {
        let skills = sqlx::query_as::<_, Skill>(
            "SELECT * FROM skills ORDER BY category ASC, name ASC",
        )
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(skills)
    }

    pub async fn list_experiences(&mut self) -> Result<Vec<Experience>> {
        let experiences = sqlx::query_as::<_, Experience>(
            "SELECT * FROM experiences ORDER BY started DESC",
        )
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(experiences)
    }
}

pub struct DocumentRepository<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> DocumentRepository<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn record_resume(&mut self, job_id: i64, path: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO resumes (job_id, path, created_at) VALUES (?, ?, ?)",
        )
        .bind(job_id)
        .bind(path)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await
        .context("Failed to record resume")?;

        Ok(result.last_insert_rowid())
    }

    pub async fn record_cover_letter(&mut self, job_id: i64, path: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO cover_letters (job_id, path, created_at) VALUES (?, ?, ?)",
        )
        .bind(job_id)
        .bind(path)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await
        .context("Failed to record cover letter")?;

        Ok(result.last_insert_rowid())
    }

    pub async fn resumes_for_job(&mut self, job_id: i64) -> Result<Vec<DocumentRecord>> {
        let docs = sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM resumes WHERE job_id = ? ORDER BY created_at DESC",
        )
        .bind(job_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(docs)
    }

    pub async fn cover_letters_for_job(&mut self, job_id: i64) -> Result<Vec<DocumentRecord>> {
        let docs = sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM cover_letters WHERE job_id = ? ORDER BY created_at DESC",
        )
        .bind(job_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    async fn test_conn() -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        crate::db::migrate(&mut conn).await.unwrap();
        conn
    }

    fn sample_job(url: &str) -> NewJob {
        NewJob {
            url: url.to_string(),
            source: "linkedin".to_string(),
            title: "Backend Engineer".to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            description: "Build services".to_string(),
        }
    }

    #[tokio::test]
    async fn test_job_upsert_dedups_by_url() {
        let mut conn = test_conn().await;
        let mut repo = JobRepository::new(&mut conn);

        let first = repo.upsert(&sample_job("https://a/1")).await.unwrap();

        let mut updated = sample_job("https://a/1");
        updated.title = "Senior Backend Engineer".to_string();
        let second = repo.upsert(&updated).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "Senior Backend Engineer");
        assert_eq!(repo.list_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fit_score_and_matches() {
        let mut conn = test_conn().await;
        let mut repo = JobRepository::new(&mut conn);

        let good = repo.upsert(&sample_job("https://a/1")).await.unwrap();
        let poor = repo.upsert(&sample_job("https://a/2")).await.unwrap();

        repo.set_fit(good.id, 8.5, "strong overlap").await.unwrap();
        repo.set_fit(poor.id, 3.0, "weak overlap").await.unwrap();

        let matches = repo.list_matches(7.0).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, good.id);
        assert_eq!(matches[0].fit_summary.as_deref(), Some("strong overlap"));
    }

    #[tokio::test]
    async fn test_application_lifecycle() {
        let mut conn = test_conn().await;

        let job = {
            let mut jobs = JobRepository::new(&mut conn);
            jobs.upsert(&sample_job("https://a/1")).await.unwrap()
        };

        let mut apps = ApplicationRepository::new(&mut conn);
        let app = apps.ensure_for_job(job.id).await.unwrap();
        assert_eq!(app.status, "discovered");
        assert!(app.applied_at.is_none());

        // Idempotent
        let again = apps.ensure_for_job(job.id).await.unwrap();
        assert_eq!(app.id, again.id);

        let updated = apps
            .update_status(job.id, ApplicationStatus::Applied, Some("sent via referral"))
            .await
            .unwrap();
        assert!(updated);

        let overview = apps.list_overview().await.unwrap();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].status, "applied");
        assert_eq!(overview[0].company, "Acme");

        assert!(!apps
            .update_status(9999, ApplicationStatus::Rejected, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_contact_import_skips_duplicates() {
        let mut conn = test_conn().await;
        let mut repo = ContactRepository::new(&mut conn);

        let contact = NewContact {
            name: "Dana Recruiter".to_string(),
            email: "dana@agency.example".to_string(),
            company: "Agency".to_string(),
            linkedin_url: None,
            notes: None,
        };

        assert!(repo.import(&contact).await.unwrap());
        assert!(!repo.import(&contact).await.unwrap());
        assert_eq!(repo.list().await.unwrap().len(), 1);

        assert!(repo.mark_contacted("dana@agency.example").await.unwrap());
        let listed = repo.list().await.unwrap();
        assert!(listed[0].last_contacted_at.is_some());
    }

    #[tokio::test]
    async fn test_profile_rows_are_replaced() {
        let mut conn = test_conn().await;
        let mut repo = ProfileRepository::new(&mut conn);

        let skills = vec![
            ("languages".to_string(), "Rust".to_string()),
            ("languages".to_string(), "SQL".to_string()),
        ];
        assert_eq!(repo.replace_skills(&skills).await.unwrap(), 2);

        let fewer = vec![("languages".to_string(), "Rust".to_string())];
        assert_eq!(repo.replace_skills(&fewer).await.unwrap(), 1);
        assert_eq!(repo.list_skills().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_document_records() {
        let mut conn = test_conn().await;

        let job = {
            let mut jobs = JobRepository::new(&mut conn);
            jobs.upsert(&sample_job("https://a/1")).await.unwrap()
        };

        let mut docs = DocumentRepository::new(&mut conn);
        docs.record_resume(job.id, "out/acme_resume.pdf").await.unwrap();
        docs.record_cover_letter(job.id, "out/acme_cover_letter.pdf")
            .await
            .unwrap();

        assert_eq!(docs.resumes_for_job(job.id).await.unwrap().len(), 1);
        assert_eq!(docs.cover_letters_for_job(job.id).await.unwrap().len(), 1);
        assert!(docs.resumes_for_job(999).await.unwrap().is_empty());
    }
}
