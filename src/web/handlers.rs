// src/web/handlers.rs
use rocket::serde::json::Json;
use rocket::State;
use tracing::error;

use super::types::{
    AnalyzeData, AnalyzeRequest, ApplicationList, DataResponse, ErrorResponse, JobList,
    StatusUpdateRequest,
};
use super::AppContext;
use crate::db::models::{ApplicationStatus, NewJob};
use crate::db::repository::{ApplicationRepository, JobRepository};
use crate::llm::GeminiClient;
use crate::profile::CandidateProfile;

fn failure(e: anyhow::Error) -> Json<ErrorResponse> {
    error!("Request failed: {:#}", e);
    Json(ErrorResponse::new(e))
}

pub async fn analyze_handler(
    request: Json<AnalyzeRequest>,
    ctx: &State<AppContext>,
) -> Result<Json<DataResponse<AnalyzeData>>, Json<ErrorResponse>> {
    let llm = GeminiClient::new().map_err(failure)?;

    let posting = ctx
        .scraper
        .fetch_posting(&request.url)
        .await
        .map_err(failure)?;

    let profile = CandidateProfile::load(&ctx.config.profile_path)
        .await
        .map_err(failure)?;

    let report = llm
        .analyze_fit(&profile.prompt_block(), &posting)
        .await
        .map_err(failure)?;

    let new_job = NewJob {
        url: posting.url.clone(),
        source: posting.source.as_str().to_string(),
        title: posting.title.clone(),
        company: posting.company.clone(),
        location: posting.location.clone(),
        description: posting.description.clone(),
    };

    let score = report.score;
    let summary = report.summary.clone();

    let job = ctx
        .sync
        .with_session(move |conn| {
            Box::pin(async move {
                crate::db::migrate(&mut *conn).await?;

                let job = {
                    let mut jobs = JobRepository::new(&mut *conn);
                    let job = jobs.upsert(&new_job).await?;
                    jobs.set_fit(job.id, score, &summary).await?;
                    jobs.find_by_id(job.id)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("Job row disappeared"))?
                };

                let mut apps = ApplicationRepository::new(&mut *conn);
                apps.ensure_for_job(job.id).await?;
                apps.update_status(job.id, ApplicationStatus::Analyzed, None)
                    .await?;

                Ok(job)
            })
        })
        .await
        .map_err(failure)?;

    Ok(Json(DataResponse::new(AnalyzeData { job, report })))
}

pub async fn list_jobs_handler(
    limit: Option<i64>,
    ctx: &State<AppContext>,
) -> Result<Json<DataResponse<JobList>>, Json<ErrorResponse>> {
    let limit = limit.unwrap_or(50);

    let jobs = ctx
        .sync
        .with_read_session(move |conn| {
            Box::pin(async move {
                crate::db::migrate(&mut *conn).await?;
                let mut repo = JobRepository::new(&mut *conn);
                repo.list_recent(limit).await
            })
        })
        .await
        .map_err(failure)?;

    Ok(Json(DataResponse::new(JobList { jobs })))
}

pub async fn list_applications_handler(
    ctx: &State<AppContext>,
) -> Result<Json<DataResponse<ApplicationList>>, Json<ErrorResponse>> {
    let applications = ctx
        .sync
        .with_read_session(|conn| {
            Box::pin(async move {
                crate::db::migrate(&mut *conn).await?;
                let mut repo = ApplicationRepository::new(&mut *conn);
                repo.list_overview().await
            })
        })
        .await
        .map_err(failure)?;

    Ok(Json(DataResponse::new(ApplicationList { applications })))
}

pub async fn update_status_handler(
    job_id: i64,
    request: Json<StatusUpdateRequest>,
    ctx: &State<AppContext>,
) -> Result<Json<DataResponse<bool>>, Json<ErrorResponse>> {
    let status: ApplicationStatus = request.status.parse().map_err(failure)?;
    let notes = request.notes.clone();

    let updated = ctx
        .sync
        .with_session(move |conn| {
            Box::pin(async move {
                crate::db::migrate(&mut *conn).await?;
                let mut repo = ApplicationRepository::new(&mut *conn);
                repo.update_status(job_id, status, notes.as_deref()).await
            })
        })
        .await
        .map_err(failure)?;

    if !updated {
        return Err(failure(anyhow::anyhow!(
            "No application found for job {}",
            job_id
        )));
    }

    Ok(Json(DataResponse::new(true)))
}
