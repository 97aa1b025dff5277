// src/web/mod.rs
pub mod handlers;
pub mod types;

use anyhow::Result;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::serde::json::Json;
use rocket::{get, post, routes, Request, Response, State};
use std::sync::Arc;

use crate::config::EnvironmentConfig;
use crate::scrape::JobScraper;
use crate::storage::SyncManager;
use types::{
    AnalyzeData, AnalyzeRequest, ApplicationList, DataResponse, ErrorResponse, HealthInfo,
    JobList, StatusUpdateRequest,
};

/// Everything the handlers need, constructed by the entry point.
pub struct AppContext {
    pub config: EnvironmentConfig,
    pub sync: Arc<SyncManager>,
    pub scraper: JobScraper,
}

// CORS Fairing
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "Add CORS headers to responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "POST, GET, OPTIONS",
        ));
        response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
    }
}

#[get("/health")]
pub async fn health() -> Json<DataResponse<HealthInfo>> {
    Json(DataResponse::new(HealthInfo {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

#[post("/analyze", data = "<request>")]
pub async fn analyze(
    request: Json<AnalyzeRequest>,
    ctx: &State<AppContext>,
) -> Result<Json<DataResponse<AnalyzeData>>, Json<ErrorResponse>> {
    handlers::analyze_handler(request, ctx).await
}

#[get("/jobs?<limit>")]
pub async fn list_jobs(
    limit: Option<i64>,
    ctx: &State<AppContext>,
) -> Result<Json<DataResponse<JobList>>, Json<ErrorResponse>> {
    handlers::list_jobs_handler(limit, ctx).await
}

#[get("/applications")]
pub async fn list_applications(
    ctx: &State<AppContext>,
) -> Result<Json<DataResponse<ApplicationList>>, Json<ErrorResponse>> {
    handlers::list_applications_handler(ctx).await
}

#[post("/applications/<job_id>/status", data = "<request>")]
pub async fn update_status(
    job_id: i64,
    request: Json<StatusUpdateRequest>,
    ctx: &State<AppContext>,
) -> Result<Json<DataResponse<bool>>, Json<ErrorResponse>> {
    handlers::update_status_handler(job_id, request, ctx).await
}

pub async fn start_web_server(ctx: AppContext, port: u16) -> Result<()> {
    let figment = rocket::Config::figment()
        .merge(("port", port))
        .merge(("address", "0.0.0.0"));

    rocket::custom(figment)
        .manage(ctx)
        .attach(Cors)
        .mount(
            "/",
            routes![health, analyze, list_jobs, list_applications, update_status],
        )
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("Server failed: {}", e))?;

    Ok(())
}
