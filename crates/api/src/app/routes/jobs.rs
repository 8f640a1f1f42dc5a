//! Job submission and polling endpoints.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;

use catalogsync_core::JobId;
use catalogsync_infra::jobs::{BatchConfig, JobKind, JobRegistry, SyncAdapter};

use crate::app::dto::{JobListEntry, JobStatusQuery, JobStatusResponse, SubmitJobRequest, SubmitJobResponse};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(get_job))
        .route("/list", get(list_jobs))
        .route("/:kind", post(submit_job))
}

/// POST /jobs/:kind
///
/// Registers the job and returns `202 {jobId}` before any item is processed.
pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(kind): Path<String>,
    body: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let Some(kind) = JobKind::from_slug(&kind) else {
        return errors::not_found(format!("unknown job kind: {kind}"));
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match kind {
        JobKind::CatalogImport => submit(&services, &services.catalog_import, body.items, body.config),
        JobKind::InventoryRefresh => submit(&services, &services.inventory_refresh, body.items, body.config),
        JobKind::ImageRepublish => submit(&services, &services.image_republish, body.items, body.config),
    }
}

fn submit<A>(
    services: &AppServices,
    adapter: &Arc<A>,
    items: Vec<serde_json::Value>,
    config: BatchConfig,
) -> axum::response::Response
where
    A: SyncAdapter,
    A::Item: DeserializeOwned,
{
    let items = match items
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            serde_json::from_value::<A::Item>(raw).map_err(|e| format!("items[{i}]: {e}"))
        })
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(items) => items,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_items", msg),
    };

    match services.orchestrator.submit(adapter.clone(), items, config) {
        Ok(handle) => (
            StatusCode::ACCEPTED,
            Json(SubmitJobResponse {
                job_id: handle.job_id().to_string(),
            }),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// GET /jobs?jobId=...
pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<JobStatusQuery>,
) -> axum::response::Response {
    let Some(raw) = query.job_id else {
        return errors::json_error(StatusCode::BAD_REQUEST, "missing_job_id", "jobId query parameter is required");
    };
    let job_id = match JobId::from_str(&raw) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.registry.get_job(job_id) {
        Some(job) => Json(JobStatusResponse::from(job)).into_response(),
        None => errors::not_found(format!("job {job_id} not found or expired")),
    }
}

/// GET /jobs/list
pub async fn list_jobs(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let jobs: Vec<JobListEntry> = services.registry.list_jobs().iter().map(JobListEntry::from).collect();
    Json(jobs).into_response()
}
