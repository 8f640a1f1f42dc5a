use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use catalogsync_infra::jobs::{BatchConfig, ItemResult, Job, JobKind, JobStatus, JobSummary};

/// Errors shown in a status summary.
pub const SUMMARY_ERROR_LIMIT: usize = 5;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitJobRequest {
    /// Kind-specific item objects; decoded once the kind is known.
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub config: BatchConfig,
}

#[derive(Debug, Deserialize)]
pub struct JobStatusQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub total_items: usize,
    pub completed_items: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub results: Vec<ItemResult>,
    pub errors: Vec<String>,
    /// Present once the job is terminal.
    pub summary: Option<JobSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let summary = job.status.is_terminal().then(|| job.summary(SUMMARY_ERROR_LIMIT));
        Self {
            job_id: job.id.to_string(),
            kind: job.kind,
            status: job.status,
            progress: job.progress,
            message: job.current_message,
            total_items: job.total_items,
            completed_items: job.completed_items,
            success_count: job.success_count,
            error_count: job.error_count,
            results: job.results,
            errors: job.errors,
            summary,
            created_at: job.created_at,
            updated_at: job.updated_at,
            finished_at: job.finished_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListEntry {
    pub job_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for JobListEntry {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            kind: job.kind,
            status: job.status,
            progress: job.progress,
            created_at: job.created_at,
        }
    }
}
