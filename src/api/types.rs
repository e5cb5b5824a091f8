use crate::domain::{JobErrorInfo, JobId, JobStatus, ResultId, SearchFilters, SearchId};
use crate::services::{Search, SearchJob, SearchResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSearchRequest {
    pub query: String,
    #[serde(flatten)]
    pub filters: SearchFilters,
}

#[derive(Debug, Serialize)]
pub struct SearchCreatedDto {
    pub search_id: SearchId,
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct JobDto {
    pub id: JobId,
    pub search_id: SearchId,
    pub status: JobStatus,
    pub error: Option<JobErrorInfo>,
    pub result_count: i32,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<SearchJob> for JobDto {
    fn from(job: SearchJob) -> Self {
        Self {
            id: job.id,
            search_id: job.search_id,
            status: job.status,
            error: job.error,
            result_count: job.result_count,
            created_at: job.created_at.to_rfc3339(),
            started_at: job.started_at.map(|t| t.to_rfc3339()),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchDto {
    pub id: SearchId,
    pub query: String,
    pub filters: SearchFilters,
    pub status: JobStatus,
    pub created_at: String,
    pub updated_at: String,
    pub latest_job: Option<JobDto>,
}

impl SearchDto {
    #[must_use]
    pub fn new(search: Search, latest_job: Option<SearchJob>) -> Self {
        Self {
            id: search.id,
            query: search.query,
            filters: search.filters,
            status: search.status,
            created_at: search.created_at.to_rfc3339(),
            updated_at: search.updated_at.to_rfc3339(),
            latest_job: latest_job.map(JobDto::from),
        }
    }
}

/// A listing as shown to its viewer. Contact details stay hidden until the
/// viewer unlocks the result.
#[derive(Debug, Serialize)]
pub struct ResultDto {
    pub id: ResultId,
    pub title: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub seller_name: Option<String>,
    pub listing_url: Option<String>,
    pub created_at: String,
    pub is_unlocked: bool,
}

impl From<SearchResult> for ResultDto {
    fn from(r: SearchResult) -> Self {
        let unlocked = r.is_unlocked;
        Self {
            id: r.id,
            title: r.title,
            price: r.price,
            currency: r.currency,
            image_url: r.image_url,
            description: r.description,
            location: r.location,
            seller_name: r.seller_name.filter(|_| unlocked),
            listing_url: Some(r.listing_url).filter(|_| unlocked),
            created_at: r.created_at.to_rfc3339(),
            is_unlocked: unlocked,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResultsPageDto {
    pub job_id: JobId,
    pub status: JobStatus,
    pub results: Vec<ResultDto>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    pub has_more: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct ResultsQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub sort_by: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct UnlockDto {
    pub result_id: ResultId,
    pub unlocked: bool,
    /// False when the caller had already unlocked this result.
    pub newly_unlocked: bool,
}

#[derive(Debug, Serialize)]
pub struct QuotaDto {
    pub remaining: i64,
    pub reset_at: Option<String>,
    pub observed_at: String,
    pub has_capacity: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub database: bool,
    pub in_flight_jobs: usize,
}
