//! Record store behind the search pipeline.
//!
//! This module provides the [`JobStore`] trait and the typed records that
//! cross it. The `SQLite` implementation lives on [`crate::db::Store`].

use crate::domain::{JobErrorInfo, JobId, JobStatus, ResultId, SearchFilters, SearchId, SortBy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Stored record is unreadable: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Search {
    pub id: SearchId,
    pub user_id: String,
    pub query: String,
    pub filters: SearchFilters,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSearch {
    pub user_id: String,
    pub query: String,
    pub filters: SearchFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchJob {
    pub id: JobId,
    pub search_id: SearchId,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<JobErrorInfo>,
    pub result_count: i32,
    pub created_at: DateTime<Utc>,
}

/// State change for one job. The store applies it only when the row's current
/// status may legally move to `status`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPatch {
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<JobErrorInfo>,
    pub result_count: Option<i32>,
}

impl JobPatch {
    #[must_use]
    pub const fn processing(at: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Processing,
            started_at: Some(at),
            completed_at: None,
            error: None,
            result_count: None,
        }
    }

    #[must_use]
    pub const fn completed(result_count: i32, at: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Completed,
            started_at: None,
            completed_at: Some(at),
            error: None,
            result_count: Some(result_count),
        }
    }

    #[must_use]
    pub const fn failed(error: JobErrorInfo, at: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Failed,
            started_at: None,
            completed_at: Some(at),
            error: Some(error),
            result_count: None,
        }
    }
}

/// A normalized listing ready to be appended to a job.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewResult {
    pub title: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub seller_name: Option<String>,
    pub listing_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: ResultId,
    pub job_id: JobId,
    /// Order the marketplace returned the listing in, starting at 0.
    pub position: i32,
    pub title: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub seller_name: Option<String>,
    pub listing_url: String,
    pub created_at: DateTime<Utc>,
    /// Whether the viewer of the page has unlocked this result.
    pub is_unlocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultQuery {
    pub limit: u64,
    pub offset: u64,
    pub sort_by: SortBy,
    /// User whose unlocks decide `is_unlocked`.
    pub viewer: Option<String>,
}

impl Default for ResultQuery {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
            sort_by: SortBy::default(),
            viewer: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPage {
    pub results: Vec<SearchResult>,
    pub total: u64,
    pub offset: u64,
}

impl ResultPage {
    /// True iff rows exist past this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.offset + (self.results.len() as u64) < self.total
    }
}

#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    async fn create_search(&self, search: NewSearch) -> Result<Search, StoreError>;

    async fn get_search(&self, id: SearchId) -> Result<Option<Search>, StoreError>;

    /// Newest first.
    async fn list_searches_for_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<Search>, StoreError>;

    async fn update_search_status(
        &self,
        id: SearchId,
        status: JobStatus,
    ) -> Result<(), StoreError>;

    /// Creates a `pending` job for an existing search.
    ///
    /// # Errors
    ///
    /// - Returns [`StoreError::NotFound`] if the search does not exist
    async fn create_job(&self, search_id: SearchId) -> Result<JobId, StoreError>;

    async fn get_job(&self, id: JobId) -> Result<Option<SearchJob>, StoreError>;

    async fn latest_job_for_search(
        &self,
        search_id: SearchId,
    ) -> Result<Option<SearchJob>, StoreError>;

    /// Applies `patch` as one conditional write.
    ///
    /// Returns `false` without writing when the job is missing or its current
    /// status cannot move to `patch.status`. Two callers racing to claim the
    /// same pending job therefore see exactly one `true`.
    async fn update_job(&self, id: JobId, patch: JobPatch) -> Result<bool, StoreError>;

    /// Appends every record or none of them.
    async fn append_results(
        &self,
        job_id: JobId,
        records: Vec<NewResult>,
    ) -> Result<usize, StoreError>;

    async fn get_results(
        &self,
        job_id: JobId,
        query: &ResultQuery,
    ) -> Result<ResultPage, StoreError>;

    async fn get_result(&self, id: ResultId) -> Result<Option<SearchResult>, StoreError>;

    /// Records that `user_id` may see the full result. Returns `false` when it
    /// was already unlocked.
    ///
    /// # Errors
    ///
    /// - Returns [`StoreError::NotFound`] if the result does not exist
    async fn unlock_result(&self, user_id: &str, id: ResultId) -> Result<bool, StoreError>;

    /// Jobs still `pending` that were created before `older_than`.
    async fn count_stale_pending(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(offset: u64, returned: usize, total: u64) -> ResultPage {
        let row = SearchResult {
            id: ResultId::new(1),
            job_id: JobId::new(1),
            position: 0,
            title: "t".into(),
            price: None,
            currency: None,
            image_url: None,
            description: None,
            location: None,
            seller_name: None,
            listing_url: "u".into(),
            created_at: Utc::now(),
            is_unlocked: false,
        };
        ResultPage {
            results: vec![row; returned],
            total,
            offset,
        }
    }

    #[test]
    fn has_more_boundaries() {
        assert!(page(0, 10, 25).has_more());
        assert!(page(10, 10, 25).has_more());
        assert!(!page(20, 5, 25).has_more());
        assert!(!page(25, 0, 25).has_more());
        assert!(!page(0, 0, 0).has_more());
    }

    #[test]
    fn patches_carry_their_timestamps() {
        let now = Utc::now();
        assert_eq!(JobPatch::processing(now).started_at, Some(now));
        let done = JobPatch::completed(3, now);
        assert_eq!(done.result_count, Some(3));
        assert_eq!(done.completed_at, Some(now));
        let failed = JobPatch::failed(
            JobErrorInfo::new(crate::domain::ErrorKind::ParseError, "bad"),
            now,
        );
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.is_some());
    }
}
