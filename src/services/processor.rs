//! Runs one search job through its state machine.
//!
//! `pending -> processing` is claimed with a conditional write, so a job id
//! executes at most once even if it is submitted twice. Everything that goes
//! wrong after the claim ends up in the job row as `failed` with a
//! `KIND: message` error; nothing is returned to the submitter.

use crate::cache::Cache;
use crate::clients::scraper::{self, ListingScraper, RawListing, ScrapeError};
use crate::config::{Config, ScraperConfig};
use crate::domain::{ErrorKind, JobErrorInfo, JobId, JobStatus, SearchId};
use crate::services::job_store::{JobPatch, JobStore, Search, SearchJob, StoreError};
use crate::services::normalize::normalize_listings;
use crate::services::quota::QuotaGuard;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Listings cached per normalized query and filters.
pub type ListingCache = Cache<Vec<RawListing>, ScrapeError>;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    #[error("Search {0} not found")]
    SearchNotFound(SearchId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a call to [`SearchProcessor::run`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { result_count: usize },
    Failed(JobErrorInfo),
    /// The job was not `pending`, or another runner claimed it first.
    Skipped(JobStatus),
    NotFound,
}

impl JobOutcome {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Failed(_) => "failed",
            Self::Skipped(_) => "skipped",
            Self::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub max_results_per_job: usize,
    /// Proceed with the scrape when the quota check itself fails.
    pub quota_fail_open: bool,
    pub scraper: ScraperConfig,
}

impl From<&Config> for ProcessorSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_results_per_job: config.jobs.max_results_per_job,
            quota_fail_open: config.quota.fail_open,
            scraper: config.scraper.clone(),
        }
    }
}

fn scrape_failure(e: &ScrapeError) -> JobErrorInfo {
    JobErrorInfo::new(e.kind(), e.detail())
}

fn store_failure(e: &StoreError) -> JobErrorInfo {
    JobErrorInfo::new(ErrorKind::Unknown, e.to_string())
}

pub struct SearchProcessor {
    store: Arc<dyn JobStore>,
    quota: Arc<QuotaGuard>,
    scraper: Arc<dyn ListingScraper>,
    cache: Arc<ListingCache>,
    settings: ProcessorSettings,
}

impl SearchProcessor {
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        quota: Arc<QuotaGuard>,
        scraper: Arc<dyn ListingScraper>,
        cache: Arc<ListingCache>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            store,
            quota,
            scraper,
            cache,
            settings,
        }
    }

    /// Executes `job_id` to a terminal state.
    ///
    /// The outcome is informational; the job row is the record callers poll.
    pub async fn run(&self, job_id: JobId) -> JobOutcome {
        let started = Instant::now();

        let outcome = match self.execute(job_id).await {
            Ok(outcome) => outcome,
            Err(ProcessError::JobNotFound(_) | ProcessError::SearchNotFound(_)) => {
                JobOutcome::NotFound
            }
            Err(ProcessError::Store(e)) => {
                error!(event = "job_store_error", job_id = %job_id, error = %e, "Job aborted");
                let info = store_failure(&e);
                if let Err(e) = self.finish(job_id, None, JobPatch::failed(info.clone(), Utc::now())).await {
                    error!(job_id = %job_id, error = %e, "Could not record job failure");
                }
                JobOutcome::Failed(info)
            }
        };

        metrics::counter!("search_jobs_total", "status" => outcome.label()).increment(1);
        if matches!(outcome, JobOutcome::Completed { .. } | JobOutcome::Failed(_)) {
            metrics::histogram!("search_job_duration_seconds")
                .record(started.elapsed().as_secs_f64());
        }

        match &outcome {
            JobOutcome::Completed { result_count } => info!(
                event = "job_completed",
                job_id = %job_id,
                result_count,
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Search job completed"
            ),
            JobOutcome::Failed(err) => warn!(
                event = "job_failed",
                job_id = %job_id,
                kind = %err.kind,
                error = %err.message,
                "Search job failed"
            ),
            JobOutcome::Skipped(status) => debug!(
                job_id = %job_id,
                status = %status,
                "Search job not pending, skipped"
            ),
            JobOutcome::NotFound => {}
        }

        outcome
    }

    async fn execute(&self, job_id: JobId) -> Result<JobOutcome, ProcessError> {
        let Some(job) = self.store.get_job(job_id).await? else {
            warn!(job_id = %job_id, kind = %ErrorKind::NotFound, "Job missing at dispatch");
            return Err(ProcessError::JobNotFound(job_id));
        };
        let Some(search) = self.store.get_search(job.search_id).await? else {
            warn!(
                job_id = %job_id,
                search_id = %job.search_id,
                kind = %ErrorKind::NotFound,
                "Search missing at dispatch"
            );
            return Err(ProcessError::SearchNotFound(job.search_id));
        };

        if job.status != JobStatus::Pending {
            return Ok(JobOutcome::Skipped(job.status));
        }
        if !self
            .store
            .update_job(job_id, JobPatch::processing(Utc::now()))
            .await?
        {
            let current = self
                .store
                .get_job(job_id)
                .await?
                .map_or(JobStatus::Processing, |j| j.status);
            return Ok(JobOutcome::Skipped(current));
        }
        info!(
            event = "job_started",
            job_id = %job_id,
            search_id = %search.id,
            query = %search.query,
            "Search job claimed"
        );
        self.sync_search_status(&job, JobStatus::Processing).await?;

        let (patch, outcome) = match self.scrape_and_store(job_id, &search).await {
            Ok(count) => (
                JobPatch::completed(i32::try_from(count).unwrap_or(i32::MAX), Utc::now()),
                JobOutcome::Completed {
                    result_count: count,
                },
            ),
            Err(info) => (
                JobPatch::failed(info.clone(), Utc::now()),
                JobOutcome::Failed(info),
            ),
        };

        self.finish(job_id, Some(&job), patch).await?;
        Ok(outcome)
    }

    async fn scrape_and_store(&self, job_id: JobId, search: &Search) -> Result<usize, JobErrorInfo> {
        match self.quota.check_quota().await {
            Ok(snapshot) if !snapshot.has_capacity() => {
                let reset = snapshot
                    .reset_at
                    .map_or_else(|| "unknown".to_string(), |r| r.to_rfc3339());
                return Err(JobErrorInfo::new(
                    ErrorKind::QuotaExceeded,
                    format!("no scrape calls remaining (resets at {reset})"),
                ));
            }
            Ok(_) => {}
            Err(e) if self.settings.quota_fail_open => {
                warn!(job_id = %job_id, error = %e, "Quota unknown, proceeding with scrape");
            }
            Err(e) => return Err(scrape_failure(&e)),
        }

        let target = scraper::build_target(&self.settings.scraper, &search.query, &search.filters)
            .map_err(|e| scrape_failure(&e))?;
        let key = search.filters.cache_key(&search.query);

        let scraper = Arc::clone(&self.scraper);
        let listings = self
            .cache
            .get_or_set(
                &key,
                move || async move { scraper.fetch(&target).await },
                None,
            )
            .await
            .map_err(|e| scrape_failure(&e))?;

        let rows = normalize_listings(&listings, self.settings.max_results_per_job);
        debug!(
            job_id = %job_id,
            raw = listings.len(),
            kept = rows.len(),
            "Listings normalized"
        );

        self.store
            .append_results(job_id, rows)
            .await
            .map_err(|e| store_failure(&e))
    }

    /// Writes the terminal patch and mirrors it onto the search.
    async fn finish(
        &self,
        job_id: JobId,
        job: Option<&SearchJob>,
        patch: JobPatch,
    ) -> Result<(), StoreError> {
        let status = patch.status;
        if !self.store.update_job(job_id, patch).await? {
            warn!(job_id = %job_id, status = %status, "Job left processing before it finished");
            return Ok(());
        }

        let job = match job {
            Some(job) => Some(job.clone()),
            None => self.store.get_job(job_id).await?,
        };
        if let Some(job) = job {
            self.sync_search_status(&job, status).await?;
        }
        Ok(())
    }

    /// Fails a job whose task died without reaching a terminal state.
    ///
    /// A pending job is claimed first so it never skips `processing`.
    pub async fn abandon(&self, job_id: JobId, error: JobErrorInfo) -> Result<bool, StoreError> {
        let now = Utc::now();
        self.store
            .update_job(job_id, JobPatch::processing(now))
            .await?;
        let failed = self
            .store
            .update_job(job_id, JobPatch::failed(error, now))
            .await?;

        if failed && let Some(job) = self.store.get_job(job_id).await? {
            self.sync_search_status(&job, JobStatus::Failed).await?;
        }
        Ok(failed)
    }

    /// Only the newest job of a search drives the search's status.
    async fn sync_search_status(&self, job: &SearchJob, status: JobStatus) -> Result<(), StoreError> {
        let latest = self.store.latest_job_for_search(job.search_id).await?;
        if latest.is_some_and(|l| l.id == job.id) {
            self.store
                .update_search_status(job.search_id, status)
                .await?;
        }
        Ok(())
    }
}
