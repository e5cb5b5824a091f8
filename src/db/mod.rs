use crate::domain::{JobId, JobStatus, ResultId, SearchId};
use crate::services::job_store::{
    JobPatch, JobStore, NewResult, NewSearch, ResultPage, ResultQuery, Search, SearchJob,
    SearchResult, StoreError,
};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::sqlx::sqlite::SqliteJournalMode;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

const SQLITE_BUSY_TIMEOUT_SECS: u64 = 10;

pub mod migrator;
pub mod repositories;

/// Fixed-width UTC form, so stored timestamps sort lexically.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        // Concurrent jobs write through separate pooled connections.
        if !db_url.contains(":memory:") {
            opt.map_sqlx_sqlite_opts(|o| {
                o.journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(Duration::from_secs(SQLITE_BUSY_TIMEOUT_SECS))
            });
        }

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn search_repo(&self) -> repositories::search::SearchRepository {
        repositories::search::SearchRepository::new(self.conn.clone())
    }

    fn job_repo(&self) -> repositories::job::JobRepository {
        repositories::job::JobRepository::new(self.conn.clone())
    }

    fn result_repo(&self) -> repositories::result::ResultRepository {
        repositories::result::ResultRepository::new(self.conn.clone())
    }
}

#[async_trait::async_trait]
impl JobStore for Store {
    async fn create_search(&self, search: NewSearch) -> Result<Search, StoreError> {
        self.search_repo().create(search).await
    }

    async fn get_search(&self, id: SearchId) -> Result<Option<Search>, StoreError> {
        self.search_repo().get(id).await
    }

    async fn list_searches_for_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<Search>, StoreError> {
        self.search_repo().list_for_user(user_id, limit).await
    }

    async fn update_search_status(
        &self,
        id: SearchId,
        status: JobStatus,
    ) -> Result<(), StoreError> {
        self.search_repo().update_status(id, status).await
    }

    async fn create_job(&self, search_id: SearchId) -> Result<JobId, StoreError> {
        if !self.search_repo().exists(search_id).await? {
            return Err(StoreError::NotFound(format!("search {search_id}")));
        }
        self.job_repo().create(search_id).await
    }

    async fn get_job(&self, id: JobId) -> Result<Option<SearchJob>, StoreError> {
        self.job_repo().get(id).await
    }

    async fn latest_job_for_search(
        &self,
        search_id: SearchId,
    ) -> Result<Option<SearchJob>, StoreError> {
        self.job_repo().latest_for_search(search_id).await
    }

    async fn update_job(&self, id: JobId, patch: JobPatch) -> Result<bool, StoreError> {
        self.job_repo().apply(id, patch).await
    }

    async fn append_results(
        &self,
        job_id: JobId,
        records: Vec<NewResult>,
    ) -> Result<usize, StoreError> {
        self.result_repo().append(job_id, records).await
    }

    async fn get_results(
        &self,
        job_id: JobId,
        query: &ResultQuery,
    ) -> Result<ResultPage, StoreError> {
        self.result_repo().page(job_id, query).await
    }

    async fn get_result(&self, id: ResultId) -> Result<Option<SearchResult>, StoreError> {
        self.result_repo().get(id).await
    }

    async fn unlock_result(&self, user_id: &str, id: ResultId) -> Result<bool, StoreError> {
        self.result_repo().unlock(user_id, id).await
    }

    async fn count_stale_pending(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        self.job_repo().count_stale_pending(older_than).await
    }
}
