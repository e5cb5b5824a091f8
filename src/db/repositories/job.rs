use crate::db::{parse_timestamp, timestamp};
use crate::domain::{JobErrorInfo, JobId, JobStatus, SearchId};
use crate::entities::{prelude::*, search_jobs};
use crate::services::job_store::{JobPatch, SearchJob, StoreError};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

pub struct JobRepository {
    conn: DatabaseConnection,
}

impl JobRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(m: search_jobs::Model) -> Result<SearchJob, StoreError> {
        let optional_ts = |v: Option<String>| v.as_deref().map(parse_timestamp).transpose();

        Ok(SearchJob {
            id: JobId::new(m.id),
            search_id: SearchId::new(m.search_id),
            status: m.status.parse::<JobStatus>().map_err(StoreError::Corrupt)?,
            started_at: optional_ts(m.started_at)?,
            completed_at: optional_ts(m.completed_at)?,
            error: m.error.as_deref().map(JobErrorInfo::decode),
            result_count: m.result_count,
            created_at: parse_timestamp(&m.created_at)?,
        })
    }

    pub async fn create(&self, search_id: SearchId) -> Result<JobId, StoreError> {
        let model = search_jobs::ActiveModel {
            search_id: Set(search_id.value()),
            status: Set(JobStatus::Pending.as_str().to_string()),
            result_count: Set(0),
            created_at: Set(timestamp(Utc::now())),
            ..Default::default()
        }
        .insert(&self.conn)
        .await?;

        Ok(JobId::new(model.id))
    }

    pub async fn get(&self, id: JobId) -> Result<Option<SearchJob>, StoreError> {
        SearchJobs::find_by_id(id.value())
            .one(&self.conn)
            .await?
            .map(Self::map_model)
            .transpose()
    }

    pub async fn latest_for_search(
        &self,
        search_id: SearchId,
    ) -> Result<Option<SearchJob>, StoreError> {
        SearchJobs::find()
            .filter(search_jobs::Column::SearchId.eq(search_id.value()))
            .order_by_desc(search_jobs::Column::Id)
            .one(&self.conn)
            .await?
            .map(Self::map_model)
            .transpose()
    }

    /// Single `UPDATE .. WHERE id = ? AND status IN (predecessors)`.
    pub async fn apply(&self, id: JobId, patch: JobPatch) -> Result<bool, StoreError> {
        let allowed: Vec<&str> = JobStatus::predecessors(patch.status)
            .iter()
            .map(JobStatus::as_str)
            .collect();
        if allowed.is_empty() {
            return Ok(false);
        }

        let mut update = SearchJobs::update_many()
            .col_expr(search_jobs::Column::Status, Expr::value(patch.status.as_str()));
        if let Some(at) = patch.started_at {
            update = update.col_expr(search_jobs::Column::StartedAt, Expr::value(timestamp(at)));
        }
        if let Some(at) = patch.completed_at {
            update = update.col_expr(search_jobs::Column::CompletedAt, Expr::value(timestamp(at)));
        }
        if let Some(error) = &patch.error {
            update = update.col_expr(search_jobs::Column::Error, Expr::value(error.encode()));
        }
        if let Some(count) = patch.result_count {
            update = update.col_expr(search_jobs::Column::ResultCount, Expr::value(count));
        }

        let res = update
            .filter(search_jobs::Column::Id.eq(id.value()))
            .filter(search_jobs::Column::Status.is_in(allowed))
            .exec(&self.conn)
            .await?;

        Ok(res.rows_affected == 1)
    }

    pub async fn count_stale_pending(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(SearchJobs::find()
            .filter(search_jobs::Column::Status.eq(JobStatus::Pending.as_str()))
            .filter(search_jobs::Column::CreatedAt.lt(timestamp(older_than)))
            .count(&self.conn)
            .await?)
    }
}
