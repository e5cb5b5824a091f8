use crate::db::{parse_timestamp, timestamp};
use crate::domain::{JobStatus, SearchFilters, SearchId};
use crate::entities::{prelude::*, searches};
use crate::services::job_store::{NewSearch, Search, StoreError};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

pub struct SearchRepository {
    conn: DatabaseConnection,
}

impl SearchRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(m: searches::Model) -> Result<Search, StoreError> {
        let filters: SearchFilters = serde_json::from_str(&m.filters_json)
            .map_err(|e| StoreError::Corrupt(format!("search {} filters: {e}", m.id)))?;
        let status = m.status.parse::<JobStatus>().map_err(StoreError::Corrupt)?;

        Ok(Search {
            id: SearchId::new(m.id),
            user_id: m.user_id,
            query: m.query,
            filters,
            status,
            created_at: parse_timestamp(&m.created_at)?,
            updated_at: parse_timestamp(&m.updated_at)?,
        })
    }

    pub async fn create(&self, search: NewSearch) -> Result<Search, StoreError> {
        let now = timestamp(Utc::now());
        let filters_json = serde_json::to_string(&search.filters)
            .map_err(|e| StoreError::Corrupt(format!("filters not serializable: {e}")))?;

        let model = searches::ActiveModel {
            user_id: Set(search.user_id),
            query: Set(search.query),
            filters_json: Set(filters_json),
            status: Set(JobStatus::Pending.as_str().to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await?;

        Self::map_model(model)
    }

    pub async fn get(&self, id: SearchId) -> Result<Option<Search>, StoreError> {
        Searches::find_by_id(id.value())
            .one(&self.conn)
            .await?
            .map(Self::map_model)
            .transpose()
    }

    pub async fn exists(&self, id: SearchId) -> Result<bool, StoreError> {
        Ok(Searches::find_by_id(id.value())
            .one(&self.conn)
            .await?
            .is_some())
    }

    pub async fn list_for_user(&self, user_id: &str, limit: u64) -> Result<Vec<Search>, StoreError> {
        let rows = Searches::find()
            .filter(searches::Column::UserId.eq(user_id))
            .order_by_desc(searches::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?;

        rows.into_iter().map(Self::map_model).collect()
    }

    pub async fn update_status(&self, id: SearchId, status: JobStatus) -> Result<(), StoreError> {
        Searches::update_many()
            .col_expr(searches::Column::Status, Expr::value(status.as_str()))
            .col_expr(
                searches::Column::UpdatedAt,
                Expr::value(timestamp(Utc::now())),
            )
            .filter(searches::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await?;
        Ok(())
    }
}
