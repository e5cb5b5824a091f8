use crate::db::{parse_timestamp, timestamp};
use crate::domain::{JobId, ResultId, SortBy};
use crate::entities::{prelude::*, result_unlocks, search_results};
use crate::services::job_store::{NewResult, ResultPage, ResultQuery, SearchResult, StoreError};
use chrono::Utc;
use sea_orm::sea_query::{NullOrdering, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::collections::HashSet;

pub struct ResultRepository {
    conn: DatabaseConnection,
}

impl ResultRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(m: search_results::Model, is_unlocked: bool) -> Result<SearchResult, StoreError> {
        Ok(SearchResult {
            id: ResultId::new(m.id),
            job_id: JobId::new(m.job_id),
            position: m.position,
            title: m.title,
            price: m.price,
            currency: m.currency,
            image_url: m.image_url,
            description: m.description,
            location: m.location,
            seller_name: m.seller_name,
            listing_url: m.listing_url,
            created_at: parse_timestamp(&m.created_at)?,
            is_unlocked,
        })
    }

    /// Inserts all rows in one transaction, positioned after any existing ones.
    pub async fn append(&self, job_id: JobId, records: Vec<NewResult>) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        // Reads stay outside the transaction so it never upgrades a read lock.
        // Only the job's own processor appends its rows.
        if SearchJobs::find_by_id(job_id.value()).one(&self.conn).await?.is_none() {
            return Err(StoreError::NotFound(format!("job {job_id}")));
        }

        let existing = SearchResults::find()
            .filter(search_results::Column::JobId.eq(job_id.value()))
            .count(&self.conn)
            .await?;
        let start = i32::try_from(existing).unwrap_or(i32::MAX);
        let now = timestamp(Utc::now());
        let count = records.len();

        let models: Vec<search_results::ActiveModel> = records
            .into_iter()
            .zip(start..)
            .map(|(r, position)| search_results::ActiveModel {
                job_id: Set(job_id.value()),
                position: Set(position),
                title: Set(r.title),
                price: Set(r.price),
                currency: Set(r.currency),
                image_url: Set(r.image_url),
                description: Set(r.description),
                location: Set(r.location),
                seller_name: Set(r.seller_name),
                listing_url: Set(r.listing_url),
                created_at: Set(now.clone()),
                ..Default::default()
            })
            .collect();

        let txn = self.conn.begin().await?;
        SearchResults::insert_many(models).exec(&txn).await?;
        txn.commit().await?;

        Ok(count)
    }

    pub async fn page(&self, job_id: JobId, query: &ResultQuery) -> Result<ResultPage, StoreError> {
        let base = SearchResults::find().filter(search_results::Column::JobId.eq(job_id.value()));
        let total = base.clone().count(&self.conn).await?;

        let ordered = match query.sort_by {
            SortBy::Relevance => base,
            SortBy::PriceAsc => base.order_by_with_nulls(
                search_results::Column::Price,
                Order::Asc,
                NullOrdering::Last,
            ),
            SortBy::PriceDesc => base.order_by_with_nulls(
                search_results::Column::Price,
                Order::Desc,
                NullOrdering::Last,
            ),
            SortBy::Date => base.order_by_desc(search_results::Column::CreatedAt),
        };

        let rows = ordered
            .order_by_asc(search_results::Column::Position)
            .offset(query.offset)
            .limit(query.limit)
            .all(&self.conn)
            .await?;

        let unlocked = match &query.viewer {
            Some(viewer) if !rows.is_empty() => {
                self.unlocked_ids(viewer, rows.iter().map(|r| r.id).collect())
                    .await?
            }
            _ => HashSet::new(),
        };

        let results = rows
            .into_iter()
            .map(|r| {
                let is_unlocked = unlocked.contains(&r.id);
                Self::map_model(r, is_unlocked)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ResultPage {
            results,
            total,
            offset: query.offset,
        })
    }

    async fn unlocked_ids(&self, user_id: &str, ids: Vec<i32>) -> Result<HashSet<i32>, StoreError> {
        let rows = ResultUnlocks::find()
            .filter(result_unlocks::Column::UserId.eq(user_id))
            .filter(result_unlocks::Column::ResultId.is_in(ids))
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(|u| u.result_id).collect())
    }

    pub async fn get(&self, id: ResultId) -> Result<Option<SearchResult>, StoreError> {
        SearchResults::find_by_id(id.value())
            .one(&self.conn)
            .await?
            .map(|m| Self::map_model(m, false))
            .transpose()
    }

    pub async fn unlock(&self, user_id: &str, id: ResultId) -> Result<bool, StoreError> {
        if SearchResults::find_by_id(id.value())
            .one(&self.conn)
            .await?
            .is_none()
        {
            return Err(StoreError::NotFound(format!("result {id}")));
        }

        let inserted = ResultUnlocks::insert(result_unlocks::ActiveModel {
            result_id: Set(id.value()),
            user_id: Set(user_id.to_string()),
            unlocked_at: Set(timestamp(Utc::now())),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                result_unlocks::Column::ResultId,
                result_unlocks::Column::UserId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await?;

        Ok(inserted == 1)
    }
}
