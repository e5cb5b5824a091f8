use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::info;

use super::auth::CallerId;
use super::validation::{validate_filters, validate_id, validate_limit, validate_search_query};
use super::{
    ApiError, ApiResponse, AppState, CreateSearchRequest, ListQuery, SearchCreatedDto, SearchDto,
};
use crate::domain::{JobStatus, SearchId};
use crate::services::{NewSearch, Search};

const DEFAULT_LIST_LIMIT: u64 = 50;

/// Loads a search owned by `caller`. Other users' searches read as missing.
pub(super) async fn owned_search(
    state: &AppState,
    caller: &CallerId,
    id: i32,
) -> Result<Search, ApiError> {
    let id = SearchId::new(validate_id(id, "search")?);
    match state.store().get_search(id).await? {
        Some(search) if search.user_id == caller.0 => Ok(search),
        _ => Err(ApiError::not_found("Search", id)),
    }
}

async fn create_and_submit_job(
    state: &AppState,
    search: &Search,
) -> Result<SearchCreatedDto, ApiError> {
    let job_id = state.store().create_job(search.id).await?;
    drop(state.shared.dispatcher.submit(job_id));

    Ok(SearchCreatedDto {
        search_id: search.id,
        job_id,
        status: JobStatus::Pending,
    })
}

/// POST /api/searches
pub async fn create_search(
    State(state): State<Arc<AppState>>,
    caller: CallerId,
    Json(request): Json<CreateSearchRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SearchCreatedDto>>), ApiError> {
    let query = validate_search_query(&request.query)?.to_string();
    validate_filters(&request.filters)?;

    let search = state
        .store()
        .create_search(NewSearch {
            user_id: caller.0.clone(),
            query,
            filters: request.filters,
        })
        .await?;
    info!(search_id = %search.id, user = %caller.0, "Search created");

    let created = create_and_submit_job(&state, &search).await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(created))))
}

/// GET /api/searches
pub async fn list_searches(
    State(state): State<Arc<AppState>>,
    caller: CallerId,
    Query(params): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<SearchDto>>>, ApiError> {
    let limit = validate_limit(params.limit.unwrap_or(DEFAULT_LIST_LIMIT))?;
    let searches = state
        .store()
        .list_searches_for_user(&caller.0, limit)
        .await?;

    let mut dtos = Vec::with_capacity(searches.len());
    for search in searches {
        let latest = state.store().latest_job_for_search(search.id).await?;
        dtos.push(SearchDto::new(search, latest));
    }

    Ok(Json(ApiResponse::success(dtos)))
}

/// GET /api/searches/{id}
pub async fn get_search(
    State(state): State<Arc<AppState>>,
    caller: CallerId,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<SearchDto>>, ApiError> {
    let search = owned_search(&state, &caller, id).await?;
    let latest = state.store().latest_job_for_search(search.id).await?;
    Ok(Json(ApiResponse::success(SearchDto::new(search, latest))))
}

/// POST /api/searches/{id}/rerun
///
/// Starts a fresh job. Refused while the newest job is still running.
pub async fn rerun_search(
    State(state): State<Arc<AppState>>,
    caller: CallerId,
    Path(id): Path<i32>,
) -> Result<(StatusCode, Json<ApiResponse<SearchCreatedDto>>), ApiError> {
    let search = owned_search(&state, &caller, id).await?;

    if let Some(latest) = state.store().latest_job_for_search(search.id).await?
        && !latest.status.is_terminal()
    {
        return Err(ApiError::conflict(format!(
            "Search {} already has job {} {}",
            search.id, latest.id, latest.status
        )));
    }

    state
        .store()
        .update_search_status(search.id, JobStatus::Pending)
        .await?;
    let created = create_and_submit_job(&state, &search).await?;
    info!(search_id = %search.id, job_id = %created.job_id, "Search re-run");

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(created))))
}
