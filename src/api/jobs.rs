use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use super::auth::CallerId;
use super::searches::owned_search;
use super::validation::{DEFAULT_PAGE_LIMIT, parse_sort_by, validate_id, validate_limit, validate_offset};
use super::{
    ApiError, ApiResponse, AppState, JobDto, ResultDto, ResultsPageDto, ResultsQuery, UnlockDto,
};
use crate::domain::{JobId, ResultId};
use crate::services::{ResultQuery, SearchJob};

async fn owned_job(state: &AppState, caller: &CallerId, id: i32) -> Result<SearchJob, ApiError> {
    let id = JobId::new(validate_id(id, "job")?);
    let job = state
        .store()
        .get_job(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Job", id))?;

    // Jobs of other users' searches read as missing.
    owned_search(state, caller, job.search_id.value())
        .await
        .map_err(|_| ApiError::not_found("Job", id))?;
    Ok(job)
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    caller: CallerId,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<JobDto>>, ApiError> {
    let job = owned_job(&state, &caller, id).await?;
    Ok(Json(ApiResponse::success(JobDto::from(job))))
}

/// GET /api/jobs/{id}/results
pub async fn get_job_results(
    State(state): State<Arc<AppState>>,
    caller: CallerId,
    Path(id): Path<i32>,
    Query(params): Query<ResultsQuery>,
) -> Result<Json<ApiResponse<ResultsPageDto>>, ApiError> {
    let job = owned_job(&state, &caller, id).await?;

    let query = ResultQuery {
        limit: validate_limit(params.limit.unwrap_or(DEFAULT_PAGE_LIMIT))?,
        offset: validate_offset(params.offset.unwrap_or(0))?,
        sort_by: parse_sort_by(params.sort_by.as_deref())?,
        viewer: Some(caller.0),
    };

    let page = state.store().get_results(job.id, &query).await?;
    let has_more = page.has_more();

    Ok(Json(ApiResponse::success(ResultsPageDto {
        job_id: job.id,
        status: job.status,
        results: page.results.into_iter().map(ResultDto::from).collect(),
        total: page.total,
        limit: query.limit,
        offset: query.offset,
        has_more,
    })))
}

/// POST /api/results/{id}/unlock
pub async fn unlock_result(
    State(state): State<Arc<AppState>>,
    caller: CallerId,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<UnlockDto>>, ApiError> {
    let result_id = ResultId::new(validate_id(id, "result")?);
    let result = state
        .store()
        .get_result(result_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Result", result_id))?;

    owned_job(&state, &caller, result.job_id.value())
        .await
        .map_err(|_| ApiError::not_found("Result", result_id))?;

    let newly_unlocked = state.store().unlock_result(&caller.0, result_id).await?;
    tracing::info!(result_id = %result_id, user = %caller.0, newly_unlocked, "Result unlocked");

    Ok(Json(ApiResponse::success(UnlockDto {
        result_id,
        unlocked: true,
        newly_unlocked,
    })))
}
