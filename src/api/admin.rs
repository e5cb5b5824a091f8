use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, QuotaDto};
use crate::cache::CacheStats;
use crate::clients::scraper::ProxyDetails;

/// GET /api/admin/quota
pub async fn get_quota(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<QuotaDto>>, ApiError> {
    let snapshot = state.shared.quota.check_quota().await?;

    Ok(Json(ApiResponse::success(QuotaDto {
        remaining: snapshot.remaining,
        reset_at: snapshot.reset_at.map(|t| t.to_rfc3339()),
        observed_at: snapshot.observed_at.to_rfc3339(),
        has_capacity: snapshot.has_capacity(),
    })))
}

/// GET /api/admin/proxy
pub async fn get_proxy(State(state): State<Arc<AppState>>) -> Json<ApiResponse<ProxyDetails>> {
    Json(ApiResponse::success(state.shared.scraper.proxy_details()))
}

/// GET /api/admin/cache
pub async fn get_cache_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<CacheStats>> {
    Json(ApiResponse::success(state.shared.cache.stats().await))
}
