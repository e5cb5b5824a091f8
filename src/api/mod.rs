use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::JobStore;
use crate::state::SharedState;

mod admin;
pub mod auth;
mod error;
mod jobs;
mod observability;
mod searches;
mod types;
mod validation;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.shared.jobs
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().server.cors_allowed_origins.clone();

    let admin_routes = Router::new()
        .route("/admin/quota", get(admin::get_quota))
        .route("/admin/proxy", get(admin::get_proxy))
        .route("/admin/cache", get(admin::get_cache_stats))
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::admin_middleware,
        ));

    let api_router = Router::new()
        .route(
            "/searches",
            get(searches::list_searches).post(searches::create_search),
        )
        .route("/searches/{id}", get(searches::get_search))
        .route("/searches/{id}/rerun", post(searches::rerun_search))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/results", get(jobs::get_job_results))
        .route("/results/{id}/unlock", post(jobs::unlock_result))
        .route("/health", get(observability::get_health))
        .merge(admin_routes)
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}
