use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use http_body_util::BodyExt;
use marketwatch::clients::scraper::{
    ListingScraper, QuotaProvider, QuotaSnapshot, RawListing, RawPrice, ScrapeError, ScrapeTarget,
};
use marketwatch::config::Config;
use marketwatch::state::SharedState;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key";

struct StaticScraper(Vec<RawListing>);

#[async_trait]
impl ListingScraper for StaticScraper {
    async fn fetch(&self, _target: &ScrapeTarget) -> Result<Vec<RawListing>, ScrapeError> {
        Ok(self.0.clone())
    }
}

struct StaticQuota(i64);

#[async_trait]
impl QuotaProvider for StaticQuota {
    async fn fetch_quota(&self) -> Result<QuotaSnapshot, ScrapeError> {
        Ok(QuotaSnapshot {
            remaining: self.0,
            reset_at: None,
            observed_at: Utc::now(),
        })
    }
}

fn listings(n: usize) -> Vec<RawListing> {
    (0..n)
        .map(|i| RawListing {
            title: Some(format!("Bike {i}")),
            price: Some(RawPrice::Text(format!("${}", 100 + i))),
            seller: Some(format!("Seller {i}")),
            url: Some(format!("https://www.facebook.com/marketplace/item/{i}/")),
            ..Default::default()
        })
        .collect()
}

async fn spawn_app_with(listing_count: usize, remaining: i64) -> Router {
    let db_path =
        std::env::temp_dir().join(format!("marketwatch-api-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.server.admin_api_key = ADMIN_KEY.to_string();
    config.scraper.proxy_username = "brd-customer-1".to_string();
    config.scraper.proxy_password = "hunter2".to_string();

    let shared = SharedState::with_backends(
        config,
        Arc::new(StaticScraper(listings(listing_count))),
        Arc::new(StaticQuota(remaining)),
    )
    .await
    .expect("failed to create state");

    marketwatch::api::router(marketwatch::api::create_app_state(Arc::new(shared), None))
}

async fn spawn_app() -> Router {
    spawn_app_with(25, 100).await
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, user: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("X-User-Id", user)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn create_search(app: &Router, user: &str, body: Value) -> (i64, i64) {
    let (status, body) = send(app, post_json("/api/searches", user, &body)).await;
    assert_eq!(status, StatusCode::ACCEPTED, "body: {body}");
    assert_eq!(body["data"]["status"], "pending");
    (
        body["data"]["search_id"].as_i64().unwrap(),
        body["data"]["job_id"].as_i64().unwrap(),
    )
}

async fn wait_for_job(app: &Router, user: &str, job_id: i64) -> Value {
    for _ in 0..200 {
        let (status, body) = send(app, get(&format!("/api/jobs/{job_id}"), Some(user))).await;
        assert_eq!(status, StatusCode::OK);
        let state = body["data"]["status"].as_str().unwrap_or_default().to_string();
        if state == "completed" || state == "failed" {
            return body["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never finished");
}

#[tokio::test]
async fn create_search_and_poll_results() {
    let app = spawn_app().await;
    let (search_id, job_id) = create_search(
        &app,
        "alice",
        json!({ "query": "road bike", "location": "austin", "max_price": 500.0 }),
    )
    .await;

    let job = wait_for_job(&app, "alice", job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["result_count"], 25);
    assert!(job["error"].is_null());

    let (status, body) = send(&app, get(&format!("/api/searches/{search_id}"), Some("alice"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["filters"]["location"], "austin");
    assert_eq!(body["data"]["latest_job"]["id"], job_id);

    let (status, body) = send(
        &app,
        get(&format!("/api/jobs/{job_id}/results?limit=10&offset=20"), Some("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let page = &body["data"];
    assert_eq!(page["total"], 25);
    assert_eq!(page["results"].as_array().unwrap().len(), 5);
    assert_eq!(page["has_more"], false);
    assert_eq!(page["results"][0]["title"], "Bike 20");
    assert_eq!(page["results"][0]["price"], 120.0);

    let (_, body) = send(
        &app,
        get(&format!("/api/jobs/{job_id}/results?limit=10"), Some("alice")),
    )
    .await;
    assert_eq!(body["data"]["has_more"], true);
}

#[tokio::test]
async fn results_sort_by_price_desc() {
    let app = spawn_app_with(3, 100).await;
    let (_, job_id) = create_search(&app, "alice", json!({ "query": "bike" })).await;
    wait_for_job(&app, "alice", job_id).await;

    let (status, body) = send(
        &app,
        get(&format!("/api/jobs/{job_id}/results?sort_by=price_desc"), Some("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body["data"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Bike 2", "Bike 1", "Bike 0"]);

    let (status, _) = send(
        &app,
        get(&format!("/api/jobs/{job_id}/results?sort_by=cheapest"), Some("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn results_offset_is_bounded() {
    let app = spawn_app_with(3, 100).await;
    let (_, job_id) = create_search(&app, "alice", json!({ "query": "bike" })).await;
    wait_for_job(&app, "alice", job_id).await;

    let (status, body) = send(
        &app,
        get(
            &format!("/api/jobs/{job_id}/results?offset={}", i64::MAX),
            Some("alice"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 0);
    assert_eq!(body["data"]["has_more"], false);

    let too_far = u64::try_from(i64::MAX).unwrap() + 1;
    let (status, body) = send(
        &app,
        get(
            &format!("/api/jobs/{job_id}/results?offset={too_far}"),
            Some("alice"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn exhausted_quota_is_visible_on_job() {
    let app = spawn_app_with(5, 0).await;
    let (_, job_id) = create_search(&app, "alice", json!({ "query": "bike" })).await;

    let job = wait_for_job(&app, "alice", job_id).await;
    assert_eq!(job["status"], "failed");
    assert_eq!(job["error"]["kind"], "QUOTA_EXCEEDED");
    assert_eq!(job["result_count"], 0);
}

#[tokio::test]
async fn invalid_searches_are_rejected() {
    let app = spawn_app().await;

    let cases = [
        json!({ "query": "   " }),
        json!({ "query": "x".repeat(201) }),
        json!({ "query": "bike", "min_price": -1.0 }),
        json!({ "query": "bike", "min_price": 50.0, "max_price": 10.0 }),
        json!({ "query": "bike", "radius_km": 0 }),
    ];
    for case in cases {
        let (status, body) = send(&app, post_json("/api/searches", "alice", &case)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "case: {case}");
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    let (status, _) = send(&app, get("/api/searches?limit=0", Some("alice"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/api/jobs/0", Some("alice"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn caller_identity_is_required() {
    let app = spawn_app().await;

    let (status, body) = send(&app, get("/api/searches", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(&app, get("/api/searches", Some("  "))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn searches_are_private_to_their_owner() {
    let app = spawn_app().await;
    let (search_id, job_id) = create_search(&app, "alice", json!({ "query": "bike" })).await;
    wait_for_job(&app, "alice", job_id).await;

    for uri in [
        format!("/api/searches/{search_id}"),
        format!("/api/jobs/{job_id}"),
        format!("/api/jobs/{job_id}/results"),
    ] {
        let (status, _) = send(&app, get(&uri, Some("mallory"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "uri: {uri}");
    }

    let (status, body) = send(&app, get("/api/searches", Some("mallory"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (_, body) = send(&app, get("/api/searches", Some("alice"))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, get("/api/searches/9999", Some("alice"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unlock_reveals_contact_details() {
    let app = spawn_app_with(2, 100).await;
    let (_, job_id) = create_search(&app, "alice", json!({ "query": "bike" })).await;
    wait_for_job(&app, "alice", job_id).await;

    let results_uri = format!("/api/jobs/{job_id}/results");
    let (_, body) = send(&app, get(&results_uri, Some("alice"))).await;
    let first = &body["data"]["results"][0];
    assert_eq!(first["is_unlocked"], false);
    assert!(first["seller_name"].is_null());
    assert!(first["listing_url"].is_null());
    let result_id = first["id"].as_i64().unwrap();

    let unlock_uri = format!("/api/results/{result_id}/unlock");
    let (status, body) = send(&app, post_json(&unlock_uri, "alice", &json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["newly_unlocked"], true);

    let (_, body) = send(&app, post_json(&unlock_uri, "alice", &json!({}))).await;
    assert_eq!(body["data"]["unlocked"], true);
    assert_eq!(body["data"]["newly_unlocked"], false);

    let (_, body) = send(&app, get(&results_uri, Some("alice"))).await;
    let first = &body["data"]["results"][0];
    assert_eq!(first["is_unlocked"], true);
    assert_eq!(first["seller_name"], "Seller 0");
    assert_eq!(
        first["listing_url"],
        "https://www.facebook.com/marketplace/item/0/"
    );
    assert_eq!(body["data"]["results"][1]["is_unlocked"], false);

    let (status, _) = send(&app, post_json(&unlock_uri, "mallory", &json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rerun_starts_a_new_job() {
    let app = spawn_app_with(1, 100).await;
    let (search_id, first_job) = create_search(&app, "alice", json!({ "query": "bike" })).await;
    wait_for_job(&app, "alice", first_job).await;

    let rerun_uri = format!("/api/searches/{search_id}/rerun");
    let (status, body) = send(&app, post_json(&rerun_uri, "alice", &json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let second_job = body["data"]["job_id"].as_i64().unwrap();
    assert_ne!(second_job, first_job);

    let job = wait_for_job(&app, "alice", second_job).await;
    assert_eq!(job["status"], "completed");

    let (_, body) = send(&app, get(&format!("/api/searches/{search_id}"), Some("alice"))).await;
    assert_eq!(body["data"]["latest_job"]["id"], second_job);

    let (status, _) = send(&app, post_json(&rerun_uri, "mallory", &json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_require_api_key() {
    let app = spawn_app().await;

    let (status, _) = send(&app, get("/api/admin/quota", Some("alice"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/admin/proxy")
        .header("X-Api-Key", "wrong-key")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/admin/proxy")
        .header("X-Api-Key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "brd-customer-1");
    assert_eq!(body["data"]["has_password"], true);
    assert!(body["data"].get("password").is_none());

    let request = Request::builder()
        .uri("/api/admin/quota")
        .header("Authorization", format!("Bearer {ADMIN_KEY}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["remaining"], 100);
    assert_eq!(body["data"]["has_capacity"], true);

    let request = Request::builder()
        .uri("/api/admin/cache")
        .header("X-Api-Key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["entries"], 0);
}

#[tokio::test]
async fn health_reports_database() {
    let app = spawn_app().await;

    let (status, body) = send(&app, get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], true);
}
