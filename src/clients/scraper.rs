//! Client for the external scraping service.
//!
//! One [`ScraperClient::fetch`] is one billed call. The client never retries;
//! callers decide what to do with each [`ScrapeError`] kind.

use crate::config::ScraperConfig;
use crate::domain::{ErrorKind, SearchFilters};
use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Longest slice of an upstream error body kept in messages.
const BODY_SNIPPET_LEN: usize = 200;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("Invalid scrape target: {0}")]
    Validation(String),

    #[error("Scraper quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Scraper request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Unexpected scraper payload: {0}")]
    Parse(String),

    #[error("Scraper service error: {0}")]
    ExternalService(String),

    #[error("Scrape failed: {0}")]
    Unknown(String),
}

impl ScrapeError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Self::UpstreamTimeout(_) => ErrorKind::UpstreamTimeout,
            Self::Parse(_) => ErrorKind::ParseError,
            Self::ExternalService(_) => ErrorKind::ExternalServiceError,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// The message without the kind prefix added by `Display`.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Validation(m)
            | Self::QuotaExceeded(m)
            | Self::UpstreamTimeout(m)
            | Self::Parse(m)
            | Self::ExternalService(m)
            | Self::Unknown(m) => m,
        }
    }
}

/// A validated marketplace URL ready to be scraped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTarget {
    url: Url,
}

impl ScrapeTarget {
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// Price as returned upstream: either a number or display text like `"$1,200"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Amount(f64),
    Text(String),
}

/// One listing as the scraping service reports it. Every field is optional;
/// normalization decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawListing {
    #[serde(alias = "listing_id")]
    pub id: Option<String>,
    #[serde(alias = "marketplace_listing_title", alias = "name")]
    pub title: Option<String>,
    #[serde(alias = "listing_price")]
    pub price: Option<RawPrice>,
    pub currency: Option<String>,
    #[serde(alias = "primary_listing_photo", alias = "image_url")]
    pub image: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "location_text")]
    pub location: Option<String>,
    #[serde(alias = "seller_name")]
    pub seller: Option<String>,
    #[serde(alias = "listing_url", alias = "link")]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScrapePayload {
    Listings(Vec<RawListing>),
    Wrapped { listings: Vec<RawListing> },
    Error { error: String },
}

/// Remaining call budget as last reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub remaining: i64,
    pub reset_at: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

impl QuotaSnapshot {
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.remaining > 0
    }
}

#[derive(Debug, Deserialize)]
struct QuotaResponse {
    remaining: i64,
    #[serde(default)]
    reset_at: Option<DateTime<Utc>>,
}

/// Static proxy settings, safe to show on diagnostics pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyDetails {
    pub host: String,
    pub port: u16,
    pub zone: String,
    pub username: String,
    pub has_password: bool,
}

/// Anything that can turn a target into raw listings.
#[async_trait::async_trait]
pub trait ListingScraper: Send + Sync {
    async fn fetch(&self, target: &ScrapeTarget) -> Result<Vec<RawListing>, ScrapeError>;
}

/// Anything that can report the remaining scrape budget.
#[async_trait::async_trait]
pub trait QuotaProvider: Send + Sync {
    async fn fetch_quota(&self) -> Result<QuotaSnapshot, ScrapeError>;
}

#[derive(Clone)]
pub struct ScraperClient {
    client: Client,
    config: ScraperConfig,
}

impl ScraperClient {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent("Marketwatch/1.0")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build scraper HTTP client: {e}"))?;
        Ok(Self { client, config })
    }

    /// Reuses an existing client. Its timeout should match
    /// `config.request_timeout_seconds`.
    #[must_use]
    pub const fn with_shared_client(client: Client, config: ScraperConfig) -> Self {
        Self { client, config }
    }

    /// Checks that `url` is a supported marketplace page. No network I/O.
    pub fn test_preset(&self, url: &str) -> Result<ScrapeTarget, ScrapeError> {
        validate_listing_url(url, &self.config.allowed_hosts)
    }

    #[must_use]
    pub fn proxy_details(&self) -> ProxyDetails {
        ProxyDetails {
            host: self.config.proxy_host.clone(),
            port: self.config.proxy_port,
            zone: self.config.zone.clone(),
            username: self.config.proxy_username.clone(),
            has_password: !self.config.proxy_password.is_empty(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_url.trim_end_matches('/'))
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> ScrapeError {
        if err.is_timeout() {
            ScrapeError::UpstreamTimeout(format!(
                "no response within {}s",
                self.config.request_timeout_seconds
            ))
        } else {
            ScrapeError::Unknown(err.to_string())
        }
    }
}

#[async_trait::async_trait]
impl ListingScraper for ScraperClient {
    async fn fetch(&self, target: &ScrapeTarget) -> Result<Vec<RawListing>, ScrapeError> {
        let target = self.test_preset(target.as_str())?;
        debug!(target = %target.as_str(), "Requesting scrape");

        let body = serde_json::json!({
            "zone": self.config.zone,
            "url": target.as_str(),
            "format": "json",
        });

        let response = self
            .client
            .post(self.endpoint("request"))
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let err = self.map_transport_error(&e);
                metrics::counter!("scrape_requests_total", "outcome" => "transport_error")
                    .increment(1);
                err
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        if let Some(err) = classify_status(status, &text) {
            warn!(status = status.as_u16(), error = %err, "Scrape rejected upstream");
            metrics::counter!("scrape_requests_total", "outcome" => err.kind().as_str())
                .increment(1);
            return Err(err);
        }

        let listings = parse_listings(&text).inspect_err(|e| {
            metrics::counter!("scrape_requests_total", "outcome" => e.kind().as_str())
                .increment(1);
        })?;
        metrics::counter!("scrape_requests_total", "outcome" => "success").increment(1);
        debug!(count = listings.len(), "Scrape returned listings");
        Ok(listings)
    }
}

#[async_trait::async_trait]
impl QuotaProvider for ScraperClient {
    async fn fetch_quota(&self) -> Result<QuotaSnapshot, ScrapeError> {
        let response = self
            .client
            .get(self.endpoint("quota"))
            .query(&[("zone", self.config.zone.as_str())])
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| match self.map_transport_error(&e) {
                timeout @ ScrapeError::UpstreamTimeout(_) => timeout,
                other => ScrapeError::ExternalService(other.detail().to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ScrapeError::ExternalService(format!(
                "quota check returned {status}: {}",
                snippet(&text)
            )));
        }

        let quota: QuotaResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::ExternalService(format!("unreadable quota response: {e}")))?;

        Ok(QuotaSnapshot {
            remaining: quota.remaining,
            reset_at: quota.reset_at,
            observed_at: Utc::now(),
        })
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(BODY_SNIPPET_LEN).collect()
}

/// Maps a non-success upstream status to its failure kind.
fn classify_status(status: StatusCode, body: &str) -> Option<ScrapeError> {
    if status.is_success() {
        return None;
    }

    let detail = format!("{status}: {}", snippet(body));
    Some(match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::PAYMENT_REQUIRED => {
            ScrapeError::QuotaExceeded(detail)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ScrapeError::UpstreamTimeout(detail)
        }
        _ => ScrapeError::ExternalService(detail),
    })
}

/// Parses a successful scrape body: a bare array or `{"listings": [...]}`.
/// An `{"error": ...}` body is a service-side failure, not a parse failure.
pub fn parse_listings(body: &str) -> Result<Vec<RawListing>, ScrapeError> {
    let payload: ScrapePayload = serde_json::from_str(body).map_err(|e| {
        ScrapeError::Parse(format!("expected a listing array or object: {e}"))
    })?;

    match payload {
        ScrapePayload::Listings(listings) | ScrapePayload::Wrapped { listings } => Ok(listings),
        ScrapePayload::Error { error } if error.to_lowercase().contains("quota") => {
            Err(ScrapeError::QuotaExceeded(error))
        }
        ScrapePayload::Error { error } => Err(ScrapeError::ExternalService(error)),
    }
}

/// Accepts only http(s) URLs on an allowed host under `/marketplace`.
pub fn validate_listing_url(
    raw: &str,
    allowed_hosts: &[String],
) -> Result<ScrapeTarget, ScrapeError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ScrapeError::Validation(format!("'{raw}' is not a URL: {e}")))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ScrapeError::Validation(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    let host = url.host_str().unwrap_or_default().to_lowercase();
    if !allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(&host)) {
        return Err(ScrapeError::Validation(format!(
            "host '{host}' is not a supported marketplace"
        )));
    }

    let path = url.path();
    if path != "/marketplace" && !path.starts_with("/marketplace/") {
        return Err(ScrapeError::Validation(format!(
            "'{path}' is not a marketplace listing page"
        )));
    }

    Ok(ScrapeTarget { url })
}

/// Search page for `query` under `filters`, checked against the allowed hosts.
pub fn build_target(
    config: &ScraperConfig,
    query: &str,
    filters: &SearchFilters,
) -> Result<ScrapeTarget, ScrapeError> {
    let url = build_search_url(&config.marketplace_base_url, query, filters)?;
    validate_listing_url(url.as_str(), &config.allowed_hosts)
}

/// `{base}/{location}/[{category}|search]?query=..` plus price, radius and sort params.
pub fn build_search_url(
    base: &str,
    query: &str,
    filters: &SearchFilters,
) -> Result<Url, ScrapeError> {
    let mut url = Url::parse(base)
        .map_err(|e| ScrapeError::Validation(format!("bad marketplace base URL: {e}")))?;

    let slug = |s: &str| {
        s.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("-")
    };

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| ScrapeError::Validation("marketplace base URL cannot have a path".to_string()))?;
        segments.pop_if_empty();
        if let Some(location) = filters.location.as_deref().filter(|l| !l.trim().is_empty()) {
            segments.push(&slug(location));
        }
        match filters.category.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(category) => segments.push(&slug(category)),
            None => segments.push("search"),
        };
    }

    {
        let mut params = url.query_pairs_mut();
        params.append_pair("query", query.trim());
        if let Some(min) = filters.min_price {
            params.append_pair("minPrice", &format!("{min:.0}"));
        }
        if let Some(max) = filters.max_price {
            params.append_pair("maxPrice", &format!("{max:.0}"));
        }
        if let Some(radius) = filters.radius_km {
            params.append_pair("radius", &radius.to_string());
        }
        if let Some(sort) = filters.sort {
            params.append_pair("sortBy", sort.as_param());
        }
        params.append_pair("exact", "false");
    }

    Ok(url)
}
