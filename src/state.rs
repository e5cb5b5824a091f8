use std::sync::Arc;

use crate::cache::Cache;
use crate::clients::scraper::{ListingScraper, QuotaProvider, ScraperClient};
use crate::config::Config;
use crate::db::Store;
use crate::services::{
    Dispatcher, JobStore, ListingCache, ProcessorSettings, QuotaGuard, SearchProcessor,
};

/// Build a shared HTTP client for scrape and quota calls.
fn build_shared_http_client(timeout: std::time::Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("Marketwatch/1.0")
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub jobs: Arc<dyn JobStore>,

    /// Preset validation and proxy diagnostics.
    pub scraper: Arc<ScraperClient>,

    pub quota: Arc<QuotaGuard>,

    pub cache: Arc<ListingCache>,

    pub processor: Arc<SearchProcessor>,

    pub dispatcher: Dispatcher,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let http_client = build_shared_http_client(config.scraper.request_timeout())?;
        let scraper = Arc::new(ScraperClient::with_shared_client(
            http_client,
            config.scraper.clone(),
        ));

        Ok(Self::with_components(
            config,
            store,
            scraper.clone(),
            scraper.clone(),
            scraper,
        ))
    }

    /// Wires the pipeline around the given scrape and quota backends.
    #[must_use]
    pub fn with_components(
        config: Config,
        store: Store,
        listings: Arc<dyn ListingScraper>,
        quota_provider: Arc<dyn QuotaProvider>,
        scraper: Arc<ScraperClient>,
    ) -> Self {
        let jobs: Arc<dyn JobStore> = Arc::new(store.clone());
        let quota = Arc::new(QuotaGuard::new(quota_provider));
        let cache: Arc<ListingCache> =
            Arc::new(Cache::new(config.cache.max_entries, config.cache.ttl()));

        let processor = Arc::new(SearchProcessor::new(
            jobs.clone(),
            quota.clone(),
            listings,
            cache.clone(),
            ProcessorSettings::from(&config),
        ));
        let dispatcher = Dispatcher::new(processor.clone());

        Self {
            config: Arc::new(config),
            store,
            jobs,
            scraper,
            quota,
            cache,
            processor,
            dispatcher,
        }
    }

    /// Builds the state for tests and embedders: real store, supplied backends.
    pub async fn with_backends(
        config: Config,
        listings: Arc<dyn ListingScraper>,
        quota_provider: Arc<dyn QuotaProvider>,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;
        let scraper = Arc::new(ScraperClient::new(config.scraper.clone())?);
        Ok(Self::with_components(
            config,
            store,
            listings,
            quota_provider,
            scraper,
        ))
    }
}
