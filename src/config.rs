use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable that overrides `scraper.api_token`.
pub const SCRAPER_TOKEN_ENV: &str = "MARKETWATCH_SCRAPER_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub scraper: ScraperConfig,

    pub cache: CacheConfig,

    pub quota: QuotaConfig,

    pub jobs: JobsConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    #[serde(default)]
    pub suppress_connection_errors: bool,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/marketwatch.db".to_string(),
            log_level: "info".to_string(),
            suppress_connection_errors: false,
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Key required on `/api/admin/*` routes. Admin routes are refused while empty.
    #[serde(skip_serializing)]
    pub admin_api_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 6790,
            cors_allowed_origins: vec![
                "http://localhost:6790".to_string(),
                "http://127.0.0.1:6790".to_string(),
            ],
            admin_api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Base URL of the scraping service API.
    pub api_url: String,

    #[serde(skip_serializing)]
    pub api_token: String,

    /// Service zone the scrape and quota calls are billed against.
    pub zone: String,

    pub proxy_host: String,

    pub proxy_port: u16,

    pub proxy_username: String,

    #[serde(skip_serializing)]
    pub proxy_password: String,

    /// Upper bound for one scrape or quota call.
    pub request_timeout_seconds: u64,

    /// Root of the marketplace listing pages search targets are built from.
    pub marketplace_base_url: String,

    /// Hosts accepted by preset validation.
    pub allowed_hosts: Vec<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.brightdata.com".to_string(),
            api_token: String::new(),
            zone: "marketplace_unlocker".to_string(),
            proxy_host: "brd.superproxy.io".to_string(),
            proxy_port: 33335,
            proxy_username: String::new(),
            proxy_password: String::new(),
            request_timeout_seconds: 60,
            marketplace_base_url: "https://www.facebook.com/marketplace".to_string(),
            allowed_hosts: vec![
                "www.facebook.com".to_string(),
                "facebook.com".to_string(),
                "m.facebook.com".to_string(),
            ],
        }
    }
}

impl ScraperConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,

    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            ttl_seconds: 15 * 60,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// When the quota check itself fails, proceed with the scrape (true) or
    /// fail the job with the check's error (false).
    pub fail_open: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { fail_open: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub max_results_per_job: usize,

    /// Pending jobs older than this are reported at startup.
    pub stale_pending_minutes: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_results_per_job: 200,
            stale_pending_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            scraper: ScraperConfig::default(),
            cache: CacheConfig::default(),
            quota: QuotaConfig::default(),
            jobs: JobsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(SCRAPER_TOKEN_ENV)
            && !token.is_empty()
        {
            self.scraper.api_token = token;
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("marketwatch").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".marketwatch").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scraper.api_url.is_empty() {
            anyhow::bail!("scraper.api_url cannot be empty");
        }

        url::Url::parse(&self.scraper.marketplace_base_url)
            .context("scraper.marketplace_base_url is not a valid URL")?;

        if self.scraper.request_timeout_seconds == 0 {
            anyhow::bail!("scraper.request_timeout_seconds must be > 0");
        }

        if self.cache.max_entries == 0 {
            anyhow::bail!("cache.max_entries must be > 0");
        }

        if self.jobs.max_results_per_job == 0 {
            anyhow::bail!("jobs.max_results_per_job must be > 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.max_entries, 500);
        assert_eq!(config.cache.ttl(), Duration::from_secs(900));
        assert!(config.quota.fail_open);
        assert_eq!(config.scraper.request_timeout(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_hides_secrets() {
        let mut config = Config::default();
        config.scraper.api_token = "secret-token".to_string();
        config.scraper.proxy_password = "hunter2".to_string();
        config.server.admin_api_key = "admin-key".to_string();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[scraper]"));
        assert!(toml_str.contains("[cache]"));
        assert!(!toml_str.contains("secret-token"));
        assert!(!toml_str.contains("hunter2"));
        assert!(!toml_str.contains("admin-key"));
        assert!(!toml_str.contains("api_token"));

        let reloaded: Config = toml::from_str(&toml_str).unwrap();
        assert!(reloaded.scraper.api_token.is_empty());
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [cache]
            max_entries = 10

            [quota]
            fail_open = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.cache.max_entries, 10);
        assert_eq!(config.cache.ttl_seconds, 900);
        assert!(!config.quota.fail_open);
        assert_eq!(config.scraper.zone, "marketplace_unlocker");
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        let mut config = Config::default();
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scraper.request_timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scraper.marketplace_base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
