//! Read-only view of the scraping service's remaining call budget.
//!
//! The service is the only source of truth. The guard never counts calls
//! locally; it only remembers the last snapshot it saw for diagnostics.

use crate::clients::scraper::{QuotaProvider, QuotaSnapshot, ScrapeError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub struct QuotaGuard {
    provider: Arc<dyn QuotaProvider>,
    last: RwLock<Option<QuotaSnapshot>>,
}

impl QuotaGuard {
    #[must_use]
    pub fn new(provider: Arc<dyn QuotaProvider>) -> Self {
        Self {
            provider,
            last: RwLock::new(None),
        }
    }

    /// Asks the service for the current budget.
    ///
    /// # Errors
    ///
    /// Returns `ExternalService` when the quota endpoint fails or
    /// `UpstreamTimeout` when it does not answer in time. Capacity is unknown
    /// in both cases.
    pub async fn check_quota(&self) -> Result<QuotaSnapshot, ScrapeError> {
        match self.provider.fetch_quota().await {
            Ok(snapshot) => {
                debug!(
                    remaining = snapshot.remaining,
                    reset_at = ?snapshot.reset_at,
                    "Quota checked"
                );
                *self.last.write().await = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Quota check failed");
                Err(e)
            }
        }
    }

    /// `false` once the service reports no remaining calls.
    pub async fn has_capacity(&self) -> Result<bool, ScrapeError> {
        Ok(self.check_quota().await?.has_capacity())
    }

    /// The most recent successful snapshot, if any. Advisory only.
    pub async fn last_snapshot(&self) -> Option<QuotaSnapshot> {
        self.last.read().await.clone()
    }
}
