use crate::clients::scraper::ScraperClient;
use crate::config::Config;
use crate::services::QuotaGuard;
use std::sync::Arc;

pub async fn cmd_quota(config: &Config) -> anyhow::Result<()> {
    let client = Arc::new(ScraperClient::new(config.scraper.clone())?);
    let guard = QuotaGuard::new(client.clone());

    let proxy = client.proxy_details();
    println!(
        "Zone: {} (proxy {}:{})",
        proxy.zone, proxy.host, proxy.port
    );

    match guard.check_quota().await {
        Ok(snapshot) => {
            println!("Remaining calls: {}", snapshot.remaining);
            if let Some(reset) = snapshot.reset_at {
                println!("Resets at: {}", reset.to_rfc3339());
            }
            if !snapshot.has_capacity() {
                println!("✗ Quota exhausted; new searches will fail until reset");
            }
        }
        Err(e) => println!("✗ Quota check failed: {e}"),
    }

    Ok(())
}
