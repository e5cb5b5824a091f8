use crate::clients::scraper::validate_listing_url;
use crate::config::Config;

pub fn cmd_preset(config: &Config, url: &str) -> anyhow::Result<()> {
    match validate_listing_url(url, &config.scraper.allowed_hosts) {
        Ok(target) => println!("✓ Supported marketplace URL: {}", target.as_str()),
        Err(e) => println!("✗ {e}"),
    }
    Ok(())
}
