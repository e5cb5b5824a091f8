//! Turns raw scraped listings into storable result rows.

use crate::clients::scraper::{RawListing, RawPrice};
use crate::services::job_store::NewResult;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const MAX_DESCRIPTION_CHARS: usize = 2000;

fn clean(value: Option<&str>) -> Option<String> {
    let decoded = html_escape::decode_html_entities(value?.trim()).trim().to_string();
    (!decoded.is_empty()).then_some(decoded)
}

/// Parses `"$1,200"`, `"1200.50"` or `"Free"` into an amount.
#[must_use]
pub fn parse_price(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("free") {
        return Some(0.0);
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d[\d,]*(?:\.\d+)?)").expect("Invalid regex"));

    let caps = re.captures(text)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

/// Currency implied by a price string's symbol or code.
#[must_use]
pub fn detect_currency(text: &str) -> Option<String> {
    let text = text.trim();
    let code = if text.contains('€') {
        "EUR"
    } else if text.contains('£') {
        "GBP"
    } else if text.contains('¥') {
        "JPY"
    } else if text.contains('$') {
        "USD"
    } else {
        return text
            .split_whitespace()
            .find(|w| w.len() == 3 && w.chars().all(|c| c.is_ascii_uppercase()))
            .map(str::to_string);
    };
    Some(code.to_string())
}

fn normalize_one(raw: &RawListing) -> Option<NewResult> {
    let title = clean(raw.title.as_deref())?;
    let listing_url = clean(raw.url.as_deref())?;

    let (price, implied_currency) = match &raw.price {
        Some(RawPrice::Amount(amount)) if amount.is_finite() && *amount >= 0.0 => {
            (Some(*amount), None)
        }
        Some(RawPrice::Text(text)) => (parse_price(text), detect_currency(text)),
        _ => (None, None),
    };

    let description = clean(raw.description.as_deref())
        .map(|d| d.chars().take(MAX_DESCRIPTION_CHARS).collect());

    Some(NewResult {
        title,
        price,
        currency: clean(raw.currency.as_deref()).or(implied_currency),
        image_url: clean(raw.image.as_deref()),
        description,
        location: clean(raw.location.as_deref()),
        seller_name: clean(raw.seller.as_deref()),
        listing_url,
    })
}

/// Normalizes listings in marketplace order.
///
/// Listings without a title or URL are skipped, later duplicates of a listing
/// URL are dropped and at most `max_results` rows are returned.
#[must_use]
pub fn normalize_listings(raw: &[RawListing], max_results: usize) -> Vec<NewResult> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(normalize_one)
        .filter(|r| seen.insert(r.listing_url.clone()))
        .take(max_results)
        .collect()
}
