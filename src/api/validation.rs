use super::ApiError;
use crate::domain::{SearchFilters, SortBy};

pub const MAX_QUERY_CHARS: usize = 200;
pub const MAX_RADIUS_KM: u32 = 500;
pub const DEFAULT_PAGE_LIMIT: u64 = 20;

pub fn validate_id(id: i32, what: &str) -> Result<i32, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid {what} ID: {id}. ID must be a positive integer"
        )));
    }
    Ok(id)
}

pub fn validate_search_query(query: &str) -> Result<&str, ApiError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Search query cannot be empty"));
    }
    if trimmed.chars().count() > MAX_QUERY_CHARS {
        return Err(ApiError::validation(format!(
            "Search query must be {MAX_QUERY_CHARS} characters or less"
        )));
    }
    Ok(trimmed)
}

pub fn validate_filters(filters: &SearchFilters) -> Result<(), ApiError> {
    for (name, price) in [("min_price", filters.min_price), ("max_price", filters.max_price)] {
        if let Some(p) = price
            && (!p.is_finite() || p < 0.0)
        {
            return Err(ApiError::validation(format!(
                "{name} must be a non-negative number"
            )));
        }
    }

    if let (Some(min), Some(max)) = (filters.min_price, filters.max_price)
        && min > max
    {
        return Err(ApiError::validation(
            "min_price cannot be greater than max_price",
        ));
    }

    if let Some(radius) = filters.radius_km
        && !(1..=MAX_RADIUS_KM).contains(&radius)
    {
        return Err(ApiError::validation(format!(
            "radius_km must be between 1 and {MAX_RADIUS_KM}"
        )));
    }

    Ok(())
}

pub fn validate_limit(limit: u64) -> Result<u64, ApiError> {
    const MAX_LIMIT: u64 = 100;
    const MIN_LIMIT: u64 = 1;

    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::validation(format!(
            "Invalid limit: {limit}. Limit must be between {MIN_LIMIT} and {MAX_LIMIT}"
        )));
    }
    Ok(limit)
}

/// Offsets are bound as signed 64-bit integers by the database driver.
pub fn validate_offset(offset: u64) -> Result<u64, ApiError> {
    if i64::try_from(offset).is_err() {
        return Err(ApiError::validation(format!(
            "Invalid offset: {offset}. Offset must be at most {}",
            i64::MAX
        )));
    }
    Ok(offset)
}

pub fn parse_sort_by(raw: Option<&str>) -> Result<SortBy, ApiError> {
    raw.map_or(Ok(SortBy::default()), |s| {
        s.parse::<SortBy>().map_err(|e| ApiError::validation(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_offset() {
        assert_eq!(validate_offset(0).unwrap(), 0);
        assert!(validate_offset(i64::MAX as u64).is_ok());
        assert!(validate_offset(i64::MAX as u64 + 1).is_err());
        assert!(validate_offset(u64::MAX).is_err());
    }

    #[test]
    fn test_validate_search_query() {
        assert_eq!(validate_search_query("  road bike ").unwrap(), "road bike");
        assert!(validate_search_query("").is_err());
        assert!(validate_search_query("   ").is_err());
        assert!(validate_search_query(&"x".repeat(200)).is_ok());
        assert!(validate_search_query(&"x".repeat(201)).is_err());
    }

    #[test]
    fn test_validate_filters() {
        assert!(validate_filters(&SearchFilters::default()).is_ok());

        let ordered = SearchFilters {
            min_price: Some(10.0),
            max_price: Some(10.0),
            radius_km: Some(500),
            ..Default::default()
        };
        assert!(validate_filters(&ordered).is_ok());

        let inverted = SearchFilters {
            min_price: Some(50.0),
            max_price: Some(10.0),
            ..Default::default()
        };
        assert!(validate_filters(&inverted).is_err());

        let negative = SearchFilters {
            min_price: Some(-1.0),
            ..Default::default()
        };
        assert!(validate_filters(&negative).is_err());

        let too_far = SearchFilters {
            radius_km: Some(0),
            ..Default::default()
        };
        assert!(validate_filters(&too_far).is_err());
    }

    #[test]
    fn test_validate_limit() {
        assert!(validate_limit(1).is_ok());
        assert!(validate_limit(100).is_ok());
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(101).is_err());
    }

    #[test]
    fn test_parse_sort_by() {
        assert_eq!(parse_sort_by(None).unwrap(), SortBy::Relevance);
        assert_eq!(parse_sort_by(Some("price_desc")).unwrap(), SortBy::PriceDesc);
        assert!(parse_sort_by(Some("cheapest")).is_err());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id(1, "job").is_ok());
        assert!(validate_id(0, "job").is_err());
        assert!(validate_id(-3, "search").is_err());
    }
}
