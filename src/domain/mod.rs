//! Domain types for marketplace searches with strong typing.
//!
//! Ids follow the Newtype pattern so a job id can never be passed where a
//! search id is expected. Status, sort and error-kind enums replace the
//! free-form strings that end up in the database.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            #[must_use]
            pub const fn new(id: i32) -> Self {
                debug_assert!(id >= 0, concat!(stringify!($name), " should be non-negative"));
                Self(id)
            }

            #[must_use]
            pub const fn value(&self) -> i32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self::new(id)
            }
        }
    };
}

record_id!(
    /// Identifier of a registered marketplace search.
    SearchId
);
record_id!(
    /// Identifier of one execution attempt of a search.
    ///
    /// ```rust
    /// use marketwatch::domain::JobId;
    ///
    /// let id = JobId::new(7);
    /// assert_eq!(id.value(), 7);
    /// assert_eq!(id.to_string(), "7");
    /// ```
    JobId
);
record_id!(
    /// Identifier of a stored listing match.
    ResultId
);

/// Lifecycle status shared by searches and search jobs.
///
/// Transitions are monotonic: `Pending -> Processing -> Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal step of the state machine.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    /// States a row must currently be in for `next` to be written.
    #[must_use]
    pub fn predecessors(next: Self) -> Vec<Self> {
        [Self::Pending, Self::Processing, Self::Completed, Self::Failed]
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// Ordering of a result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Order in which the marketplace returned the listings.
    #[default]
    Relevance,
    PriceAsc,
    PriceDesc,
    /// Newest first.
    Date,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(Self::Relevance),
            "price_asc" => Ok(Self::PriceAsc),
            "price_desc" => Ok(Self::PriceDesc),
            "date" => Ok(Self::Date),
            other => Err(format!(
                "unknown sort '{other}', expected relevance, price_asc, price_desc or date"
            )),
        }
    }
}

/// Failure taxonomy surfaced through job polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    QuotaExceeded,
    UpstreamTimeout,
    ParseError,
    ExternalServiceError,
    NotFound,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            Self::ParseError => "PARSE_ERROR",
            Self::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALIDATION_ERROR" => Ok(Self::ValidationError),
            "QUOTA_EXCEEDED" => Ok(Self::QuotaExceeded),
            "UPSTREAM_TIMEOUT" => Ok(Self::UpstreamTimeout),
            "PARSE_ERROR" => Ok(Self::ParseError),
            "EXTERNAL_SERVICE_ERROR" => Ok(Self::ExternalServiceError),
            "NOT_FOUND" => Ok(Self::NotFound),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(format!("unknown error kind '{other}'")),
        }
    }
}

/// Error recorded on a failed job: `KIND: message` in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobErrorInfo {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Parses the stored `KIND: message` form. Unknown prefixes map to `Unknown`
    /// with the whole string kept as the message.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        if let Some((kind, message)) = raw.split_once(": ")
            && let Ok(kind) = kind.parse::<ErrorKind>()
        {
            return Self::new(kind, message);
        }
        Self::new(ErrorKind::Unknown, raw)
    }

    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

/// Sort order requested from the marketplace itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketplaceSort {
    BestMatch,
    PriceAscend,
    PriceDescend,
    CreationTimeDescend,
    DistanceAscend,
}

impl MarketplaceSort {
    #[must_use]
    pub const fn as_param(&self) -> &'static str {
        match self {
            Self::BestMatch => "best_match",
            Self::PriceAscend => "price_ascend",
            Self::PriceDescend => "price_descend",
            Self::CreationTimeDescend => "creation_time_descend",
            Self::DistanceAscend => "distance_ascend",
        }
    }
}

/// Optional narrowing applied to a search query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub category: Option<String>,
    pub radius_km: Option<u32>,
    pub sort: Option<MarketplaceSort>,
}

/// Collapses whitespace and lowercases, so `"  Road  Bike"` and `"road bike"`
/// share a cache entry.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

impl SearchFilters {
    /// Builds the cache key for a query under these filters.
    #[must_use]
    pub fn cache_key(&self, query: &str) -> String {
        let opt = |v: Option<&str>| v.map(normalize_query).unwrap_or_default();
        let price = |v: Option<f64>| v.map(|p| format!("{p:.2}")).unwrap_or_default();
        format!(
            "q={}|loc={}|min={}|max={}|cat={}|r={}|sort={}",
            normalize_query(query),
            opt(self.location.as_deref()),
            price(self.min_price),
            price(self.max_price),
            opt(self.category.as_deref()),
            self.radius_km.map(|r| r.to_string()).unwrap_or_default(),
            self.sort.map(|s| s.as_param()).unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_conversions() {
        let id = SearchId::new(42);
        assert_eq!(id.value(), 42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(i32::from(id), 42);
        assert_eq!(SearchId::from(42), id);
        assert_eq!(serde_json::to_string(&JobId::new(3)).unwrap(), "3");
    }

    #[test]
    fn status_transitions_are_monotonic() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Processing));
        assert_eq!(JobStatus::predecessors(Failed), vec![Processing]);
        assert_eq!(JobStatus::predecessors(Processing), vec![Pending]);
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in ["pending", "processing", "completed", "failed"] {
            assert_eq!(s.parse::<JobStatus>().unwrap().as_str(), s);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn job_error_encoding() {
        let info = JobErrorInfo::new(ErrorKind::ParseError, "missing listings: array");
        assert_eq!(info.encode(), "PARSE_ERROR: missing listings: array");
        assert_eq!(JobErrorInfo::decode(&info.encode()), info);

        let legacy = JobErrorInfo::decode("something broke");
        assert_eq!(legacy.kind, ErrorKind::Unknown);
        assert_eq!(legacy.message, "something broke");
    }

    #[test]
    fn cache_key_ignores_case_and_spacing() {
        let filters = SearchFilters {
            location: Some("Austin ".to_string()),
            max_price: Some(500.0),
            ..Default::default()
        };
        assert_eq!(
            filters.cache_key("  Road   BIKE "),
            filters.cache_key("road bike")
        );
        assert_eq!(
            filters.cache_key("road bike"),
            "q=road bike|loc=austin|min=|max=500.00|cat=|r=|sort="
        );
    }

    #[test]
    fn cache_key_separates_filters() {
        let a = SearchFilters::default();
        let b = SearchFilters {
            radius_km: Some(10),
            ..Default::default()
        };
        assert_ne!(a.cache_key("sofa"), b.cache_key("sofa"));
    }

    #[test]
    fn sort_by_parsing() {
        assert_eq!("price_desc".parse::<SortBy>().unwrap(), SortBy::PriceDesc);
        assert!("cheapest".parse::<SortBy>().is_err());
    }
}
