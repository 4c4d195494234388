//! Statistics value objects and the store key scheme.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Prefix shared by every per-page counter key.
pub const PAGE_KEY_PREFIX: &str = "statistics:";

/// Prefix shared by every per-country top record key.
pub const TOP_KEY_PREFIX: &str = "top_statistics:";

// =============================================================================
// Identifiers
// =============================================================================

/// Country code, always stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryCode(String);

impl CountryCode {
    /// Uppercase a raw code. Does not check it against the registry.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page identifier (`[A-Za-z0-9_-]+` once validated).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Records
// =============================================================================

/// Stored statistics triple.
///
/// The same shape backs both record families: under a page key it is the
/// running total for that page, under a top key it is the most viewed page
/// known for the country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsRecord {
    pub country: CountryCode,
    #[serde(rename = "mostPopularPage")]
    pub page: PageId,
    pub views: u64,
}

/// Cumulative view counter for one (country, page) pair.
pub type PageRecord = StatisticsRecord;

/// Highest-view page currently known for a country.
pub type TopRecord = StatisticsRecord;

impl StatisticsRecord {
    pub fn new(country: CountryCode, page: PageId, views: u64) -> Self {
        Self {
            country,
            page,
            views,
        }
    }
}

// =============================================================================
// Keys
// =============================================================================

/// Key of a record in the remote store and the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatisticsKey {
    /// `statistics:{COUNTRY}:page:{page}`
    Page { country: CountryCode, page: PageId },
    /// `top_statistics:{COUNTRY}`
    Top { country: CountryCode },
}

impl StatisticsKey {
    pub fn page(country: &CountryCode, page: &PageId) -> Self {
        StatisticsKey::Page {
            country: country.clone(),
            page: page.clone(),
        }
    }

    pub fn top(country: &CountryCode) -> Self {
        StatisticsKey::Top {
            country: country.clone(),
        }
    }
}

impl std::fmt::Display for StatisticsKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatisticsKey::Page { country, page } => {
                write!(f, "{}{}:page:{}", PAGE_KEY_PREFIX, country, page)
            }
            StatisticsKey::Top { country } => write!(f, "{}{}", TOP_KEY_PREFIX, country),
        }
    }
}

// =============================================================================
// Transport-facing shapes
// =============================================================================

/// Body of an UpdateStatistics request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageViewUpdate {
    pub page_name: String,
    pub views_to_add: i64,
}

impl PageViewUpdate {
    pub fn new(page_name: impl Into<String>, views_to_add: i64) -> Self {
        Self {
            page_name: page_name.into(),
            views_to_add,
        }
    }
}

/// Per-country entry of the GetTopStatistics response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryStatistics {
    pub views: u64,
    pub most_popular_page: String,
}

/// Country code to top entry.
pub type TopStatistics = BTreeMap<String, CountryStatistics>;

impl From<&TopRecord> for CountryStatistics {
    fn from(record: &TopRecord) -> Self {
        Self {
            views: record.views,
            most_popular_page: record.page.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_code_is_uppercased() {
        assert_eq!(CountryCode::new("us").as_str(), "US");
        assert_eq!(CountryCode::new("Cy").as_str(), "CY");
        assert_eq!(CountryCode::new(" us").as_str(), " US");
    }

    #[test]
    fn test_key_format() {
        let us = CountryCode::new("us");
        let home = PageId::new("home");

        assert_eq!(
            StatisticsKey::page(&us, &home).to_string(),
            "statistics:US:page:home"
        );
        assert_eq!(StatisticsKey::top(&us).to_string(), "top_statistics:US");
        assert!(StatisticsKey::top(&us)
            .to_string()
            .starts_with(TOP_KEY_PREFIX));
    }

    #[test]
    fn test_page_keys_never_match_top_prefix() {
        let key = StatisticsKey::page(&CountryCode::new("US"), &PageId::new("top_statistics"));
        assert!(!key.to_string().starts_with(TOP_KEY_PREFIX));
    }

    #[test]
    fn test_record_wire_format() {
        let record = StatisticsRecord::new(CountryCode::new("US"), PageId::new("home"), 10);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"country": "US", "mostPopularPage": "home", "views": 10})
        );

        let back: StatisticsRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_update_request_parses_camel_case() {
        let update: PageViewUpdate =
            serde_json::from_str(r#"{"pageName":"about","viewsToAdd":5}"#).unwrap();
        assert_eq!(update, PageViewUpdate::new("about", 5));
    }

    #[test]
    fn test_country_statistics_from_top_record() {
        let top = StatisticsRecord::new(CountryCode::new("US"), PageId::new("about"), 25);
        let stats = CountryStatistics::from(&top);

        assert_eq!(stats.views, 25);
        assert_eq!(stats.most_popular_page, "about");
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            serde_json::json!({"views": 25, "mostPopularPage": "about"})
        );
    }
}
