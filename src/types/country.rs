//! The country dimension shared by every observation table.

use serde::Deserialize;

/// A country as referenced by the upstream sources.
///
/// OpenWeather and OpenAQ identify countries by ISO 3166-1 alpha-2 code, the
/// World Bank by alpha-3, so both are kept alongside the display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Country {
    /// ISO alpha-2 code (e.g. "US"). Primary identifier in the store.
    pub code: String,
    /// ISO alpha-3 code (e.g. "USA").
    pub code3: String,
    /// Display name (e.g. "United States").
    pub name: String,
}

impl Country {
    pub fn new(code: &str, code3: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            code3: code3.to_string(),
            name: name.to_string(),
        }
    }
}

/// The ten countries every source collects for unless configured otherwise.
pub fn default_countries() -> Vec<Country> {
    [
        ("US", "USA", "United States"),
        ("IN", "IND", "India"),
        ("CN", "CHN", "China"),
        ("GB", "GBR", "United Kingdom"),
        ("BR", "BRA", "Brazil"),
        ("AU", "AUS", "Australia"),
        ("DE", "DEU", "Germany"),
        ("TH", "THA", "Thailand"),
        ("JP", "JPN", "Japan"),
        ("KR", "KOR", "South Korea"),
    ]
    .iter()
    .map(|(code, code3, name)| Country::new(code, code3, name))
    .collect()
}
