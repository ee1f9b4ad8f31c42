//! Defines the external data sources the collector knows about and the
//! persisted table each of them owns.

use std::fmt;

/// One of the three upstream services feeding the shared store.
///
/// Each source owns exactly one observation table and has its own notion of a
/// uniqueness key (see [`crate::ProgressKey`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    /// Current conditions per city from OpenWeather.
    Weather,
    /// Latest pollutant readings per monitoring location from OpenAQ.
    AirQuality,
    /// Yearly indicator values per country from the World Bank.
    Economic,
}

impl DataSource {
    pub const ALL: [DataSource; 3] = [
        DataSource::Weather,
        DataSource::AirQuality,
        DataSource::Economic,
    ];

    pub(crate) fn table_name(&self) -> &'static str {
        match self {
            DataSource::Weather => "weather_data",
            DataSource::AirQuality => "air_quality_data",
            DataSource::Economic => "economic_data",
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            DataSource::Weather => "weather",
            DataSource::AirQuality => "air-quality",
            DataSource::Economic => "economic",
        }
    }
}

/// Formats a `DataSource` using its command-line label.
///
/// # Examples
///
/// ```
/// use statcollect::DataSource;
///
/// assert_eq!(DataSource::AirQuality.to_string(), "air-quality");
/// assert_eq!(format!("{}", DataSource::Weather), "weather");
/// ```
impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
