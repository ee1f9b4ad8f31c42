//! Units of fetchable work and the keys used to decide whether a unit has
//! already been collected.

use crate::types::country::Country;
use std::fmt;

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use statcollect::LatLon;
///
/// let berlin_center = LatLon(52.5200, 13.4050);
/// assert_eq!(berlin_center.0, 52.5200); // Latitude
/// assert_eq!(berlin_center.1, 13.4050); // Longitude
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon(pub f64, pub f64);

/// The source-specific part of a work item's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkKey {
    /// A configured city (weather).
    City(String),
    /// One pollutant at one monitoring location (air quality).
    Pollutant { location_id: i64, parameter: String },
    /// One indicator for one year (economic).
    IndicatorYear { indicator_id: String, year: i32 },
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkKey::City(city) => write!(f, "{city}"),
            WorkKey::Pollutant {
                location_id,
                parameter,
            } => write!(f, "location {location_id} / {parameter}"),
            WorkKey::IndicatorYear { indicator_id, year } => write!(f, "{indicator_id} {year}"),
        }
    }
}

/// The key the collector checks before spending a request on a work item.
///
/// For air quality and economic data this is exactly the table's uniqueness
/// key. Weather rows are unique per `(country, city, timestamp)`, but the
/// timestamp is only known after fetching, so a city counts as collected once
/// any observation for it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgressKey {
    pub country_code: String,
    pub key: WorkKey,
}

impl ProgressKey {
    pub fn new(country_code: &str, key: WorkKey) -> Self {
        Self {
            country_code: country_code.to_string(),
            key,
        }
    }
}

/// Station metadata an air-quality work item carries from enumeration into the fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringSite {
    pub name: Option<String>,
    pub coordinates: Option<LatLon>,
    /// Sensor measuring this item's pollutant, used by the hourly fallback.
    pub sensor_id: Option<i64>,
    /// Upstream parameter id of this item's pollutant.
    pub parameter_id: i64,
    pub unit: Option<String>,
}

/// One (country, sub-key) pair representing a single unit of fetchable data.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub country: Country,
    pub key: WorkKey,
    pub site: Option<MonitoringSite>,
}

impl WorkItem {
    pub fn new(country: Country, key: WorkKey) -> Self {
        Self {
            country,
            key,
            site: None,
        }
    }

    pub fn with_site(mut self, site: MonitoringSite) -> Self {
        self.site = Some(site);
        self
    }

    pub fn progress_key(&self) -> ProgressKey {
        ProgressKey::new(&self.country.code, self.key.clone())
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key, self.country.code)
    }
}
