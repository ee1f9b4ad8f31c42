use crate::types::country::Country;
use crate::types::work_item::LatLon;

/// The most recent reading of one pollutant at one monitoring location.
#[derive(Debug, PartialEq, Clone)]
pub struct AirQualityObservation {
    pub country: Country,
    pub location_id: i64,
    pub location_name: Option<String>,
    pub coordinates: Option<LatLon>,
    /// Pollutant name, e.g. `pm25`.
    pub parameter: String,
    pub value: f64,
    /// Unit as reported upstream, e.g. `µg/m³`.
    pub unit: Option<String>,
    /// ISO 8601 UTC timestamp of the reading, when known.
    pub datetime_utc: Option<String>,
    pub is_synthetic: bool,
}
