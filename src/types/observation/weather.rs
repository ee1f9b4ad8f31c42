use crate::types::country::Country;
use crate::types::work_item::LatLon;

/// Current conditions for one city at one observation time.
#[derive(Debug, PartialEq, Clone)]
pub struct WeatherObservation {
    pub country: Country,
    /// City name as configured, so later runs recognise it as collected.
    pub city: String,
    pub coordinates: Option<LatLon>,
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// Relative humidity in percent.
    pub humidity: Option<i64>,
    /// Sea-level pressure in hPa.
    pub pressure: Option<i64>,
    /// Unix seconds of the upstream measurement.
    pub timestamp: i64,
    pub is_synthetic: bool,
}
