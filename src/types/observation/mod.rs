//! Normalized records produced by the source adapters and consumed by the
//! persistence writer.

pub mod air_quality;
pub mod economic;
pub mod weather;

use crate::types::country::Country;
use crate::types::source::DataSource;
use crate::types::work_item::{ProgressKey, WorkKey};
use air_quality::AirQualityObservation;
use economic::EconomicObservation;
use weather::WeatherObservation;

/// A single measurement from a single source, ready to be stored.
#[derive(Debug, PartialEq, Clone)]
pub enum Observation {
    Weather(WeatherObservation),
    AirQuality(AirQualityObservation),
    Economic(EconomicObservation),
}

impl Observation {
    pub fn source(&self) -> DataSource {
        match self {
            Observation::Weather(_) => DataSource::Weather,
            Observation::AirQuality(_) => DataSource::AirQuality,
            Observation::Economic(_) => DataSource::Economic,
        }
    }

    pub fn country(&self) -> &Country {
        match self {
            Observation::Weather(o) => &o.country,
            Observation::AirQuality(o) => &o.country,
            Observation::Economic(o) => &o.country,
        }
    }

    /// Whether the record was fabricated by the synthetic fill instead of fetched.
    pub fn is_synthetic(&self) -> bool {
        match self {
            Observation::Weather(o) => o.is_synthetic,
            Observation::AirQuality(o) => o.is_synthetic,
            Observation::Economic(o) => o.is_synthetic,
        }
    }

    pub fn progress_key(&self) -> ProgressKey {
        let key = match self {
            Observation::Weather(o) => WorkKey::City(o.city.clone()),
            Observation::AirQuality(o) => WorkKey::Pollutant {
                location_id: o.location_id,
                parameter: o.parameter.clone(),
            },
            Observation::Economic(o) => WorkKey::IndicatorYear {
                indicator_id: o.indicator_id.clone(),
                year: o.year,
            },
        };
        ProgressKey::new(&self.country().code, key)
    }

    /// Short human-readable rendering of the payload for progress lines.
    pub fn describe(&self) -> String {
        match self {
            Observation::Weather(o) => format!(
                "{}°C, {}% humidity",
                fmt_opt(o.temperature),
                o.humidity.map_or("n/a".to_string(), |h| h.to_string())
            ),
            Observation::AirQuality(o) => format!(
                "{} = {} {}",
                o.parameter,
                o.value,
                o.unit.as_deref().unwrap_or("")
            )
            .trim_end()
            .to_string(),
            Observation::Economic(o) => format!("{} {} = {:.2}", o.indicator_id, o.year, o.value),
        }
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or("n/a".to_string(), |v| format!("{v:.1}"))
}
