//! Placeholder observations for work items the upstream has no data for.
//!
//! Only used when a source's `allow_synthetic_fill` is on. Every value is
//! drawn uniformly from the configured range for the item's country (or the
//! source default) and the record is flagged `is_synthetic`.

use crate::config::{SyntheticConfig, SyntheticRange};
use crate::types::observation::air_quality::AirQualityObservation;
use crate::types::observation::economic::EconomicObservation;
use crate::types::observation::weather::WeatherObservation;
use crate::types::observation::Observation;
use crate::types::work_item::{WorkItem, WorkKey};
use chrono::Utc;
use rand::Rng;

fn draw<R: Rng + ?Sized>(range: SyntheticRange, rng: &mut R) -> Option<f64> {
    (range.min <= range.max).then(|| rng.gen_range(range.min..=range.max))
}

/// Builds a synthetic observation for `item`, or `None` when no range is
/// configured for the field it needs.
pub fn placeholder<R: Rng + ?Sized>(
    item: &WorkItem,
    ranges: &SyntheticConfig,
    rng: &mut R,
) -> Option<Observation> {
    let code = item.country.code.as_str();
    let mut field = |name: &str| ranges.range_for(code, name).and_then(|r| draw(r, &mut *rng));

    let observation = match &item.key {
        WorkKey::City(city) => Observation::Weather(WeatherObservation {
            country: item.country.clone(),
            city: city.clone(),
            coordinates: None,
            temperature: Some(round_to(field("temperature")?, 1)),
            humidity: field("humidity").map(|h| h.round() as i64),
            pressure: field("pressure").map(|p| p.round() as i64),
            timestamp: Utc::now().timestamp(),
            is_synthetic: true,
        }),
        WorkKey::Pollutant {
            location_id,
            parameter,
        } => {
            let site = item.site.as_ref();
            Observation::AirQuality(AirQualityObservation {
                country: item.country.clone(),
                location_id: *location_id,
                location_name: site.and_then(|s| s.name.clone()),
                coordinates: site.and_then(|s| s.coordinates),
                parameter: parameter.clone(),
                value: round_to(field(parameter.as_str())?, 2),
                unit: site.and_then(|s| s.unit.clone()),
                datetime_utc: Some(Utc::now().to_rfc3339()),
                is_synthetic: true,
            })
        }
        WorkKey::IndicatorYear { indicator_id, year } => {
            Observation::Economic(EconomicObservation {
                country: item.country.clone(),
                indicator_id: indicator_id.clone(),
                indicator_name: None,
                year: *year,
                value: round_to(field("value")?, 2),
                is_synthetic: true,
            })
        }
    };
    Some(observation)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AirQualityConfig, EconomicConfig, WeatherConfig};
    use crate::types::country::Country;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn thailand() -> Country {
        Country::new("TH", "THA", "Thailand")
    }

    #[test]
    fn weather_placeholder_stays_in_range() {
        let ranges = WeatherConfig::default().synthetic;
        let item = WorkItem::new(thailand(), WorkKey::City("Phuket".to_string()));
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let Some(Observation::Weather(obs)) = placeholder(&item, &ranges, &mut rng) else {
                panic!("expected weather placeholder");
            };
            assert!(obs.is_synthetic);
            assert_eq!(obs.city, "Phuket");
            assert!((-10.0..=35.0).contains(&obs.temperature.unwrap()));
            assert!((20..=95).contains(&obs.humidity.unwrap()));
            assert!((990..=1030).contains(&obs.pressure.unwrap()));
        }
    }

    #[test]
    fn country_override_wins() {
        let mut ranges = AirQualityConfig::default().synthetic;
        ranges.overrides.insert(
            "TH".to_string(),
            BTreeMap::from([("pm25".to_string(), SyntheticRange::new(100.0, 101.0))]),
        );
        let item = WorkItem::new(
            thailand(),
            WorkKey::Pollutant {
                location_id: 5,
                parameter: "pm25".to_string(),
            },
        );
        let mut rng = StdRng::seed_from_u64(1);

        let Some(Observation::AirQuality(obs)) = placeholder(&item, &ranges, &mut rng) else {
            panic!("expected air quality placeholder");
        };
        assert!((100.0..=101.0).contains(&obs.value));
        assert!(obs.is_synthetic);
    }

    #[test]
    fn missing_range_means_no_placeholder() {
        let ranges = EconomicConfig::default().synthetic;
        let item = WorkItem::new(
            thailand(),
            WorkKey::Pollutant {
                location_id: 5,
                parameter: "co".to_string(),
            },
        );
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(placeholder(&item, &ranges, &mut rng), None);
    }
}
