//! Latest pollutant readings per monitoring location from OpenAQ v3.
//!
//! Locations are ranked by how many of the configured pollutants they
//! measure, so a run with a small budget spends it on the best-covered
//! stations first.

use crate::api::client::{ApiClient, ApiKey};
use crate::api::error::ApiError;
use crate::config::{AirQualityConfig, HttpConfig, PollutantEntry};
use crate::sources::error::SourceError;
use crate::sources::{build_client, parse, SourceAdapter};
use crate::types::country::Country;
use crate::types::observation::air_quality::AirQualityObservation;
use crate::types::observation::Observation;
use crate::types::source::DataSource;
use crate::types::work_item::{LatLon, MonitoringSite, WorkItem, WorkKey};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Location {
    id: i64,
    name: Option<String>,
    coordinates: Option<Coordinates>,
    #[serde(default)]
    sensors: Vec<Sensor>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Coordinates {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl Coordinates {
    fn lat_lon(&self) -> Option<LatLon> {
        Some(LatLon(self.latitude?, self.longitude?))
    }
}

#[derive(Debug, Deserialize)]
struct Sensor {
    id: i64,
    parameter: Parameter,
}

#[derive(Debug, Clone, Deserialize)]
struct Parameter {
    id: i64,
    units: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct UtcTime {
    utc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestReading {
    value: Option<f64>,
    datetime: Option<UtcTime>,
    sensors_id: Option<i64>,
    parameter: Option<Parameter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Period {
    datetime_to: Option<UtcTime>,
}

#[derive(Debug, Clone, Deserialize)]
struct HourlyReading {
    value: Option<f64>,
    datetime: Option<UtcTime>,
    period: Option<Period>,
}

impl HourlyReading {
    fn datetime_utc(&self) -> Option<String> {
        self.datetime
            .as_ref()
            .and_then(|d| d.utc.clone())
            .or_else(|| {
                self.period
                    .as_ref()
                    .and_then(|p| p.datetime_to.as_ref())
                    .and_then(|d| d.utc.clone())
            })
    }
}

pub struct AirQualityAdapter {
    client: ApiClient,
    pollutants: Vec<PollutantEntry>,
    page_size: u32,
    /// Location id -> latest readings, `None` when the latest endpoint failed.
    latest_cache: Mutex<HashMap<i64, Option<Vec<LatestReading>>>>,
}

impl AirQualityAdapter {
    pub fn new(client: ApiClient, pollutants: Vec<PollutantEntry>, page_size: u32) -> Self {
        Self {
            client,
            pollutants,
            page_size,
            latest_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &AirQualityConfig, http: &HttpConfig) -> Result<Self, ApiError> {
        if config.api_key.is_none() {
            warn!("No OpenAQ API key configured; requests will likely be rejected");
        }
        let api_key = config.api_key.clone().map(|value| ApiKey::Header {
            name: "X-API-Key".to_string(),
            value,
        });
        let client = build_client(
            "openaq",
            &config.base_url,
            api_key,
            config.min_request_delay_ms,
            http,
        )?;
        Ok(Self::new(
            client,
            config.pollutants.clone(),
            config.locations_page_size,
        ))
    }

    fn pollutant_by_id(&self, id: i64) -> Option<&PollutantEntry> {
        self.pollutants.iter().find(|p| p.id == id)
    }

    /// Number of distinct configured pollutants the location has a sensor for.
    fn score(&self, location: &Location) -> usize {
        location
            .sensors
            .iter()
            .filter(|s| self.pollutant_by_id(s.parameter.id).is_some())
            .map(|s| s.parameter.id)
            .collect::<HashSet<_>>()
            .len()
    }

    async fn latest_readings(&self, location_id: i64) -> Option<Vec<LatestReading>> {
        if let Some(cached) = self.latest_cache.lock().await.get(&location_id) {
            return cached.clone();
        }

        let path = format!("locations/{location_id}/latest");
        let readings = match self.client.request(&path, &[]).await {
            Ok(body) => match parse::<Page<LatestReading>>(body, self.client.url_for(&path)) {
                Ok(page) => Some(page.results),
                Err(e) => {
                    warn!("Ignoring latest readings of location {location_id}: {e}");
                    None
                }
            },
            Err(e) => {
                warn!("Latest readings of location {location_id} unavailable: {e}");
                None
            }
        };

        self.latest_cache
            .lock()
            .await
            .insert(location_id, readings.clone());
        readings
    }

    async fn latest_hour(&self, sensor_id: i64) -> Result<Option<HourlyReading>, SourceError> {
        let path = format!("sensors/{sensor_id}/hours");
        let query = [("limit", "1".to_string()), ("sort", "desc".to_string())];
        let body = self.client.request(&path, &query).await?;
        let page: Page<HourlyReading> = parse(body, self.client.url_for(&path))?;
        Ok(page.results.into_iter().find(|r| r.value.is_some()))
    }
}

impl SourceAdapter for AirQualityAdapter {
    fn source(&self) -> DataSource {
        DataSource::AirQuality
    }

    async fn list_work_items(
        &self,
        country: &Country,
        limit: usize,
    ) -> Result<Vec<WorkItem>, SourceError> {
        let query = [
            ("iso", country.code.clone()),
            ("limit", self.page_size.to_string()),
            ("page", "1".to_string()),
        ];
        let body = self.client.request("locations", &query).await?;
        let page: Page<Location> = parse(body, self.client.url_for("locations"))?;

        let mut scored: Vec<(usize, Location)> = page
            .results
            .into_iter()
            .map(|location| (self.score(&location), location))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Stable, so equally scored locations keep upstream order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        debug!(
            "{} ({}) has {} locations measuring configured pollutants",
            country.name,
            country.code,
            scored.len()
        );

        let mut items = Vec::new();
        for (_, location) in &scored {
            for pollutant in &self.pollutants {
                let Some(sensor) = location
                    .sensors
                    .iter()
                    .find(|s| s.parameter.id == pollutant.id)
                else {
                    continue;
                };
                let site = MonitoringSite {
                    name: location.name.clone(),
                    coordinates: location.coordinates.and_then(|c| c.lat_lon()),
                    sensor_id: Some(sensor.id),
                    parameter_id: pollutant.id,
                    unit: sensor.parameter.units.clone(),
                };
                let key = WorkKey::Pollutant {
                    location_id: location.id,
                    parameter: pollutant.name.clone(),
                };
                items.push(WorkItem::new(country.clone(), key).with_site(site));
                if items.len() >= limit {
                    return Ok(items);
                }
            }
        }
        Ok(items)
    }

    async fn fetch_observation(&self, item: &WorkItem) -> Result<Option<Observation>, SourceError> {
        let WorkKey::Pollutant {
            location_id,
            parameter,
        } = &item.key
        else {
            return Err(SourceError::ForeignWorkItem(item.to_string(), "air quality"));
        };
        let site = match &item.site {
            Some(site) => site.clone(),
            None => {
                let Some(pollutant) = self.pollutants.iter().find(|p| &p.name == parameter) else {
                    return Ok(None);
                };
                MonitoringSite {
                    name: None,
                    coordinates: None,
                    sensor_id: None,
                    parameter_id: pollutant.id,
                    unit: None,
                }
            }
        };

        let make = |value: f64, datetime_utc: Option<String>| {
            Observation::AirQuality(AirQualityObservation {
                country: item.country.clone(),
                location_id: *location_id,
                location_name: site.name.clone(),
                coordinates: site.coordinates,
                parameter: parameter.clone(),
                value,
                unit: site.unit.clone(),
                datetime_utc,
                is_synthetic: false,
            })
        };

        if let Some(readings) = self.latest_readings(*location_id).await {
            let matching = readings
                .iter()
                .filter(|r| {
                    r.parameter.as_ref().map(|p| p.id) == Some(site.parameter_id)
                        || (site.sensor_id.is_some() && r.sensors_id == site.sensor_id)
                })
                .find_map(|r| Some((r.value?, r.datetime.as_ref().and_then(|d| d.utc.clone()))));
            if let Some((value, datetime)) = matching {
                return Ok(Some(make(value, datetime)));
            }
        }

        let Some(sensor_id) = site.sensor_id else {
            return Ok(None);
        };
        debug!("Falling back to hourly data of sensor {sensor_id} for {item}");
        Ok(self
            .latest_hour(sensor_id)
            .await?
            .and_then(|reading| Some(make(reading.value?, reading.datetime_utc()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RetryPolicy;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn adapter(server: &MockServer) -> AirQualityAdapter {
        let client = ApiClient::builder()
            .name("openaq")
            .base_url(server.base_url())
            .api_key(ApiKey::Header {
                name: "X-API-Key".to_string(),
                value: "secret".to_string(),
            })
            .retry(RetryPolicy::new(2, Duration::from_millis(1)))
            .build()
            .unwrap();
        AirQualityAdapter::new(client, AirQualityConfig::default().pollutants, 50)
    }

    fn germany() -> Country {
        Country::new("DE", "DEU", "Germany")
    }

    fn sensor(id: i64, parameter_id: i64) -> serde_json::Value {
        json!({ "id": id, "parameter": { "id": parameter_id, "name": "x", "units": "µg/m³" } })
    }

    fn site(sensor_id: i64, parameter_id: i64) -> MonitoringSite {
        MonitoringSite {
            name: Some("Berlin Mitte".to_string()),
            coordinates: Some(LatLon(52.5, 13.4)),
            sensor_id: Some(sensor_id),
            parameter_id,
            unit: Some("µg/m³".to_string()),
        }
    }

    fn pollutant_item(location_id: i64, parameter: &str, site: MonitoringSite) -> WorkItem {
        WorkItem::new(
            germany(),
            WorkKey::Pollutant {
                location_id,
                parameter: parameter.to_string(),
            },
        )
        .with_site(site)
    }

    #[tokio::test]
    async fn lists_best_covered_locations_first() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/locations")
                    .query_param("iso", "DE")
                    .query_param("limit", "50")
                    .query_param("page", "1")
                    .header("X-API-Key", "secret");
                then.status(200).json_body(json!({
                    "results": [
                        { "id": 1, "name": "Only CO", "sensors": [sensor(10, 4)] },
                        { "id": 2, "name": "PM only", "sensors": [sensor(20, 2)] },
                        {
                            "id": 3,
                            "name": "Full",
                            "coordinates": { "latitude": 52.5, "longitude": 13.4 },
                            "sensors": [sensor(30, 5), sensor(31, 2), sensor(32, 3)]
                        }
                    ]
                }));
            })
            .await;

        let adapter = adapter(&server);
        let items = adapter.list_work_items(&germany(), 100).await.unwrap();
        mock.assert_async().await;

        let keys: Vec<String> = items.iter().map(|i| i.key.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "location 3 / pm25",
                "location 3 / no2",
                "location 3 / o3",
                "location 2 / pm25"
            ]
        );
        let first_site = items[0].site.as_ref().unwrap();
        assert_eq!(first_site.sensor_id, Some(31));
        assert_eq!(first_site.coordinates, Some(LatLon(52.5, 13.4)));

        let limited = adapter.list_work_items(&germany(), 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn latest_readings_are_fetched_once_per_location() {
        let server = MockServer::start_async().await;
        let latest = server
            .mock_async(|when, then| {
                when.method(GET).path("/locations/3/latest");
                then.status(200).json_body(json!({
                    "results": [
                        { "value": 11.5, "sensorsId": 31, "datetime": { "utc": "2024-05-01T10:00:00Z" } },
                        { "value": 40.0, "sensorsId": 32, "datetime": { "utc": "2024-05-01T10:00:00Z" } }
                    ]
                }));
            })
            .await;

        let adapter = adapter(&server);
        let pm25 = adapter
            .fetch_observation(&pollutant_item(3, "pm25", site(31, 2)))
            .await
            .unwrap()
            .unwrap();
        let no2 = adapter
            .fetch_observation(&pollutant_item(3, "no2", site(32, 3)))
            .await
            .unwrap()
            .unwrap();

        latest.assert_hits_async(1).await;
        match (pm25, no2) {
            (Observation::AirQuality(pm25), Observation::AirQuality(no2)) => {
                assert_eq!(pm25.value, 11.5);
                assert_eq!(pm25.datetime_utc.as_deref(), Some("2024-05-01T10:00:00Z"));
                assert_eq!(pm25.location_name.as_deref(), Some("Berlin Mitte"));
                assert_eq!(no2.value, 40.0);
                assert_eq!(no2.parameter, "no2");
            }
            other => panic!("unexpected observations {other:?}"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_sensor_hours() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/locations/3/latest");
                then.status(500);
            })
            .await;
        let hours = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/sensors/30/hours")
                    .query_param("limit", "1")
                    .query_param("sort", "desc");
                then.status(200).json_body(json!({
                    "results": [{
                        "value": 61.0,
                        "period": { "datetimeTo": { "utc": "2024-05-01T09:00:00Z" } }
                    }]
                }));
            })
            .await;

        let adapter = adapter(&server);
        let obs = adapter
            .fetch_observation(&pollutant_item(3, "o3", site(30, 5)))
            .await
            .unwrap();

        hours.assert_async().await;
        match obs {
            Some(Observation::AirQuality(o3)) => {
                assert_eq!(o3.value, 61.0);
                assert_eq!(o3.datetime_utc.as_deref(), Some("2024-05-01T09:00:00Z"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_value_anywhere_is_no_data() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/locations/3/latest");
                then.status(200).json_body(json!({ "results": [] }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sensors/31/hours");
                then.status(200).json_body(json!({ "results": [] }));
            })
            .await;

        let adapter = adapter(&server);
        let obs = adapter
            .fetch_observation(&pollutant_item(3, "pm25", site(31, 2)))
            .await
            .unwrap();
        assert_eq!(obs, None);
    }
}
