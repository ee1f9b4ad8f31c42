//! Current conditions per configured city from the OpenWeather API.

use crate::api::client::{ApiClient, ApiKey};
use crate::api::error::ApiError;
use crate::config::{CityEntry, HttpConfig, WeatherConfig};
use crate::sources::error::SourceError;
use crate::sources::{build_client, parse, SourceAdapter};
use crate::types::country::Country;
use crate::types::observation::weather::WeatherObservation;
use crate::types::observation::Observation;
use crate::types::source::DataSource;
use crate::types::work_item::{LatLon, WorkItem, WorkKey};
use log::{info, warn};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    coord: Option<Coord>,
    main: Option<MainReadings>,
    dt: i64,
}

#[derive(Debug, Deserialize)]
struct Coord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: Option<f64>,
    humidity: Option<i64>,
    pressure: Option<i64>,
}

pub struct WeatherAdapter {
    client: ApiClient,
    cities: Vec<CityEntry>,
}

impl WeatherAdapter {
    pub fn new(client: ApiClient, cities: Vec<CityEntry>) -> Self {
        Self { client, cities }
    }

    pub fn from_config(config: &WeatherConfig, http: &HttpConfig) -> Result<Self, ApiError> {
        if config.api_key.is_none() {
            warn!("No OpenWeather API key configured; requests will likely be rejected");
        }
        let api_key = config.api_key.clone().map(|value| ApiKey::Query {
            name: "appid".to_string(),
            value,
        });
        let client = build_client(
            "openweather",
            &config.base_url,
            api_key,
            config.min_request_delay_ms,
            http,
        )?;
        Ok(Self::new(client, config.cities.clone()))
    }
}

impl SourceAdapter for WeatherAdapter {
    fn source(&self) -> DataSource {
        DataSource::Weather
    }

    async fn list_work_items(
        &self,
        country: &Country,
        limit: usize,
    ) -> Result<Vec<WorkItem>, SourceError> {
        Ok(self
            .cities
            .iter()
            .filter(|city| city.country == country.code)
            .take(limit)
            .map(|city| WorkItem::new(country.clone(), WorkKey::City(city.name.clone())))
            .collect())
    }

    async fn fetch_observation(&self, item: &WorkItem) -> Result<Option<Observation>, SourceError> {
        let WorkKey::City(city) = &item.key else {
            return Err(SourceError::ForeignWorkItem(item.to_string(), "weather"));
        };

        let query = [
            ("q", format!("{},{}", city, item.country.code)),
            ("units", "metric".to_string()),
        ];
        let body = match self.client.request("weather", &query).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => {
                info!("OpenWeather does not know {city}, {}", item.country.code);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let current: CurrentWeather = parse(body, self.client.url_for("weather"))?;
        let main = current.main.unwrap_or(MainReadings {
            temp: None,
            humidity: None,
            pressure: None,
        });
        if main.temp.is_none() && main.humidity.is_none() && main.pressure.is_none() {
            return Ok(None);
        }

        Ok(Some(Observation::Weather(WeatherObservation {
            country: item.country.clone(),
            city: city.clone(),
            coordinates: current.coord.map(|c| LatLon(c.lat, c.lon)),
            temperature: main.temp,
            humidity: main.humidity,
            pressure: main.pressure,
            timestamp: current.dt,
            is_synthetic: false,
        })))
    }
}
