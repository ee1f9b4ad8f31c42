//! Yearly development indicators per country from the World Bank v2 API.

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::config::{EconomicConfig, HttpConfig};
use crate::sources::error::SourceError;
use crate::sources::{build_client, parse, SourceAdapter};
use crate::types::country::Country;
use crate::types::observation::economic::EconomicObservation;
use crate::types::observation::Observation;
use crate::types::source::DataSource;
use crate::types::work_item::{WorkItem, WorkKey};
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Deserialize)]
struct IndicatorEntry {
    indicator: Option<Named>,
    /// Year as a string, e.g. `"2022"`.
    date: String,
    value: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct Named {
    value: Option<String>,
}

pub struct EconomicAdapter {
    client: ApiClient,
    indicator_id: String,
    years: Vec<i32>,
    per_page: u32,
    /// (ISO3 code, indicator id) -> entries of the first result page.
    series_cache: Mutex<HashMap<(String, String), Vec<IndicatorEntry>>>,
}

impl EconomicAdapter {
    pub fn new(client: ApiClient, indicator_id: &str, years: Vec<i32>, per_page: u32) -> Self {
        Self {
            client,
            indicator_id: indicator_id.to_string(),
            years,
            per_page,
            series_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &EconomicConfig, http: &HttpConfig) -> Result<Self, ApiError> {
        let client = build_client(
            "worldbank",
            &config.base_url,
            None,
            config.min_request_delay_ms,
            http,
        )?;
        Ok(Self::new(
            client,
            &config.indicator_id,
            config.years.clone(),
            config.per_page,
        ))
    }

    async fn series(
        &self,
        country: &Country,
        indicator_id: &str,
    ) -> Result<Vec<IndicatorEntry>, SourceError> {
        let cache_key = (country.code3.clone(), indicator_id.to_string());
        if let Some(entries) = self.series_cache.lock().await.get(&cache_key) {
            return Ok(entries.clone());
        }

        let path = format!("country/{}/indicator/{}", country.code3, indicator_id);
        let query = [
            ("format", "json".to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", "1".to_string()),
        ];
        let body = self.client.request(&path, &query).await?;
        // data[0] is paging metadata, data[1] the entries; error payloads have no data[1].
        let entries = match body {
            Value::Array(mut parts) if parts.get(1).is_some_and(Value::is_array) => {
                parse(parts.swap_remove(1), self.client.url_for(&path))?
            }
            _ => {
                debug!("No {indicator_id} series for {}", country.code3);
                Vec::new()
            }
        };

        self.series_cache
            .lock()
            .await
            .insert(cache_key, entries.clone());
        Ok(entries)
    }
}

impl SourceAdapter for EconomicAdapter {
    fn source(&self) -> DataSource {
        DataSource::Economic
    }

    async fn list_work_items(
        &self,
        country: &Country,
        limit: usize,
    ) -> Result<Vec<WorkItem>, SourceError> {
        Ok(self
            .years
            .iter()
            .take(limit)
            .map(|&year| {
                let key = WorkKey::IndicatorYear {
                    indicator_id: self.indicator_id.clone(),
                    year,
                };
                WorkItem::new(country.clone(), key)
            })
            .collect())
    }

    async fn fetch_observation(&self, item: &WorkItem) -> Result<Option<Observation>, SourceError> {
        let WorkKey::IndicatorYear { indicator_id, year } = &item.key else {
            return Err(SourceError::ForeignWorkItem(item.to_string(), "economic"));
        };

        let entries = self.series(&item.country, indicator_id).await?;
        let wanted = year.to_string();
        let Some(entry) = entries.into_iter().find(|e| e.date == wanted) else {
            return Ok(None);
        };
        let Some(value) = entry.value else {
            return Ok(None);
        };

        Ok(Some(Observation::Economic(EconomicObservation {
            country: item.country.clone(),
            indicator_id: indicator_id.clone(),
            indicator_name: entry.indicator.and_then(|i| i.value),
            year: *year,
            value,
            is_synthetic: false,
        })))
    }
}
