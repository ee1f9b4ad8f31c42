//! Read-side queries the collector uses to decide what is still missing.

use crate::store::error::StoreError;
use crate::store::Store;
use crate::types::source::DataSource;
use crate::types::work_item::{ProgressKey, WorkKey};
use log::info;
use std::collections::{HashMap, HashSet};

impl Store {
    /// Total rows currently persisted for `source`.
    pub fn count(&self, source: DataSource) -> Result<usize, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", source.table_name());
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Rows per country (alpha-2 code) for `source`. Countries without rows are absent.
    pub fn counts_by_country(
        &self,
        source: DataSource,
    ) -> Result<HashMap<String, usize>, StoreError> {
        let sql = format!(
            "SELECT c.country_code, COUNT(*)
             FROM {} d JOIN countries c ON c.country_id = d.country_id
             GROUP BY c.country_code",
            source.table_name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = HashMap::new();
        for row in rows {
            let (code, n) = row?;
            counts.insert(code, usize::try_from(n).unwrap_or(0));
        }
        Ok(counts)
    }

    /// Every progress key already present for `source`.
    pub fn existing_keys(&self, source: DataSource) -> Result<HashSet<ProgressKey>, StoreError> {
        let sql = match source {
            DataSource::Weather => {
                "SELECT DISTINCT c.country_code, d.city_name, NULL
                 FROM weather_data d JOIN countries c ON c.country_id = d.country_id"
            }
            DataSource::AirQuality => {
                "SELECT c.country_code, d.location_id, d.parameter
                 FROM air_quality_data d JOIN countries c ON c.country_id = d.country_id"
            }
            DataSource::Economic => {
                "SELECT c.country_code, d.indicator_id, d.year
                 FROM economic_data d JOIN countries c ON c.country_id = d.country_id"
            }
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            let country: String = row.get(0)?;
            let key = match source {
                DataSource::Weather => WorkKey::City(row.get(1)?),
                DataSource::AirQuality => WorkKey::Pollutant {
                    location_id: row.get(1)?,
                    parameter: row.get(2)?,
                },
                DataSource::Economic => WorkKey::IndicatorYear {
                    indicator_id: row.get(1)?,
                    year: row.get(2)?,
                },
            };
            Ok(ProgressKey::new(&country, key))
        })?;
        Ok(rows.collect::<Result<HashSet<_>, _>>()?)
    }

    /// Deletes every row of `source`, returning how many were removed.
    pub fn reset(&self, source: DataSource) -> Result<usize, StoreError> {
        let removed = self
            .conn
            .execute(&format!("DELETE FROM {}", source.table_name()), [])?;
        info!("Removed {removed} rows from {}", source.table_name());
        Ok(removed)
    }
}
