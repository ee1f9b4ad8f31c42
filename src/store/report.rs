//! Typed, read-only queries over the joined observation tables for report
//! generation and plotting.

use crate::store::error::StoreError;
use crate::store::Store;
use crate::types::source::DataSource;
use rusqlite::params;

/// Per-country averages across all three sources.
#[derive(Debug, Clone, PartialEq)]
pub struct CountrySummary {
    pub country_code: String,
    pub country_name: String,
    pub avg_temperature: f64,
    pub avg_pm25: f64,
    pub avg_indicator_value: f64,
}

/// Real and synthetic row counts of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCount {
    pub source: DataSource,
    pub real: usize,
    pub synthetic: usize,
}

impl SourceCount {
    pub fn total(&self) -> usize {
        self.real + self.synthetic
    }
}

const COUNTRY_SUMMARY_SQL: &str = "
    SELECT c.country_code, c.country_name, w.avg_temp, a.avg_pm25, e.avg_value
    FROM countries c
    JOIN (SELECT country_id, AVG(temperature) AS avg_temp
          FROM weather_data
          WHERE temperature IS NOT NULL AND (?1 OR is_synthetic = 0)
          GROUP BY country_id) w ON w.country_id = c.country_id
    JOIN (SELECT country_id, AVG(value) AS avg_pm25
          FROM air_quality_data
          WHERE parameter = 'pm25' AND (?1 OR is_synthetic = 0)
          GROUP BY country_id) a ON a.country_id = c.country_id
    JOIN (SELECT country_id, AVG(value) AS avg_value
          FROM economic_data
          WHERE (?1 OR is_synthetic = 0)
          GROUP BY country_id) e ON e.country_id = c.country_id
    ORDER BY c.country_name";

impl Store {
    /// Averages per country that has data in every source, ordered by country name.
    ///
    /// With `include_synthetic` off, placeholder rows are left out of every average.
    pub fn country_summary(
        &self,
        include_synthetic: bool,
    ) -> Result<Vec<CountrySummary>, StoreError> {
        let mut stmt = self.conn.prepare(COUNTRY_SUMMARY_SQL)?;
        let rows = stmt.query_map(params![include_synthetic], |row| {
            Ok(CountrySummary {
                country_code: row.get(0)?,
                country_name: row.get(1)?,
                avg_temperature: row.get(2)?,
                avg_pm25: row.get(3)?,
                avg_indicator_value: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn source_counts(&self) -> Result<Vec<SourceCount>, StoreError> {
        DataSource::ALL
            .iter()
            .map(|&source| {
                let sql = format!(
                    "SELECT COALESCE(SUM(is_synthetic = 0), 0), COALESCE(SUM(is_synthetic <> 0), 0)
                     FROM {}",
                    source.table_name()
                );
                let (real, synthetic): (i64, i64) =
                    self.conn.query_row(&sql, [], |r| Ok((r.get(0)?, r.get(1)?)))?;
                Ok(SourceCount {
                    source,
                    real: usize::try_from(real).unwrap_or(0),
                    synthetic: usize::try_from(synthetic).unwrap_or(0),
                })
            })
            .collect()
    }
}
