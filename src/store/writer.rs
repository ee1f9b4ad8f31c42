use crate::store::error::StoreError;
use crate::store::Store;
use crate::types::country::Country;
use crate::types::observation::Observation;
use log::debug;
use rusqlite::{ffi, params, OptionalExtension};

/// What happened to an observation handed to [`Store::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    /// A row with the same uniqueness key already existed and was left untouched.
    DuplicateSkipped,
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

impl Store {
    /// Returns the `country_id` for `country`, inserting the row on first use.
    pub fn country_id(&self, country: &Country) -> Result<i64, StoreError> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT country_id FROM countries WHERE country_code = ?1",
                params![country.code],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO countries (country_code, country_code_3, country_name) VALUES (?1, ?2, ?3)",
            params![country.code, country.code3, country.name],
        )?;
        debug!("Created country row for {}", country.code);
        Ok(self.conn.last_insert_rowid())
    }

    /// Persists one observation in its source's table.
    ///
    /// Each call is a single statement, so it is atomic on its own. A
    /// uniqueness conflict is not an error: the existing row wins and
    /// [`StoreOutcome::DuplicateSkipped`] is returned.
    pub fn store(&self, observation: &Observation) -> Result<StoreOutcome, StoreError> {
        let country_id = self.country_id(observation.country())?;
        let result = match observation {
            Observation::Weather(o) => self.conn.execute(
                "INSERT INTO weather_data
                    (country_id, city_name, latitude, longitude, temperature,
                     humidity, pressure, timestamp, is_synthetic)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    country_id,
                    o.city,
                    o.coordinates.map(|c| c.0),
                    o.coordinates.map(|c| c.1),
                    o.temperature,
                    o.humidity,
                    o.pressure,
                    o.timestamp,
                    o.is_synthetic,
                ],
            ),
            Observation::AirQuality(o) => self.conn.execute(
                "INSERT INTO air_quality_data
                    (country_id, location_id, location_name, latitude, longitude,
                     parameter, value, unit, datetime_utc, is_synthetic)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    country_id,
                    o.location_id,
                    o.location_name,
                    o.coordinates.map(|c| c.0),
                    o.coordinates.map(|c| c.1),
                    o.parameter,
                    o.value,
                    o.unit,
                    o.datetime_utc,
                    o.is_synthetic,
                ],
            ),
            Observation::Economic(o) => self.conn.execute(
                "INSERT INTO economic_data
                    (country_id, indicator_id, indicator_name, year, value, is_synthetic)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    country_id,
                    o.indicator_id,
                    o.indicator_name,
                    o.year,
                    o.value,
                    o.is_synthetic,
                ],
            ),
        };

        match result {
            Ok(_) => Ok(StoreOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(StoreOutcome::DuplicateSkipped),
            Err(e) => Err(e.into()),
        }
    }
}
