//! Versioned schema definition and the one-time migration of tables left
//! behind by earlier, unversioned collectors.
//!
//! The version lives in `PRAGMA user_version`. A database at version 0 whose
//! tables already exist is migrated with its data preserved: every existing
//! table is rebuilt into the canonical shape, keeping the first row (lowest
//! rowid) for each uniqueness key and dropping rows that lack a key column.

use crate::store::error::StoreError;
use crate::store::Store;
use crate::types::country::Country;
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;

pub const SCHEMA_VERSION: i64 = 1;

const COUNTRIES: &str = "countries";
const WEATHER: &str = "weather_data";
const AIR_QUALITY: &str = "air_quality_data";
const ECONOMIC: &str = "economic_data";

/// Tables in creation order; `countries` first since the others reference it.
const TABLES: [&str; 4] = [COUNTRIES, WEATHER, AIR_QUALITY, ECONOMIC];

/// Pollutant columns of the old one-row-per-location air quality layout.
const WIDE_POLLUTANT_COLUMNS: [(&str, &str); 3] =
    [("pm25_value", "pm25"), ("no2_value", "no2"), ("o3_value", "o3")];

fn table_ddl(table: &str, name: &str) -> String {
    match table {
        COUNTRIES => format!(
            "CREATE TABLE IF NOT EXISTS {name} (
                country_id INTEGER PRIMARY KEY AUTOINCREMENT,
                country_code TEXT UNIQUE NOT NULL,
                country_code_3 TEXT UNIQUE NOT NULL,
                country_name TEXT NOT NULL
            )"
        ),
        WEATHER => format!(
            "CREATE TABLE IF NOT EXISTS {name} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                country_id INTEGER NOT NULL,
                city_name TEXT NOT NULL,
                latitude REAL,
                longitude REAL,
                temperature REAL,
                humidity INTEGER,
                pressure INTEGER,
                timestamp INTEGER NOT NULL,
                is_synthetic INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (country_id) REFERENCES countries(country_id),
                UNIQUE (country_id, city_name, timestamp)
            )"
        ),
        AIR_QUALITY => format!(
            "CREATE TABLE IF NOT EXISTS {name} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                country_id INTEGER NOT NULL,
                location_id INTEGER NOT NULL,
                location_name TEXT,
                latitude REAL,
                longitude REAL,
                parameter TEXT NOT NULL,
                value REAL NOT NULL,
                unit TEXT,
                datetime_utc TEXT,
                is_synthetic INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (country_id) REFERENCES countries(country_id),
                UNIQUE (country_id, location_id, parameter)
            )"
        ),
        _ => format!(
            "CREATE TABLE IF NOT EXISTS {name} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                country_id INTEGER NOT NULL,
                indicator_id TEXT NOT NULL,
                indicator_name TEXT,
                year INTEGER NOT NULL,
                value REAL NOT NULL,
                is_synthetic INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (country_id) REFERENCES countries(country_id),
                UNIQUE (country_id, indicator_id, year)
            )"
        ),
    }
}

const INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_weather_country ON weather_data (country_id);
    CREATE INDEX IF NOT EXISTS idx_air_quality_country ON air_quality_data (country_id);
    CREATE INDEX IF NOT EXISTS idx_economic_country ON economic_data (country_id);
";

impl Store {
    /// Creates or upgrades every table and seeds `countries`.
    ///
    /// Safe to call on every invocation: at the current version it only runs
    /// `CREATE ... IF NOT EXISTS` and insert-if-absent seeding.
    ///
    /// # Errors
    ///
    /// * [`StoreError::UnsupportedVersion`] if the file was written by a newer schema.
    /// * [`StoreError::Migration`] if a legacy table lacks the columns needed to rebuild it.
    pub fn ensure_schema(&mut self, seed: &[Country]) -> Result<(), StoreError> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }

        if version < SCHEMA_VERSION {
            // Renames must not re-resolve references left dangling by legacy tables.
            self.conn.pragma_update(None, "legacy_alter_table", true)?;
        }
        let upgraded = self.upgrade(version, seed);
        if version < SCHEMA_VERSION {
            self.conn.pragma_update(None, "legacy_alter_table", false)?;
        }
        upgraded?;

        // Only takes effect outside a transaction.
        self.conn.pragma_update(None, "foreign_keys", true)?;
        Ok(())
    }

    fn upgrade(&mut self, version: i64, seed: &[Country]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        if version < SCHEMA_VERSION {
            for table in TABLES {
                if table_exists(&tx, table)? {
                    migrate_table(&tx, table)?;
                } else if table == COUNTRIES {
                    // Rebuilt observation tables reference it.
                    tx.execute_batch(&table_ddl(COUNTRIES, COUNTRIES))?;
                }
            }
        }
        for table in TABLES {
            tx.execute_batch(&table_ddl(table, table))?;
        }
        tx.execute_batch(INDEXES)?;
        seed_countries(&tx, seed)?;
        if version < SCHEMA_VERSION {
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?)
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, StoreError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(columns)
}

/// Seeds countries with insert-if-absent semantics and fills in alpha-3 codes
/// that a legacy table could only approximate with the alpha-2 code.
fn seed_countries(conn: &Connection, seed: &[Country]) -> Result<(), StoreError> {
    let mut insert = conn.prepare(
        "INSERT OR IGNORE INTO countries (country_code, country_code_3, country_name)
         VALUES (?1, ?2, ?3)",
    )?;
    let mut repair = conn.prepare(
        "UPDATE OR IGNORE countries SET country_code_3 = ?2
         WHERE country_code = ?1 AND country_code_3 = country_code AND ?1 <> ?2",
    )?;
    for country in seed {
        insert.execute(params![country.code, country.code3, country.name])?;
        repair.execute(params![country.code, country.code3])?;
    }
    Ok(())
}

/// Rebuilds `table` into its canonical shape, preserving every row that has a
/// complete uniqueness key.
fn migrate_table(conn: &Connection, table: &str) -> Result<(), StoreError> {
    let columns = table_columns(conn, table)?;
    let staging = format!("{table}_migrated");
    let col = |name: &str| -> String {
        if columns.contains(name) {
            name.to_string()
        } else {
            "NULL".to_string()
        }
    };
    let require = |names: &[&str]| -> Result<(), StoreError> {
        match names.iter().find(|n| !columns.contains(**n)) {
            Some(missing) => Err(StoreError::Migration {
                table: table.to_string(),
                message: format!("missing column '{missing}'"),
            }),
            None => Ok(()),
        }
    };
    let synthetic = if columns.contains("is_synthetic") {
        "COALESCE(is_synthetic, 0)"
    } else {
        "0"
    };

    conn.execute_batch(&format!("DROP TABLE IF EXISTS {staging}"))?;
    conn.execute_batch(&table_ddl(table, &staging))?;

    let before: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;

    match table {
        COUNTRIES => {
            require(&["country_id", "country_code"])?;
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {staging}
                        (country_id, country_code, country_code_3, country_name)
                     SELECT country_id, country_code,
                            COALESCE({code3}, country_code), COALESCE({name}, country_code)
                     FROM {table} WHERE country_code IS NOT NULL ORDER BY rowid",
                    code3 = col("country_code_3"),
                    name = col("country_name"),
                ),
                [],
            )?;
        }
        WEATHER => {
            require(&["country_id", "city_name"])?;
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {staging}
                        (country_id, city_name, latitude, longitude, temperature,
                         humidity, pressure, timestamp, is_synthetic)
                     SELECT country_id, city_name, {lat}, {lon}, {temp}, {hum}, {pres}, {ts}, {synthetic}
                     FROM {table}
                     WHERE country_id IS NOT NULL AND city_name IS NOT NULL AND {ts} IS NOT NULL
                     ORDER BY rowid",
                    lat = col("latitude"),
                    lon = col("longitude"),
                    temp = col("temperature"),
                    hum = col("humidity"),
                    pres = col("pressure"),
                    ts = col("timestamp"),
                ),
                [],
            )?;
        }
        AIR_QUALITY if columns.contains("parameter") => {
            require(&["country_id", "location_id", "value"])?;
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {staging}
                        (country_id, location_id, location_name, latitude, longitude,
                         parameter, value, unit, datetime_utc, is_synthetic)
                     SELECT country_id, location_id, {name}, {lat}, {lon},
                            parameter, value, {unit}, {dt}, {synthetic}
                     FROM {table}
                     WHERE country_id IS NOT NULL AND location_id IS NOT NULL
                       AND parameter IS NOT NULL AND value IS NOT NULL
                     ORDER BY rowid",
                    name = col("location_name"),
                    lat = col("latitude"),
                    lon = col("longitude"),
                    unit = col("unit"),
                    dt = col("datetime_utc"),
                ),
                [],
            )?;
        }
        AIR_QUALITY => {
            require(&["country_id", "location_id"])?;
            // One row per location with a column per pollutant: unpivot.
            for (wide_column, parameter) in WIDE_POLLUTANT_COLUMNS {
                if !columns.contains(wide_column) {
                    continue;
                }
                conn.execute(
                    &format!(
                        "INSERT OR IGNORE INTO {staging}
                            (country_id, location_id, location_name, latitude, longitude,
                             parameter, value, unit, datetime_utc, is_synthetic)
                         SELECT country_id, location_id, {name}, {lat}, {lon},
                                ?1, {wide_column}, NULL, {dt}, {synthetic}
                         FROM {table}
                         WHERE country_id IS NOT NULL AND location_id IS NOT NULL
                           AND {wide_column} IS NOT NULL
                         ORDER BY rowid",
                        name = col("location_name"),
                        lat = col("latitude"),
                        lon = col("longitude"),
                        dt = col("datetime_utc"),
                    ),
                    params![parameter],
                )?;
            }
        }
        _ => {
            require(&["country_id", "indicator_id", "year", "value"])?;
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {staging}
                        (country_id, indicator_id, indicator_name, year, value, is_synthetic)
                     SELECT country_id, indicator_id, {name}, year, value, {synthetic}
                     FROM {table}
                     WHERE country_id IS NOT NULL AND indicator_id IS NOT NULL
                       AND year IS NOT NULL AND value IS NOT NULL
                     ORDER BY rowid",
                    name = col("indicator_name"),
                ),
                [],
            )?;
        }
    }

    let after: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {staging}"), [], |r| r.get(0))?;
    conn.execute_batch(&format!(
        "DROP TABLE {table}; ALTER TABLE {staging} RENAME TO {table};"
    ))?;

    info!("Migrated table {table}: {before} legacy rows -> {after} rows");
    if after < before && table != AIR_QUALITY {
        warn!(
            "Dropped {} rows from {table} that were duplicates or lacked key columns",
            before - after
        );
    }
    Ok(())
}
