//! Runtime configuration: API keys, per-run caps, entity lists and request
//! pacing for every source, read from TOML with environment overrides.

pub mod error;

use crate::types::country::{default_countries, Country};
use crate::utils::get_config_dir;
use error::ConfigError;
use log::{debug, info};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_DATABASE: &str = "final_data.db";

pub const OPENWEATHER_KEY_VAR: &str = "OPENWEATHER_API_KEY";
pub const OPENAQ_KEY_VAR: &str = "OPENAQ_API_KEY";
pub const DATABASE_VAR: &str = "STATCOLLECT_DATABASE";

/// Top-level configuration passed to every component at construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file shared by all sources and read by the report scripts.
    pub database_path: PathBuf,
    /// Countries seeded into the store and iterated by the air quality and
    /// economic collectors, in priority order for ties.
    pub countries: Vec<Country>,
    pub http: HttpConfig,
    pub weather: WeatherConfig,
    pub air_quality: AirQualityConfig,
    pub economic: EconomicConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from(DEFAULT_DATABASE),
            countries: default_countries(),
            http: HttpConfig::default(),
            weather: WeatherConfig::default(),
            air_quality: AirQualityConfig::default(),
            economic: EconomicConfig::default(),
        }
    }
}

/// Settings shared by every outbound request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * backoff_base_ms` before retrying.
    pub backoff_base_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            timeout_secs: 15,
            max_attempts: 3,
            backoff_base_ms: 15_000,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// Budgeting knobs of one collection run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Maximum number of new records a single invocation may add.
    pub per_run_cap: usize,
    /// Total records after which collection is considered complete.
    pub target_total: usize,
    /// Maximum number of records kept per country, if any.
    pub per_entity_target: Option<usize>,
    /// Store labelled placeholder records when the source has no data.
    pub allow_synthetic_fill: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            per_run_cap: 25,
            target_total: 100,
            per_entity_target: None,
            allow_synthetic_fill: false,
        }
    }
}

/// Inclusive numeric range a synthetic value is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SyntheticRange {
    pub min: f64,
    pub max: f64,
}

impl SyntheticRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Ranges for synthetic placeholder values, keyed by field name
/// (`temperature`, `pm25`, `value`, ...), with optional per-country overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyntheticConfig {
    pub ranges: BTreeMap<String, SyntheticRange>,
    /// Country code -> field -> range.
    pub overrides: BTreeMap<String, BTreeMap<String, SyntheticRange>>,
}

impl SyntheticConfig {
    fn from_pairs(pairs: &[(&str, f64, f64)]) -> Self {
        SyntheticConfig {
            ranges: pairs
                .iter()
                .map(|(field, min, max)| (field.to_string(), SyntheticRange::new(*min, *max)))
                .collect(),
            overrides: BTreeMap::new(),
        }
    }

    /// Range for `field` in `country_code`, preferring the country override.
    pub fn range_for(&self, country_code: &str, field: &str) -> Option<SyntheticRange> {
        self.overrides
            .get(country_code)
            .and_then(|fields| fields.get(field))
            .or_else(|| self.ranges.get(field))
            .copied()
    }
}

/// A `[<source>.run]` table as written in a file. Keys it leaves out keep the
/// source's own defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunPatch {
    per_run_cap: Option<usize>,
    target_total: Option<usize>,
    per_entity_target: Option<usize>,
    allow_synthetic_fill: Option<bool>,
}

impl RunPatch {
    fn apply(self, mut run: RunConfig) -> RunConfig {
        if let Some(cap) = self.per_run_cap {
            run.per_run_cap = cap;
        }
        if let Some(target) = self.target_total {
            run.target_total = target;
        }
        if let Some(quota) = self.per_entity_target {
            run.per_entity_target = Some(quota);
        }
        if let Some(fill) = self.allow_synthetic_fill {
            run.allow_synthetic_fill = fill;
        }
        run
    }
}

/// A `[<source>.synthetic]` table as written in a file. Ranges are added to
/// (or replace) the source's default ranges field by field.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SyntheticPatch {
    ranges: BTreeMap<String, SyntheticRange>,
    overrides: BTreeMap<String, BTreeMap<String, SyntheticRange>>,
}

impl SyntheticPatch {
    fn apply(self, mut synthetic: SyntheticConfig) -> SyntheticConfig {
        synthetic.ranges.extend(self.ranges);
        for (country, fields) in self.overrides {
            synthetic.overrides.entry(country).or_default().extend(fields);
        }
        synthetic
    }
}

fn weather_run<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RunConfig, D::Error> {
    Ok(RunPatch::deserialize(deserializer)?.apply(WeatherConfig::default().run))
}

fn weather_synthetic<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<SyntheticConfig, D::Error> {
    Ok(SyntheticPatch::deserialize(deserializer)?.apply(WeatherConfig::default().synthetic))
}

fn air_quality_run<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RunConfig, D::Error> {
    Ok(RunPatch::deserialize(deserializer)?.apply(AirQualityConfig::default().run))
}

fn air_quality_synthetic<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<SyntheticConfig, D::Error> {
    Ok(SyntheticPatch::deserialize(deserializer)?.apply(AirQualityConfig::default().synthetic))
}

fn economic_run<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RunConfig, D::Error> {
    Ok(RunPatch::deserialize(deserializer)?.apply(EconomicConfig::default().run))
}

fn economic_synthetic<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<SyntheticConfig, D::Error> {
    Ok(SyntheticPatch::deserialize(deserializer)?.apply(EconomicConfig::default().synthetic))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CityEntry {
    pub name: String,
    /// ISO alpha-2 code of the owning country.
    pub country: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub min_request_delay_ms: u64,
    #[serde(deserialize_with = "weather_run")]
    pub run: RunConfig,
    #[serde(deserialize_with = "weather_synthetic")]
    pub synthetic: SyntheticConfig,
    pub cities: Vec<CityEntry>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        let cities = [
            ("Washington", "US"),
            ("New York", "US"),
            ("Los Angeles", "US"),
            ("New Delhi", "IN"),
            ("Mumbai", "IN"),
            ("Jaipur", "IN"),
            ("Beijing", "CN"),
            ("Shanghai", "CN"),
            ("Guangzhou", "CN"),
            ("London", "GB"),
            ("Manchester", "GB"),
            ("Edinburgh", "GB"),
            ("Brasilia", "BR"),
            ("Sao Paulo", "BR"),
            ("Rio de Janeiro", "BR"),
            ("Canberra", "AU"),
            ("Sydney", "AU"),
            ("Melbourne", "AU"),
            ("Berlin", "DE"),
            ("Munich", "DE"),
            ("Hamburg", "DE"),
            ("Bangkok", "TH"),
            ("Chiang Mai", "TH"),
            ("Phuket", "TH"),
            ("Tokyo", "JP"),
            ("Osaka", "JP"),
            ("Sapporo", "JP"),
            ("Seoul", "KR"),
            ("Busan", "KR"),
            ("Incheon", "KR"),
        ]
        .iter()
        .map(|(name, country)| CityEntry {
            name: name.to_string(),
            country: country.to_string(),
        })
        .collect::<Vec<_>>();

        WeatherConfig {
            base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            api_key: None,
            min_request_delay_ms: 1_000,
            run: RunConfig {
                target_total: cities.len(),
                ..RunConfig::default()
            },
            synthetic: SyntheticConfig::from_pairs(&[
                ("temperature", -10.0, 35.0),
                ("humidity", 20.0, 95.0),
                ("pressure", 990.0, 1030.0),
            ]),
            cities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PollutantEntry {
    /// OpenAQ parameter id.
    pub id: i64,
    /// Name stored in the `parameter` column.
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AirQualityConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub min_request_delay_ms: u64,
    #[serde(deserialize_with = "air_quality_run")]
    pub run: RunConfig,
    #[serde(deserialize_with = "air_quality_synthetic")]
    pub synthetic: SyntheticConfig,
    pub pollutants: Vec<PollutantEntry>,
    /// Locations requested per country listing.
    pub locations_page_size: u32,
}

impl Default for AirQualityConfig {
    fn default() -> Self {
        AirQualityConfig {
            base_url: "https://api.openaq.org/v3".to_string(),
            api_key: None,
            min_request_delay_ms: 1_000,
            run: RunConfig {
                per_entity_target: Some(10),
                ..RunConfig::default()
            },
            synthetic: SyntheticConfig::from_pairs(&[
                ("pm25", 5.0, 80.0),
                ("no2", 5.0, 60.0),
                ("o3", 10.0, 120.0),
            ]),
            pollutants: [(2, "pm25"), (3, "no2"), (5, "o3")]
                .iter()
                .map(|(id, name)| PollutantEntry {
                    id: *id,
                    name: name.to_string(),
                })
                .collect(),
            locations_page_size: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EconomicConfig {
    pub base_url: String,
    pub min_request_delay_ms: u64,
    #[serde(deserialize_with = "economic_run")]
    pub run: RunConfig,
    #[serde(deserialize_with = "economic_synthetic")]
    pub synthetic: SyntheticConfig,
    pub indicator_id: String,
    pub years: Vec<i32>,
    pub per_page: u32,
}

impl Default for EconomicConfig {
    fn default() -> Self {
        let years = vec![2023, 2022, 2021, 2020];
        EconomicConfig {
            base_url: "https://api.worldbank.org/v2".to_string(),
            min_request_delay_ms: 300,
            run: RunConfig {
                target_total: years.len() * default_countries().len(),
                ..RunConfig::default()
            },
            synthetic: SyntheticConfig::from_pairs(&[("value", 1_000.0, 80_000.0)]),
            indicator_id: "NY.GDP.PCAP.CD".to_string(),
            years,
            per_page: 50,
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, or from the default location when
    /// `path` is `None`, then applies environment overrides.
    ///
    /// A missing file at the default location yields the built-in defaults; a
    /// missing file at an explicitly requested path is an error.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = get_config_dir()
                    .ok_or(ConfigError::ConfigDirResolution)?
                    .join(CONFIG_FILE_NAME);
                match Self::from_file(&default_path) {
                    Err(ConfigError::Read(_, e)) if e.kind() == io::ErrorKind::NotFound => {
                        debug!(
                            "No config file at {}, using defaults",
                            default_path.display()
                        );
                        Config::default()
                    }
                    other => other?,
                }
            }
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Overrides API keys and the database path from the given variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(OPENWEATHER_KEY_VAR) {
            self.weather.api_key = Some(key);
        }
        if let Some(key) = lookup(OPENAQ_KEY_VAR) {
            self.air_quality.api_key = Some(key);
        }
        if let Some(path) = lookup(DATABASE_VAR) {
            self.database_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "http.max_attempts must be at least 1".to_string(),
            ));
        }
        for (label, run) in [
            ("weather", &self.weather.run),
            ("air_quality", &self.air_quality.run),
            ("economic", &self.economic.run),
        ] {
            if run.per_run_cap == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{label}.run.per_run_cap must be at least 1"
                )));
            }
        }
        for (label, synthetic) in [
            ("weather", &self.weather.synthetic),
            ("air_quality", &self.air_quality.synthetic),
            ("economic", &self.economic.synthetic),
        ] {
            let all_ranges = synthetic
                .ranges
                .iter()
                .chain(synthetic.overrides.values().flat_map(|fields| fields.iter()));
            for (field, range) in all_ranges {
                if range.min.is_nan() || range.max.is_nan() || range.min > range.max {
                    return Err(ConfigError::Invalid(format!(
                        "{label}.synthetic range for '{field}' has min above max"
                    )));
                }
            }
        }
        for city in &self.weather.cities {
            if self.country(&city.country).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "city '{}' references unknown country '{}'",
                    city.name, city.country
                )));
            }
        }
        Ok(())
    }

    /// Looks up a configured country by alpha-2 code.
    pub fn country(&self, code: &str) -> Option<&Country> {
        self.countries.iter().find(|c| c.code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.countries.len(), 10);
        assert_eq!(config.http.max_attempts, 3);
        assert_eq!(config.http.timeout(), Duration::from_secs(15));
        assert_eq!(config.economic.run.target_total, 40);
        assert_eq!(config.air_quality.run.per_entity_target, Some(10));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_path = "/tmp/other.db"

[weather]
api_key = "abc"
min_request_delay_ms = 300

[weather.run]
per_run_cap = 5
allow_synthetic_fill = true

[air_quality.run]
per_run_cap = 5

[air_quality.synthetic.overrides.IN]
pm25 = {{ min = 40.0, max = 150.0 }}

[economic.run]
allow_synthetic_fill = true

[economic.synthetic.ranges]
value = {{ min = 500.0, max = 900.0 }}
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.weather.api_key.as_deref(), Some("abc"));
        assert_eq!(config.weather.run.per_run_cap, 5);
        assert!(config.weather.run.allow_synthetic_fill);
        assert_eq!(config.weather.run.target_total, 30);
        assert_eq!(config.weather.cities.len(), 30);
        assert_eq!(
            config.weather.synthetic.range_for("US", "temperature"),
            Some(SyntheticRange::new(-10.0, 35.0))
        );

        assert_eq!(config.air_quality.run.per_run_cap, 5);
        assert_eq!(config.air_quality.run.per_entity_target, Some(10));
        assert_eq!(
            config.air_quality.synthetic.range_for("IN", "pm25"),
            Some(SyntheticRange::new(40.0, 150.0))
        );
        assert_eq!(
            config.air_quality.synthetic.range_for("US", "pm25"),
            Some(SyntheticRange::new(5.0, 80.0))
        );
        assert_eq!(
            config.air_quality.synthetic.range_for("IN", "no2"),
            Some(SyntheticRange::new(5.0, 60.0))
        );

        assert!(config.economic.run.allow_synthetic_fill);
        assert_eq!(config.economic.run.target_total, 40);
        assert_eq!(config.economic.run.per_run_cap, 25);
        assert_eq!(
            config.economic.synthetic.range_for("US", "value"),
            Some(SyntheticRange::new(500.0, 900.0))
        );
        assert_eq!(config.economic.indicator_id, "NY.GDP.PCAP.CD");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "database_path = [").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse(_, _))
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Read(_, _))));
    }

    #[test]
    fn environment_overrides_keys_and_database() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            OPENWEATHER_KEY_VAR => Some("ow".to_string()),
            OPENAQ_KEY_VAR => Some("aq".to_string()),
            DATABASE_VAR => Some("/data/stats.db".to_string()),
            _ => None,
        });
        assert_eq!(config.weather.api_key.as_deref(), Some("ow"));
        assert_eq!(config.air_quality.api_key.as_deref(), Some("aq"));
        assert_eq!(config.database_path, PathBuf::from("/data/stats.db"));
    }

    #[test]
    fn rejects_inverted_synthetic_range() {
        let mut config = Config::default();
        config
            .economic
            .synthetic
            .ranges
            .insert("value".to_string(), SyntheticRange::new(10.0, 1.0));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_city_of_unknown_country() {
        let mut config = Config::default();
        config.weather.cities.push(CityEntry {
            name: "Paris".to_string(),
            country: "FR".to_string(),
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
