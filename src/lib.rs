mod api;
mod collector;
mod config;
mod error;
mod sources;
mod store;
mod types;
mod utils;

pub use collector::*;
pub use error::CollectorError;

pub use api::client::{ApiClient, ApiKey};
pub use api::error::ApiError;
pub use api::retry::RetryPolicy;

pub use config::error::ConfigError;
pub use config::{
    AirQualityConfig, CityEntry, Config, EconomicConfig, HttpConfig, PollutantEntry, RunConfig,
    SyntheticConfig, SyntheticRange, WeatherConfig, DATABASE_VAR, OPENAQ_KEY_VAR,
    OPENWEATHER_KEY_VAR,
};

pub use sources::air_quality::AirQualityAdapter;
pub use sources::economic::EconomicAdapter;
pub use sources::error::SourceError;
pub use sources::weather::WeatherAdapter;
pub use sources::SourceAdapter;

pub use store::error::StoreError;
pub use store::report::{CountrySummary, SourceCount};
pub use store::schema::SCHEMA_VERSION;
pub use store::writer::StoreOutcome;
pub use store::Store;

pub use types::country::*;
pub use types::observation::air_quality::AirQualityObservation;
pub use types::observation::economic::EconomicObservation;
pub use types::observation::weather::WeatherObservation;
pub use types::observation::Observation;
pub use types::source::DataSource;
pub use types::work_item::*;
