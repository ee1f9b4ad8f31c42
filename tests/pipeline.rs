use httpmock::prelude::*;
use serde_json::{json, Value};
use statcollect::{collect_source, Config, Country, DataSource, Store};

fn series(iso3: &str, values: &[(&str, Option<f64>)]) -> Value {
    let entries: Vec<Value> = values
        .iter()
        .map(|(year, value)| {
            json!({
                "indicator": { "id": "NY.GDP.PCAP.CD", "value": "GDP per capita (current US$)" },
                "countryiso3code": iso3,
                "date": year,
                "value": value
            })
        })
        .collect();
    json!([{ "page": 1, "pages": 1, "per_page": 50, "total": entries.len() }, entries])
}

fn config(server: &MockServer, database: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.database_path = database.to_path_buf();
    config.countries = vec![
        Country::new("US", "USA", "United States"),
        Country::new("DE", "DEU", "Germany"),
    ];
    config.weather.cities.retain(|c| c.country == "US" || c.country == "DE");
    config.http.backoff_base_ms = 1;
    config.economic.base_url = server.base_url();
    config.economic.min_request_delay_ms = 0;
    config.economic.run.per_run_cap = 5;
    config.economic.run.target_total = 8;
    config
}

#[tokio::test]
async fn economic_collection_resumes_until_target() {
    let server = MockServer::start_async().await;
    let usa = server
        .mock_async(|when, then| {
            when.method(GET).path("/country/USA/indicator/NY.GDP.PCAP.CD");
            then.status(200).json_body(series(
                "USA",
                &[
                    ("2023", Some(82_769.4)),
                    ("2022", Some(77_860.9)),
                    ("2021", Some(71_307.4)),
                    ("2020", Some(64_411.4)),
                ],
            ));
        })
        .await;
    let germany = server
        .mock_async(|when, then| {
            when.method(GET).path("/country/DEU/indicator/NY.GDP.PCAP.CD");
            then.status(200).json_body(series(
                "DEU",
                &[
                    ("2023", None),
                    ("2022", Some(48_717.9)),
                    ("2021", Some(51_426.8)),
                    ("2020", Some(46_772.8)),
                ],
            ));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("data").join("stats.db");
    let config = config(&server, &db_path);

    let mut store = Store::open(&db_path).unwrap();
    store.ensure_schema(&config.countries).unwrap();

    let first = collect_source(&config, &store, DataSource::Economic)
        .await
        .unwrap();
    assert_eq!(first.items_collected_this_run, 5);
    assert_eq!(first.runs_remaining, 1);

    let second = collect_source(&config, &store, DataSource::Economic)
        .await
        .unwrap();
    // Germany has no 2023 value, so only seven rows exist upstream.
    assert_eq!(second.items_collected_this_run, 2);
    assert_eq!(second.total_persisted, 7);
    assert_eq!(second.synthetic_this_run, 0);

    // Each run builds a fresh adapter, so each country is fetched once per run.
    usa.assert_hits_async(1).await;
    germany.assert_hits_async(2).await;

    drop(store);
    let reader = Store::open_read_only(&db_path).unwrap();
    let counts = reader.source_counts().unwrap();
    let economic = counts
        .iter()
        .find(|c| c.source == DataSource::Economic)
        .unwrap();
    assert_eq!((economic.real, economic.synthetic), (7, 0));
}

#[tokio::test]
async fn synthetic_fill_closes_the_gap() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/indicator/");
            then.status(200).json_body(series("XXX", &[]));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("stats.db");
    let mut config = config(&server, &db_path);
    config.economic.run.per_run_cap = 10;
    config.economic.run.allow_synthetic_fill = true;

    let mut store = Store::open(&db_path).unwrap();
    store.ensure_schema(&config.countries).unwrap();

    let summary = collect_source(&config, &store, DataSource::Economic)
        .await
        .unwrap();
    assert_eq!(summary.items_collected_this_run, 8);
    assert_eq!(summary.synthetic_this_run, 8);
    assert!(summary.target_reached());

    let again = collect_source(&config, &store, DataSource::Economic)
        .await
        .unwrap();
    assert_eq!(again.items_collected_this_run, 0);
}
